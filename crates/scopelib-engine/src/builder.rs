//! ScopeBuilder -- fluent builder for constructing [`Scope`] instances.
//!
//! Separates configuration from construction so that callers can choose the
//! link (LAN or serial), timeouts and polling behaviour before the transport
//! is opened.
//!
//! # Example
//!
//! ```no_run
//! use scopelib_engine::builder::ScopeBuilder;
//! use std::time::Duration;
//!
//! # async fn example(model: scopelib_core::ScopeModel) -> scopelib_core::Result<()> {
//! let scope = ScopeBuilder::new(model)
//!     .host("192.168.1.20")
//!     .poll_interval(Duration::from_millis(250))
//!     .read_traces(true)
//!     .build()
//!     .await?;
//! scope.after_init()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use scopelib_core::error::{Error, Result};
use scopelib_core::model::ScopeModel;
use scopelib_core::params::Param;
use scopelib_core::registry::Registry;
use scopelib_core::transport::Transport;
use scopelib_core::types::EnumMatch;

use crate::dispatch::DispatchConfig;
use crate::engine::{Engine, EngineConfig};
use crate::poller::DEFAULT_QUEUE_CAPACITY;
use crate::scope::Scope;

/// Fluent builder for [`Scope`].
///
/// Every setting has a default; only the link must be chosen before
/// [`build()`](Self::build).
pub struct ScopeBuilder {
    model: ScopeModel,
    host: Option<String>,
    tcp_port: Option<u16>,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    command_timeout: Duration,
    poll_interval: Duration,
    failure_threshold: u32,
    queue_capacity: usize,
    debounce: Duration,
    enum_match: EnumMatch,
    read_traces: bool,
    measurements: bool,
    config_path: Option<PathBuf>,
}

impl ScopeBuilder {
    pub fn new(model: ScopeModel) -> Self {
        ScopeBuilder {
            model,
            host: None,
            tcp_port: None,
            serial_port: None,
            baud_rate: None,
            command_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            failure_threshold: 3,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debounce: Duration::from_millis(200),
            enum_match: EnumMatch::Exact,
            read_traces: false,
            measurements: false,
            config_path: None,
        }
    }

    /// Connect over the LAN to this host name or address.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Override the model's default TCP port.
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    /// Connect over a serial port instead (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Timeout for each read of an exchange (default: 2s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Idle sleep of the poller (default: 100ms). Writable later through
    /// `PollPeriod`.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consecutive failures before the link is reported down (default: 3).
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Quiet period before a position-slider edit is written (default: 200ms).
    pub fn debounce(mut self, period: Duration) -> Self {
        self.debounce = period;
        self
    }

    /// How replies are matched against keyword lists (default: exact).
    pub fn enum_match(mut self, rule: EnumMatch) -> Self {
        self.enum_match = rule;
        self
    }

    /// Fetch all traces on every idle poll.
    pub fn read_traces(mut self, enabled: bool) -> Self {
        self.read_traces = enabled;
        self
    }

    /// Refresh measurements on every idle poll.
    pub fn measurements(mut self, enabled: bool) -> Self {
        self.measurements = enabled;
        self
    }

    /// Settings file used when `FilePath` is empty.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Build a [`Scope`] with a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `scopelib-test-harness`) and for callers that manage the link
    /// themselves.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Scope> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidParameter(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "poll_interval must be non-zero".into(),
            ));
        }

        let registry = Arc::new(Registry::new());
        registry.set_float(Param::PollPeriod, 0, self.poll_interval.as_secs_f64());
        registry.set_int(Param::ReadTraces, 0, i32::from(self.read_traces));
        registry.set_int(Param::MeasEnabled, 0, i32::from(self.measurements));

        let config = EngineConfig {
            dispatch: DispatchConfig {
                command_timeout: self.command_timeout,
                failure_threshold: self.failure_threshold,
                enum_match: self.enum_match,
            },
            debounce: self.debounce,
            config_path: self.config_path,
        };
        let engine = Engine::new(transport, Arc::new(self.model), registry, config);
        Ok(Scope::start(engine, self.queue_capacity))
    }

    /// Open the configured link and build a [`Scope`].
    ///
    /// A host takes precedence over a serial port. The TCP port and baud
    /// rate default to the model's.
    pub async fn build(self) -> Result<Scope> {
        let transport: Box<dyn Transport> = if let Some(host) = &self.host {
            let port = self.tcp_port.unwrap_or(self.model.default_tcp_port);
            info!(host = %host, port, "connecting over LAN");
            Box::new(scopelib_transport::TcpTransport::connect_host(host, port).await?)
        } else if let Some(port) = &self.serial_port {
            let baud = self.baud_rate.unwrap_or(self.model.default_baud_rate);
            info!(port = %port, baud, "opening serial port");
            Box::new(scopelib_transport::SerialTransport::open(port, baud).await?)
        } else {
            return Err(Error::InvalidParameter(
                "host or serial_port is required for build()".into(),
            ));
        };
        self.build_with_transport(transport).await
    }
}
