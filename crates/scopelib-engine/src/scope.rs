//! The public driver handle.
//!
//! A [`Scope`] is what callers hold. Reads come straight from the registry;
//! writes either change caller-side state (analysis settings, markers, poll
//! period and the like) or are queued for the poller. Nothing here waits on
//! the instrument.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use scopelib_core::error::{Error, Result};
use scopelib_core::events::ScopeEvent;
use scopelib_core::model::ScopeModel;
use scopelib_core::params::Param;
use scopelib_core::registry::Registry;
use scopelib_core::transport::Transport;
use scopelib_core::types::{Multiplicity, NUM_CHANNELS, Value};

use crate::engine::{Engine, Shared};
use crate::poller::{PendingRequest, Poller, QueueStats, spawn_poller};

/// Queries queued by [`Scope::after_init`] after the trigger and status
/// block, in order.
const STARTUP_QUERIES: &[(Param, usize)] = &[
    (Param::Idn, 0),
    (Param::IpAddr, 0),
    (Param::ChOn, 0),
    (Param::ChOn, 1),
    (Param::ChOn, 2),
    (Param::ChOn, 3),
    (Param::TimDly, 0),
    (Param::TimDiv, 0),
    (Param::TrPos, 0),
    (Param::TrLev, 0),
    (Param::TrHoldOff, 0),
    (Param::WfFmt, 0),
    (Param::Opc, 0),
    (Param::WfNpts, 0),
    (Param::WfStart, 0),
    (Param::WfStop, 0),
    (Param::Esr, 0),
    (Param::Ese, 0),
    (Param::Stb, 0),
    (Param::TrLev, 0),
];

/// A running oscilloscope driver.
pub struct Scope {
    model: Arc<ScopeModel>,
    registry: Arc<Registry>,
    shared: Arc<Shared>,
    poller: Poller,
}

impl Scope {
    pub(crate) fn start(engine: Engine, queue_capacity: usize) -> Self {
        let model = Arc::clone(&engine.model);
        let registry = Arc::clone(&engine.registry);
        let shared = Arc::clone(&engine.shared);
        registry.set_string(Param::Name, 0, model.name);
        let poller = spawn_poller(engine, queue_capacity);
        info!(model = model.name, "scope driver started");
        Scope {
            model,
            registry,
            shared,
            poller,
        }
    }

    pub fn model(&self) -> &ScopeModel {
        &self.model
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Change notifications for every address.
    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.registry.subscribe()
    }

    pub fn queue_stats(&self) -> &QueueStats {
        self.poller.stats()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn read(&self, param: Param, addr: usize) -> Result<Value> {
        self.check_addr(param, addr)?;
        Ok(self
            .registry
            .get(param, addr)
            .unwrap_or_else(|| Value::default_for(param.kind())))
    }

    pub fn read_int(&self, param: Param, addr: usize) -> i32 {
        self.registry.get_int(param, addr)
    }

    pub fn read_float(&self, param: Param, addr: usize) -> f64 {
        self.registry.get_float(param, addr)
    }

    pub fn read_string(&self, param: Param, addr: usize) -> String {
        self.registry.get_string(param, addr)
    }

    pub fn read_array(&self, param: Param, addr: usize) -> Vec<f64> {
        self.registry.get_array(param, addr)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Ask the poller to read `param` from the instrument.
    pub fn refresh(&self, param: Param, addr: usize) -> Result<()> {
        self.check_addr(param, addr)?;
        self.poller.enqueue(PendingRequest::query(param, addr))
    }

    pub fn write_int(&self, param: Param, addr: usize, value: i32) -> Result<()> {
        self.check_addr(param, addr)?;
        match param {
            Param::Analyze => {
                let on = value != 0 && self.registry.get_int(Param::ChOn, addr) != 0;
                self.shared.analysis().enabled[addr] = on;
                self.registry.set_int(Param::Analyze, addr, i32::from(on));
                self.registry.notify(addr);
            }
            Param::MarkerChannel => {
                let ch = value.clamp(0, NUM_CHANNELS as i32 - 1);
                let (m1, m2) = self.shared.analysis().markers[ch as usize];
                self.registry.set_int(Param::MarkerChannel, 0, ch);
                self.registry.set_int(Param::Marker1, 0, to_i32(m1));
                self.registry.set_int(Param::Marker2, 0, to_i32(m2));
                self.registry.notify(0);
            }
            Param::Marker1 | Param::Marker2 => {
                let ch = self.marker_channel();
                let sample = usize::try_from(value.max(0)).unwrap_or(0);
                {
                    let mut analysis = self.shared.analysis();
                    let markers = &mut analysis.markers[ch];
                    if param == Param::Marker1 {
                        markers.0 = sample;
                    } else {
                        markers.1 = sample;
                    }
                }
                self.registry.set_int(param, 0, to_i32(sample));
                self.registry.notify(0);
            }
            Param::ReadTraces | Param::TraceMode => {
                self.registry.set_int(param, 0, value);
                self.registry.notify(0);
            }
            Param::MeasEnabled => {
                self.registry.set_int(param, 0, value);
                self.poller
                    .enqueue(PendingRequest::set_int(param, addr, value))?;
            }
            _ => {
                self.poller
                    .enqueue(PendingRequest::set_int(param, addr, value))?;
            }
        }
        Ok(())
    }

    pub fn write_float(&self, param: Param, addr: usize, value: f64) -> Result<()> {
        self.check_addr(param, addr)?;
        match param {
            Param::PollPeriod => {
                if !(value.is_finite() && value > 0.0) {
                    return Err(Error::InvalidParameter(format!(
                        "poll period {value} must be positive"
                    )));
                }
                self.registry.set_float(param, 0, value);
                self.registry.notify(0);
                Ok(())
            }
            _ => self
                .poller
                .enqueue(PendingRequest::set_float(param, addr, value)),
        }
    }

    pub fn write_string(&self, param: Param, addr: usize, value: &str) -> Result<()> {
        self.check_addr(param, addr)?;
        match param {
            Param::Command => {
                self.registry.set_string(Param::Command, 0, value);
                self.poller.enqueue_raw(value.to_string())
            }
            _ => {
                self.registry.set_string(param, addr, value);
                self.registry.notify(addr);
                Ok(())
            }
        }
    }

    /// Write a value of whatever kind `param` holds.
    pub fn write(&self, param: Param, addr: usize, value: Value) -> Result<()> {
        match value {
            Value::Int(v) => self.write_int(param, addr, v),
            Value::Float(v) => self.write_float(param, addr, v),
            Value::Str(s) => self.write_string(param, addr, &s),
            Value::FloatArray(_) => Err(Error::InvalidParameter(format!(
                "{} is not writable",
                param.name()
            ))),
        }
    }

    fn marker_channel(&self) -> usize {
        let ch = self.registry.get_int(Param::MarkerChannel, 0);
        usize::try_from(ch).unwrap_or(0).min(NUM_CHANNELS - 1)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Queue the start-up sequence: the model's init string, then a read of
    /// everything a display needs.
    pub fn after_init(&self) -> Result<()> {
        let mut requests = vec![PendingRequest::set_int(Param::Init, 0, 1)];
        for param in [
            Param::TrSource,
            Param::TrSlope,
            Param::TrState,
            Param::TrMode,
            Param::WfSource,
            Param::Header,
            Param::WfWidth,
            Param::EventQueue,
            Param::AcqState,
        ] {
            requests.push(PendingRequest::query(param, 0));
        }
        for slot in 0..self.model.num_measurements.min(NUM_CHANNELS) {
            requests.push(PendingRequest::query(Param::MeasState, slot));
        }
        requests.extend(
            STARTUP_QUERIES
                .iter()
                .map(|&(param, addr)| PendingRequest::query(param, addr)),
        );

        let mut result = Ok(());
        for req in requests {
            if let Err(e) = self.poller.enqueue(req) {
                result = Err(e);
            }
        }
        debug!(sent = self.queue_stats().sent(), "start-up sequence queued");
        result
    }

    /// Stop the poller once queued work is done and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        info!(model = self.model.name, "scope driver shutting down");
        self.poller.shutdown().await
    }

    /// Stop the poller without waiting for queued work.
    pub fn abort(&self) {
        self.poller.abort();
    }

    /// Reject an address outside the parameter's range, counting it in
    /// `RangeErrors`.
    fn check_addr(&self, param: Param, addr: usize) -> Result<()> {
        let limit = match param.multiplicity() {
            Multiplicity::PerChannel => NUM_CHANNELS,
            Multiplicity::Scalar => 1,
        };
        if addr < limit {
            return Ok(());
        }
        let count = self.registry.get_int(Param::RangeErrors, 0);
        self.registry
            .set_int(Param::RangeErrors, 0, count.saturating_add(1));
        self.registry.notify(0);
        warn!(param = ?param, addr, "address out of range");
        Err(Error::InvalidParameter(format!(
            "address {addr} out of range for {}",
            param.name()
        )))
    }
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
