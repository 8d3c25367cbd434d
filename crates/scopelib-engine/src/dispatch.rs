//! The table-driven dispatch engine.
//!
//! [`Dispatcher`] owns the transport and turns abstract operations
//! (`CommandId` + address) into instrument commands using the model's
//! command table. Results are parsed according to the requested value kind
//! and written into the [`Registry`].
//!
//! Only the poller task holds a `Dispatcher`, so nothing here locks the
//! transport. Every failure is classified and absorbed: the typed `get_*` and
//! `set_*` operations return `Option`/`bool` and leave the registry value
//! stale instead of propagating errors to callers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use scopelib_core::error::{Error, ErrorClass, Result};
use scopelib_core::events::ScopeEvent;
use scopelib_core::model::{CommandId, ScopeModel};
use scopelib_core::params::Param;
use scopelib_core::registry::Registry;
use scopelib_core::transport::Transport;
use scopelib_core::types::{Alarm, EnumMatch};

use crate::health::{ConnectionHealth, HealthTransition};
use crate::protocol::{
    self, Framing, MAX_REPLY, TERMINATOR, first_line, format_argument, format_command, make_query,
};

/// Non-ready `*OPC?` replies tolerated by [`Dispatcher::wait_ready`].
const READY_POLLS: u32 = 10;

/// Pause between readiness polls.
const READY_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Timeout for each read during an exchange.
    pub command_timeout: Duration,
    /// Consecutive failures before the connection is declared down.
    pub failure_threshold: u32,
    pub enum_match: EnumMatch,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            command_timeout: Duration::from_secs(2),
            failure_threshold: 3,
            enum_match: EnumMatch::Exact,
        }
    }
}

/// Executes instrument commands over an exclusively owned transport.
pub struct Dispatcher {
    transport: Box<dyn Transport>,
    model: Arc<ScopeModel>,
    registry: Arc<Registry>,
    health: ConnectionHealth,
    timeout: Duration,
    enum_match: EnumMatch,
}

impl Dispatcher {
    pub fn new(
        transport: Box<dyn Transport>,
        model: Arc<ScopeModel>,
        registry: Arc<Registry>,
        config: &DispatchConfig,
    ) -> Self {
        registry.set_int(Param::Connected, 0, 1);
        Dispatcher {
            transport,
            model,
            registry,
            health: ConnectionHealth::new(config.failure_threshold),
            timeout: config.command_timeout,
            enum_match: config.enum_match,
        }
    }

    pub fn model(&self) -> &ScopeModel {
        &self.model
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    /// Give the transport back, e.g. on shutdown.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    // -----------------------------------------------------------------------
    // Byte-level exchanges
    // -----------------------------------------------------------------------

    async fn send_line(&mut self, cmd: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(cmd.len() + 1);
        bytes.extend_from_slice(cmd.as_bytes());
        bytes.push(TERMINATOR);
        trace!(cmd, "send");
        self.transport.send(&bytes).await
    }

    async fn read_reply(&mut self, framing: Framing) -> Result<Vec<u8>> {
        let mut reply = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match self.transport.receive(&mut chunk, self.timeout).await {
                Ok(0) => return Err(Error::Transport("zero-length read".into())),
                Ok(n) => {
                    reply.extend_from_slice(&chunk[..n]);
                    if reply.len() > MAX_REPLY {
                        return Err(Error::Transport(format!(
                            "reply exceeds {MAX_REPLY} bytes"
                        )));
                    }
                    if let Some(end) = protocol::decode_reply(&reply, framing)? {
                        reply.truncate(end);
                        return Ok(reply);
                    }
                }
                Err(Error::Timeout) if !reply.is_empty() => {
                    return Err(Error::Transport(format!(
                        "incomplete reply after {} bytes",
                        reply.len()
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange_raw(&mut self, cmd: &str, framing: Framing) -> Result<Vec<u8>> {
        self.transport.flush().await?;
        self.send_line(cmd).await?;
        let reply = self.read_reply(framing).await?;
        let body = reply
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map_or(0, |p| p + 1);
        if body == 0 {
            return Err(Error::Transport(format!("empty reply to {cmd:?}")));
        }
        trace!(cmd, len = reply.len(), "reply");
        Ok(reply)
    }

    /// Write a command and read one complete reply.
    ///
    /// Line replies count toward connection health immediately. Block
    /// replies only count as a success once the caller has decoded them
    /// (see [`record_success`](Self::record_success)); transport failures are
    /// recorded here for both.
    pub async fn exchange(&mut self, cmd: &str, framing: Framing) -> Result<Vec<u8>> {
        let result = self.exchange_raw(cmd, framing).await;
        match &result {
            Ok(_) if framing == Framing::Line => self.record_success(),
            Err(e) if e.is_transport_failure() => self.record_failure(e),
            _ => {}
        }
        result
    }

    /// Query and return the first reply line.
    pub async fn query(&mut self, cmd: &str) -> Result<String> {
        let reply = self.exchange(cmd, Framing::Line).await?;
        Ok(first_line(&String::from_utf8_lossy(&reply)).to_string())
    }

    /// Fire-and-forget write. Unread input from an earlier exchange is
    /// discarded first so it cannot pair with the next query.
    pub async fn write(&mut self, cmd: &str) -> Result<()> {
        let result = match self.transport.flush().await {
            Ok(()) => self.send_line(cmd).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if e.is_transport_failure() {
                self.record_failure(e);
            }
        }
        result
    }

    /// Send free-form text: queries publish their first reply line to
    /// [`Param::Reply`], anything else is written.
    pub async fn command(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if text.contains('?') {
            let reply = self.query(text).await?;
            debug!(cmd = text, reply = %reply, "command reply");
            self.registry.set_string(Param::Reply, 0, reply);
            Ok(())
        } else {
            self.write(text).await
        }
    }

    /// Poll `*OPC?` until the instrument reports completion.
    ///
    /// Tolerates [`READY_POLLS`] not-ready replies and retries a transport
    /// failure once.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let cmd = make_query(&self.command_for(CommandId::Opc, 0)?);
        let mut not_ready = 0;
        let mut retried = false;
        loop {
            match self.query(&cmd).await {
                Ok(reply) if protocol::leading_int(&reply).ok() == Some(1) => return Ok(()),
                Ok(reply) => {
                    not_ready += 1;
                    if not_ready >= READY_POLLS {
                        return Err(Error::Protocol(format!(
                            "instrument not ready after {not_ready} polls (last reply {reply:?})"
                        )));
                    }
                    tokio::time::sleep(READY_INTERVAL).await;
                }
                Err(e) if e.is_transport_failure() && !retried => {
                    debug!(error = %e, "readiness poll failed, retrying");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    /// Count a successful exchange; clears alarms if the link was down.
    pub fn record_success(&mut self) {
        if self.health.record_success() == HealthTransition::Recovered {
            info!("instrument connection restored");
            self.registry.clear_alarms();
            self.registry.set_int(Param::Connected, 0, 1);
            self.registry.notify_all();
            self.registry.emit(ScopeEvent::Connected);
        }
    }

    /// Count a failed exchange; raises alarms at the threshold.
    pub fn record_failure(&mut self, err: &Error) {
        debug!(error = %err, failures = self.health.failures() + 1, "exchange failed");
        if self.health.record_failure() == HealthTransition::WentDown {
            warn!(
                error = %err,
                failures = self.health.failures(),
                "instrument connection down"
            );
            self.registry.set_int(Param::Connected, 0, 0);
            self.registry
                .set_alarm_all_except(Param::Connected, Alarm::COMM_INVALID);
            self.registry.notify_all();
            self.registry.emit(ScopeEvent::Disconnected);
        }
    }

    /// Absorb an error: log it by class and count range errors.
    pub fn settle<T>(&self, id: CommandId, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                match e.class() {
                    ErrorClass::Unsupported => trace!(command = ?id, "not supported by model"),
                    ErrorClass::RangeError => {
                        debug!(command = ?id, error = %e, "rejected before I/O");
                        let count = self.registry.get_int(Param::RangeErrors, 0);
                        self.registry
                            .set_int(Param::RangeErrors, 0, count.saturating_add(1));
                    }
                    ErrorClass::ProtocolParseFailure => {
                        warn!(command = ?id, error = %e, "unparseable reply")
                    }
                    ErrorClass::TransportFailure | ErrorClass::QueueOverflow => {
                        debug!(command = ?id, error = %e, "command failed")
                    }
                }
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Typed queries
    // -----------------------------------------------------------------------

    /// Resolve a command for a registry address (channel `addr + 1`).
    pub fn command_for(&self, id: CommandId, addr: usize) -> Result<String> {
        let spec = self.model.commands.get(id)?;
        format_command(spec, addr + 1)
    }

    async fn query_for(&mut self, id: CommandId, addr: usize) -> Result<String> {
        let cmd = make_query(&self.command_for(id, addr)?);
        self.query(&cmd).await
    }

    pub async fn query_int(&mut self, id: CommandId, addr: usize) -> Result<i32> {
        let reply = self.query_for(id, addr).await?;
        protocol::leading_int(&reply)
    }

    pub async fn query_float(&mut self, id: CommandId, addr: usize) -> Result<f64> {
        let reply = self.query_for(id, addr).await?;
        protocol::leading_float(&reply)
    }

    pub async fn query_string(&mut self, id: CommandId, addr: usize) -> Result<String> {
        self.query_for(id, addr).await
    }

    /// Query an enumerated setting and map it onto the keyword list.
    ///
    /// A reply that names no keyword is a protocol error, never index 0.
    pub async fn query_enum(&mut self, id: CommandId, addr: usize) -> Result<usize> {
        let keywords = self.model.commands.keywords(id);
        let reply = self.query_for(id, addr).await?;
        protocol::match_keyword(&reply, keywords, self.enum_match).ok_or_else(|| {
            Error::Protocol(format!("{reply:?} is not a {id:?} keyword"))
        })
    }

    pub async fn get_int(&mut self, id: CommandId, param: Param, addr: usize) -> Option<i32> {
        let result = self.query_int(id, addr).await;
        let v = self.settle(id, result)?;
        self.registry.set_int(param, addr, v);
        Some(v)
    }

    pub async fn get_float(&mut self, id: CommandId, param: Param, addr: usize) -> Option<f64> {
        let result = self.query_float(id, addr).await;
        let v = self.settle(id, result)?;
        self.registry.set_float(param, addr, v);
        Some(v)
    }

    pub async fn get_string(
        &mut self,
        id: CommandId,
        param: Param,
        addr: usize,
    ) -> Option<String> {
        let result = self.query_string(id, addr).await;
        let v = self.settle(id, result)?;
        self.registry.set_string(param, addr, v.clone());
        Some(v)
    }

    pub async fn get_enum(&mut self, id: CommandId, param: Param, addr: usize) -> Option<usize> {
        let result = self.query_enum(id, addr).await;
        let v = self.settle(id, result)?;
        self.registry.set_int(param, addr, v as i32);
        Some(v)
    }

    // -----------------------------------------------------------------------
    // Typed writes
    // -----------------------------------------------------------------------

    /// Write `"<command> <arg>"`. Returns whether the write went out.
    pub async fn set_text(&mut self, id: CommandId, addr: usize, arg: &str) -> bool {
        let cmd = match self.command_for(id, addr) {
            Ok(cmd) => format!("{cmd} {arg}"),
            Err(e) => return self.settle::<()>(id, Err(e)).is_some(),
        };
        let result = self.write(&cmd).await;
        self.settle(id, result).is_some()
    }

    /// Write an integer setting, then either read it back or store it.
    pub async fn set_int(
        &mut self,
        id: CommandId,
        param: Param,
        addr: usize,
        value: i32,
        readback: bool,
    ) -> bool {
        if !self.set_text(id, addr, &value.to_string()).await {
            return false;
        }
        if readback {
            self.get_int(id, param, addr).await.is_some()
        } else {
            self.registry.set_int(param, addr, value);
            true
        }
    }

    pub async fn set_float(&mut self, id: CommandId, param: Param, addr: usize, value: f64) -> bool {
        let written = self.set_text(id, addr, &format!("{value:.6}")).await;
        if written {
            self.registry.set_float(param, addr, value);
        }
        written
    }

    /// Write the keyword at `index`; out-of-range indices never reach I/O.
    pub async fn set_enum(&mut self, id: CommandId, param: Param, addr: usize, index: i32) -> bool {
        let keywords = self.model.commands.keywords(id);
        let Some(keyword) = usize::try_from(index).ok().and_then(|i| keywords.get(i)) else {
            let err = Error::InvalidParameter(format!(
                "{id:?} index {index} outside 0..{}",
                keywords.len()
            ));
            return self.settle::<()>(id, Err(err)).is_some();
        };
        let written = self.set_text(id, addr, keyword).await;
        if written {
            self.registry.set_int(param, addr, index);
        }
        written
    }

    pub async fn set_on_off(&mut self, id: CommandId, param: Param, addr: usize, on: bool) -> bool {
        let written = self
            .set_text(id, addr, if on { "ON" } else { "OFF" })
            .await;
        if written {
            self.registry.set_int(param, addr, i32::from(on));
        }
        written
    }

    /// Write a command template as-is (run, stop, reset, ...).
    pub async fn write_command(&mut self, id: CommandId, addr: usize) -> bool {
        let cmd = self.command_for(id, addr);
        let result = match cmd {
            Ok(cmd) => self.write(&cmd).await,
            Err(e) => Err(e),
        };
        self.settle(id, result).is_some()
    }

    /// Write a command whose placeholder is a numeric argument.
    pub async fn write_argument(&mut self, id: CommandId, value: i32) -> bool {
        let cmd = self
            .model
            .commands
            .get(id)
            .and_then(|spec| format_argument(spec, value));
        let result = match cmd {
            Ok(cmd) => self.write(&cmd).await,
            Err(e) => Err(e),
        };
        self.settle(id, result).is_some()
    }

    /// Close the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dispatcher, test_model};
    use scopelib_core::types::AlarmSeverity;
    use scopelib_test_harness::MockTransport;

    // =======================================================================
    // Exchanges
    // =======================================================================

    #[tokio::test]
    async fn query_returns_first_line() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"TEKTRONIX,MDO3024,C0,CF:91.1CT\n");
        let (mut d, _reg) = dispatcher(mock);
        assert_eq!(
            d.query("*IDN?").await.unwrap(),
            "TEKTRONIX,MDO3024,C0,CF:91.1CT"
        );
    }

    #[tokio::test]
    async fn write_flushes_before_sending() {
        let mut mock = MockTransport::new();
        mock.expect(b"*CLS\n", b"");
        let handle = mock.handle();
        let (mut d, _reg) = dispatcher(mock);

        d.write("*CLS").await.unwrap();
        assert_eq!(handle.flush_count(), 1);
        assert_eq!(handle.sent_lines(), ["*CLS"]);
    }

    #[tokio::test]
    async fn empty_reply_is_transport_failure() {
        let mut mock = MockTransport::new();
        mock.expect(b"*ESR?\n", b"\n");
        let (mut d, _reg) = dispatcher(mock);
        let err = d.query("*ESR?").await.unwrap_err();
        assert!(err.is_transport_failure(), "{err}");
        assert_eq!(d.health().failures(), 1);
    }

    #[tokio::test]
    async fn oversized_reply_is_transport_failure() {
        let mut mock = MockTransport::new();
        let big = vec![b'A'; MAX_REPLY + 10];
        mock.expect(b"*LRN?\n", &big);
        let (mut d, _reg) = dispatcher(mock);
        let err = d.query("*LRN?").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn block_exchange_reads_whole_payload() {
        let mut mock = MockTransport::new();
        mock.expect(b"CURV?\n", b"#15\n\n\n\n\n\n");
        let (mut d, _reg) = dispatcher(mock);
        let reply = d.exchange("CURV?", Framing::Block).await.unwrap();
        assert_eq!(reply.len(), 9);
        // Block success is left to the decoder.
        assert_eq!(d.health().failures(), 0);
    }

    #[tokio::test]
    async fn command_routes_queries_to_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"HOR:SCA?\n", b"4.0E-8\n");
        mock.expect(b"ACQ:STATE RUN\n", b"");
        let handle = mock.handle();
        let (mut d, reg) = dispatcher(mock);

        d.command("HOR:SCA?").await.unwrap();
        assert_eq!(reg.get_string(Param::Reply, 0), "4.0E-8");
        d.command("ACQ:STATE RUN").await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);
    }

    // =======================================================================
    // Readiness poll
    // =======================================================================

    #[tokio::test]
    async fn wait_ready_polls_until_complete() {
        let mut mock = MockTransport::new();
        mock.expect(b"*OPC?\n", b"0\n");
        mock.expect(b"*OPC?\n", b"0\n");
        mock.expect(b"*OPC?\n", b"1\n");
        let handle = mock.handle();
        let (mut d, _reg) = dispatcher(mock);
        d.wait_ready().await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn wait_ready_gives_up_after_ten_polls() {
        let mut mock = MockTransport::new();
        for _ in 0..READY_POLLS {
            mock.expect(b"*OPC?\n", b"0\n");
        }
        let handle = mock.handle();
        let (mut d, _reg) = dispatcher(mock);
        assert!(d.wait_ready().await.is_err());
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn wait_ready_retries_one_transport_failure() {
        let mut mock = MockTransport::new();
        mock.expect(b"*OPC?\n", b"");
        mock.expect(b"*OPC?\n", b"1\n");
        let (mut d, _reg) = dispatcher(mock);
        d.wait_ready().await.unwrap();

        let mut mock = MockTransport::new();
        mock.expect(b"*OPC?\n", b"");
        mock.expect(b"*OPC?\n", b"");
        let (mut d, _reg) = dispatcher(mock);
        assert!(matches!(d.wait_ready().await, Err(Error::Timeout)));
    }

    // =======================================================================
    // Typed get/set
    // =======================================================================

    #[tokio::test]
    async fn get_float_stores_per_channel() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH3:POS?\n", b"-1.5\n");
        let (mut d, reg) = dispatcher(mock);
        assert_eq!(d.get_float(CommandId::ChPos, Param::ChPos, 2).await, Some(-1.5));
        assert_eq!(reg.get_float(Param::ChPos, 2), -1.5);
        assert_eq!(reg.get_float(Param::ChPos, 0), 0.0);
    }

    #[tokio::test]
    async fn get_enum_maps_keyword() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH1:COUP?\n", b"AC\n");
        let (mut d, reg) = dispatcher(mock);
        assert_eq!(d.get_enum(CommandId::ChCpl, Param::ChCpl, 0).await, Some(1));
        assert_eq!(reg.get_int(Param::ChCpl, 0), 1);
    }

    #[tokio::test]
    async fn unknown_keyword_is_not_found() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH1:COUP?\n", b"GND\n");
        mock.expect(b"CH1:COUP?\n", b"GND\n");
        let (mut d, reg) = dispatcher(mock);
        reg.set_int(Param::ChCpl, 0, 2);

        assert!(matches!(
            d.query_enum(CommandId::ChCpl, 0).await,
            Err(Error::Protocol(_))
        ));
        assert_eq!(d.get_enum(CommandId::ChCpl, Param::ChCpl, 0).await, None);
        // The stale value is kept, not reset to 0.
        assert_eq!(reg.get_int(Param::ChCpl, 0), 2);
    }

    #[tokio::test]
    async fn enum_round_trip() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH2:COUP DCREJ\n", b"");
        mock.expect(b"CH2:COUP?\n", b"DCREJ\n");
        let (mut d, reg) = dispatcher(mock);
        assert!(d.set_enum(CommandId::ChCpl, Param::ChCpl, 1, 2).await);
        reg.set_int(Param::ChCpl, 1, 0);
        assert_eq!(d.get_enum(CommandId::ChCpl, Param::ChCpl, 1).await, Some(2));
    }

    #[tokio::test]
    async fn range_errors_never_touch_transport() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut d, reg) = dispatcher(mock);

        assert!(!d.set_enum(CommandId::ChCpl, Param::ChCpl, 0, 3).await);
        assert!(!d.set_enum(CommandId::ChCpl, Param::ChCpl, 0, -1).await);
        assert_eq!(d.get_float(CommandId::ChPos, Param::ChPos, 4).await, None);

        assert!(handle.sent_data().is_empty());
        assert_eq!(reg.get_int(Param::RangeErrors, 0), 3);
    }

    #[tokio::test]
    async fn unsupported_command_is_silent() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut d, reg) = dispatcher(mock);
        assert_eq!(d.get_string(CommandId::GetConf, Param::Message, 0).await, None);
        assert!(handle.sent_data().is_empty());
        assert_eq!(reg.get_int(Param::RangeErrors, 0), 0);
    }

    #[tokio::test]
    async fn set_int_with_readback() {
        let mut mock = MockTransport::new();
        mock.expect(b"DAT:STAR 5\n", b"");
        mock.expect(b"DAT:STAR?\n", b"5\n");
        let (mut d, reg) = dispatcher(mock);
        assert!(d.set_int(CommandId::WfStart, Param::WfStart, 0, 5, true).await);
        assert_eq!(reg.get_int(Param::WfStart, 0), 5);
    }

    #[tokio::test]
    async fn set_float_and_on_off_formatting() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH1:SCA 0.100000\n", b"");
        mock.expect(b"SEL:CH4 OFF\n", b"");
        let (mut d, reg) = dispatcher(mock);
        assert!(d.set_float(CommandId::ChScl, Param::ChScl, 0, 0.1).await);
        assert!(d.set_on_off(CommandId::ChOn, Param::ChOn, 3, false).await);
        assert_eq!(reg.get_float(Param::ChScl, 0), 0.1);
        assert_eq!(reg.get_int(Param::ChOn, 3), 0);
    }

    #[tokio::test]
    async fn write_argument_substitutes_slot() {
        let mut mock = MockTransport::new();
        mock.expect(b"*RCL 2\n", b"");
        let (mut d, _reg) = dispatcher(mock);
        assert!(d.write_argument(CommandId::Recall, 2).await);
    }

    // =======================================================================
    // Connection health
    // =======================================================================

    #[tokio::test]
    async fn failures_raise_alarms_and_success_clears_them() {
        let mut mock = MockTransport::new();
        for _ in 0..3 {
            mock.expect(b"*ESR?\n", b"");
        }
        mock.expect(b"*ESR?\n", b"0\n");
        let (mut d, reg) = dispatcher(mock);
        let mut events = reg.subscribe();

        for _ in 0..2 {
            assert_eq!(d.get_int(CommandId::Esr, Param::Esr, 0).await, None);
            assert_eq!(reg.get_int(Param::Connected, 0), 1);
        }
        assert_eq!(d.get_int(CommandId::Esr, Param::Esr, 0).await, None);
        assert_eq!(reg.get_int(Param::Connected, 0), 0);
        assert_eq!(reg.alarm(Param::ChPos, 2).severity, AlarmSeverity::Invalid);
        assert!(!reg.alarm(Param::Connected, 0).is_active());

        assert_eq!(d.get_int(CommandId::Esr, Param::Esr, 0).await, Some(0));
        assert_eq!(reg.get_int(Param::Connected, 0), 1);
        assert!(!reg.alarm(Param::ChPos, 2).is_active());

        let mut saw_down = false;
        let mut saw_up = false;
        while let Ok(ev) = events.try_recv() {
            match ev {
                ScopeEvent::Disconnected => saw_down = true,
                ScopeEvent::Connected => saw_up = saw_down,
                _ => {}
            }
        }
        assert!(saw_down && saw_up);
    }

    #[tokio::test]
    async fn model_is_shared() {
        let (d, _reg) = dispatcher(MockTransport::new());
        assert_eq!(d.model().name, test_model().name);
    }
}
