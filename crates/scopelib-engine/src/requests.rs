//! Request handlers: what each parameter means to the instrument.
//!
//! Queries go through a generic path keyed on the parameter's value kind,
//! with a few parameters republishing derived values afterwards. Writes are
//! handled parameter by parameter.

use tracing::{debug, warn};

use scopelib_core::model::CommandId;
use scopelib_core::params::Param;
use scopelib_core::types::{NUM_CHANNELS, ValueKind};

use crate::engine::Engine;
use crate::poller::{PendingRequest, RequestKind};
use crate::protocol::quoted_text;

/// Slots whose type, units and state are refreshed every this many ticks.
const MEAS_DETAIL_EVERY: u32 = 50;

/// The instrument command behind a parameter, if it has one.
pub(crate) fn command_id(param: Param) -> Option<CommandId> {
    use CommandId as C;
    let id = match param {
        Param::ChOn => C::ChOn,
        Param::ChPos => C::ChPos,
        Param::ChImp => C::ChImp,
        Param::ChCpl => C::ChCpl,
        Param::ChScl => C::ChScl,
        Param::ChSclStep => C::ChSclStep,
        Param::WfNpts => C::WfNpts,
        Param::WfStart => C::WfStart,
        Param::WfStop => C::WfStop,
        Param::WfFmt => C::WfFmt,
        Param::WfWidth => C::WfWidth,
        Param::WfSource => C::WfSource,
        Param::TimDly => C::TimDly,
        Param::TimDlyState => C::TimDlyState,
        Param::TimDiv => C::TimDiv,
        Param::TrPos => C::TrPos,
        Param::TrLev => C::TrLev,
        Param::TrHoldOff => C::TrHoldOff,
        Param::TrMode => C::TrMode,
        Param::TrSource => C::TrSource,
        Param::TrSlope => C::TrSlope,
        Param::TrState => C::TrState,
        Param::AcqState => C::AcqState,
        Param::Run => C::Run,
        Param::Stop => C::Stop,
        Param::Ese => C::Ese,
        Param::Esr => C::Esr,
        Param::Stb => C::Stb,
        Param::Opc => C::Opc,
        Param::Cls => C::Cls,
        Param::Reset => C::Reset,
        Param::Init => C::Init,
        Param::EventQueue => C::EventQueue,
        Param::Header => C::Header,
        Param::Idn => C::Idn,
        Param::IpAddr => C::IpAddr,
        Param::Recall => C::Recall,
        Param::Store => C::Store,
        Param::Meas => C::MeasValue,
        Param::MeasUnits => C::MeasUnits,
        Param::MeasType => C::MeasType,
        Param::MeasState => C::MeasState,
        _ => return None,
    };
    Some(id)
}

impl Engine {
    pub(crate) async fn handle_pending(&mut self, req: PendingRequest) {
        debug!(param = ?req.param, addr = req.addr, kind = ?req.kind, "request");
        match req.kind {
            RequestKind::Query => self.get_cmds(req.param, req.addr).await,
            RequestKind::SetInt(v) => self.put_int_cmds(req.param, req.addr, v).await,
            RequestKind::SetFloat(v) => self.put_float_cmds(req.param, req.addr, v).await,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Read one parameter from the instrument.
    pub(crate) async fn get_cmds(&mut self, param: Param, addr: usize) {
        let ready = self.dispatch.wait_ready().await;
        if self.dispatch.settle(CommandId::Opc, ready).is_none() {
            return;
        }
        match param {
            Param::IpAddr => {
                let result = self.dispatch.query_string(CommandId::IpAddr, addr).await;
                if let Some(reply) = self.dispatch.settle(CommandId::IpAddr, result) {
                    let ip = quoted_text(&reply).unwrap_or(reply.as_str()).to_string();
                    self.registry.set_string(Param::IpAddr, 0, ip);
                }
            }
            Param::ChOn => self.refresh_channel(addr).await,
            _ => {
                self.query_param(param, addr).await;
                self.after_query(param, addr);
            }
        }
    }

    /// Generic read keyed on the parameter's value kind.
    async fn query_param(&mut self, param: Param, addr: usize) {
        let Some(id) = command_id(param) else {
            debug!(param = ?param, "no instrument command to query");
            return;
        };
        match param.kind() {
            ValueKind::Int => {
                self.dispatch.get_int(id, param, addr).await;
            }
            ValueKind::Float => {
                self.dispatch.get_float(id, param, addr).await;
            }
            ValueKind::Str => {
                self.dispatch.get_string(id, param, addr).await;
            }
            ValueKind::Enum => {
                self.dispatch.get_enum(id, param, addr).await;
            }
            ValueKind::FloatArray => {}
        }
    }

    /// Republish values derived from a freshly read parameter.
    fn after_query(&mut self, param: Param, addr: usize) {
        match param {
            Param::TimDly => {
                let v = self.registry.get_float(Param::TimDly, 0);
                self.publish_delay(v);
            }
            Param::TimDiv => {
                let v = self.registry.get_float(Param::TimDiv, 0);
                self.publish_time_per_div(v);
            }
            Param::TrLev => self.update_trig_slider(),
            Param::ChPos => self.update_pos_slider(addr),
            _ => {}
        }
    }

    /// Read a channel's on-state and, unless it is off and was read
    /// before, all of its settings.
    pub(crate) async fn refresh_channel(&mut self, ch: usize) {
        if ch >= NUM_CHANNELS {
            return;
        }
        let on = self.dispatch.get_int(CommandId::ChOn, Param::ChOn, ch).await;
        self.auto_select();
        if on.unwrap_or(0) == 0 && self.channels.seen[ch] {
            return;
        }
        self.channels.seen[ch] = true;
        self.dispatch
            .get_enum(CommandId::ChImp, Param::ChImp, ch)
            .await;
        self.dispatch
            .get_enum(CommandId::ChCpl, Param::ChCpl, ch)
            .await;
        self.dispatch
            .get_float(CommandId::ChScl, Param::ChScl, ch)
            .await;
        self.dispatch
            .get_enum(CommandId::ChSclStep, Param::ChSclStep, ch)
            .await;
        self.dispatch
            .get_float(CommandId::ChPos, Param::ChPos, ch)
            .await;
        self.update_pos_slider(ch);
    }

    /// Refresh everything a display shows.
    pub(crate) async fn update(&mut self) {
        if let Some(v) = self
            .dispatch
            .get_float(CommandId::TimDiv, Param::TimDiv, 0)
            .await
        {
            self.publish_time_per_div(v);
        }
        for (id, param) in [
            (CommandId::TrSource, Param::TrSource),
            (CommandId::TrSlope, Param::TrSlope),
            (CommandId::TrState, Param::TrState),
            (CommandId::TrMode, Param::TrMode),
        ] {
            self.dispatch.get_enum(id, param, 0).await;
        }
        for ch in 0..NUM_CHANNELS {
            self.refresh_channel(ch).await;
        }
        if let Some(v) = self
            .dispatch
            .get_float(CommandId::TimDly, Param::TimDly, 0)
            .await
        {
            self.publish_delay(v);
        }
        self.dispatch
            .get_int(CommandId::TimDlyState, Param::TimDlyState, 0)
            .await;
        self.dispatch
            .get_float(CommandId::TrPos, Param::TrPos, 0)
            .await;
        self.dispatch
            .get_float(CommandId::TrLev, Param::TrLev, 0)
            .await;
        self.update_trig_slider();
        self.dispatch
            .get_float(CommandId::TrHoldOff, Param::TrHoldOff, 0)
            .await;
    }

    /// Read measurement values; every 50th tick also their details.
    pub(crate) async fn get_measurements(&mut self, tick: u32) {
        let slots = self.model.num_measurements.min(NUM_CHANNELS);
        for slot in 0..slots {
            self.dispatch
                .get_float(CommandId::MeasValue, Param::Meas, slot)
                .await;
            if tick % MEAS_DETAIL_EVERY == 0 {
                self.dispatch
                    .get_string(CommandId::MeasUnits, Param::MeasUnits, slot)
                    .await;
                self.dispatch
                    .get_enum(CommandId::MeasType, Param::MeasType, slot)
                    .await;
                self.dispatch
                    .get_int(CommandId::MeasState, Param::MeasState, slot)
                    .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Float writes
    // -----------------------------------------------------------------------

    pub(crate) async fn put_float_cmds(&mut self, param: Param, addr: usize, v: f64) {
        match param {
            Param::ChPos => {
                self.channels.slider.cancel();
                self.dispatch
                    .set_float(CommandId::ChPos, Param::ChPos, addr, v)
                    .await;
                self.update_pos_slider(addr);
                self.update_trig_slider();
            }
            Param::ChScl => {
                self.dispatch
                    .set_float(CommandId::ChScl, Param::ChScl, addr, v)
                    .await;
            }
            Param::TrHoldOff => {
                self.dispatch
                    .set_float(CommandId::TrHoldOff, Param::TrHoldOff, 0, v)
                    .await;
            }
            Param::TimDly => {
                if self
                    .dispatch
                    .set_text(CommandId::TimDly, 0, &format!("{v}"))
                    .await
                {
                    self.registry.set_float(Param::TimDly, 0, v);
                    self.publish_delay(v);
                }
            }
            Param::TrPos => {
                let percent = v.round() as i32;
                if self
                    .dispatch
                    .set_text(CommandId::TrPos, 0, &percent.to_string())
                    .await
                {
                    self.registry.set_float(Param::TrPos, 0, f64::from(percent));
                }
            }
            Param::TrLev => {
                self.dispatch
                    .set_float(CommandId::TrLev, Param::TrLev, 0, v)
                    .await;
                self.update_trig_slider();
            }
            _ => debug!(param = ?param, "float write not handled"),
        }
    }

    // -----------------------------------------------------------------------
    // Integer writes
    // -----------------------------------------------------------------------

    pub(crate) async fn put_int_cmds(&mut self, param: Param, addr: usize, v: i32) {
        match param {
            Param::Update => self.update().await,
            Param::ErrUpdate => {
                self.dispatch.get_int(CommandId::Ese, Param::Ese, 0).await;
                self.dispatch.get_int(CommandId::Esr, Param::Esr, 0).await;
                self.dispatch.get_int(CommandId::Stb, Param::Stb, 0).await;
            }
            Param::Save if v != 0 => {
                if let Err(e) = self.save_settings().await {
                    warn!(error = %e, "save failed");
                    self.registry
                        .set_string(Param::Message, 0, format!("save failed: {e}"));
                }
            }
            Param::Restore if v != 0 => {
                if let Err(e) = self.restore_settings().await {
                    warn!(error = %e, "restore failed");
                    self.registry
                        .set_string(Param::Message, 0, format!("restore failed: {e}"));
                }
            }
            Param::Save | Param::Restore => {}
            Param::ChOn => {
                self.dispatch
                    .set_on_off(CommandId::ChOn, Param::ChOn, addr, v != 0)
                    .await;
                self.auto_select();
            }
            Param::ChImp | Param::ChCpl | Param::TrMode | Param::TrSource | Param::TrSlope => {
                if let Some(id) = command_id(param) {
                    self.dispatch.set_enum(id, param, addr, v).await;
                }
                if param == Param::TrSource {
                    self.update_trig_slider();
                }
            }
            Param::MeasType => {
                if self
                    .dispatch
                    .set_enum(CommandId::MeasType, Param::MeasType, addr, v)
                    .await
                {
                    self.dispatch
                        .get_string(CommandId::MeasUnits, Param::MeasUnits, addr)
                        .await;
                }
            }
            Param::ChSclStep => {
                if self
                    .dispatch
                    .set_enum(CommandId::ChSclStep, Param::ChSclStep, addr, v)
                    .await
                {
                    self.dispatch
                        .get_float(CommandId::ChScl, Param::ChScl, addr)
                        .await;
                    self.update_trig_slider();
                }
            }
            Param::TimDlyState => {
                self.dispatch
                    .set_int(CommandId::TimDlyState, Param::TimDlyState, 0, v, false)
                    .await;
            }
            Param::GetWf => self.get_waveform(addr).await,
            Param::GetWfAll => self.get_traces().await,
            Param::Run | Param::Stop => {
                if let Some(id) = command_id(param) {
                    self.dispatch.write_command(id, 0).await;
                }
                self.dispatch
                    .get_int(CommandId::AcqState, Param::AcqState, 0)
                    .await;
            }
            Param::Reset | Param::Init | Param::Cls => {
                if let Some(id) = command_id(param) {
                    self.dispatch.write_command(id, 0).await;
                }
            }
            Param::WfNpts
            | Param::WfStart
            | Param::WfStop
            | Param::WfWidth
            | Param::Ese
            | Param::MeasState => {
                if let Some(id) = command_id(param) {
                    self.dispatch.set_int(id, param, addr, v, true).await;
                }
            }
            Param::TakePedestal => {
                if addr < NUM_CHANNELS {
                    self.acquisition.take_pedestal[addr] = true;
                }
            }
            Param::ChSel => self.select_channel(addr),
            Param::PosSlider => self.slider_moved(v),
            Param::TrLevSlider => self.set_trig_level(v).await,
            Param::EvMsg => {
                if v != 0 {
                    self.dispatch
                        .get_string(CommandId::ErrMsg, Param::Event, 0)
                        .await;
                }
            }
            Param::TimDivValue | Param::TimDivUnit => {
                self.registry.set_int(param, 0, v);
                let value_index = self.registry.get_int(Param::TimDivValue, 0);
                let unit_index = self.registry.get_int(Param::TimDivUnit, 0);
                self.set_time_per_div(value_index, unit_index).await;
            }
            Param::Recall => {
                if self.dispatch.write_argument(CommandId::Recall, v).await {
                    self.update().await;
                }
            }
            Param::Store => {
                self.dispatch.write_argument(CommandId::Store, v).await;
            }
            Param::MeasEnabled => {
                if v != 0 {
                    self.get_measurements(0).await;
                }
            }
            _ => debug!(param = ?param, "integer write not handled"),
        }
    }
}
