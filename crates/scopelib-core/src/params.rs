//! Abstract parameters exposed by every oscilloscope driver.
//!
//! A [`Param`] names a controllable or readable quantity independently of
//! any instrument's command vocabulary. The dispatch engine maps each one to
//! a model command; the registry stores its value per address.

use std::fmt;
use std::str::FromStr;

use crate::types::{Multiplicity, ValueKind};

/// Stable identifier of an abstract parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    // Channel
    ChOn,
    ChPos,
    ChImp,
    ChCpl,
    ChScl,
    ChSclStep,
    ChSel,

    // Waveform
    WfTrace,
    WfNpts,
    WfStart,
    WfStop,
    WfFmt,
    WfWidth,
    WfSource,
    GetWf,
    GetWfAll,
    XNpts,
    TraceMode,
    ReadTraces,
    WfTime,
    WfTimeMin,
    WfTimeMax,
    WfPeriod,
    WfRate,
    TraceCount,

    // Timebase
    TimDly,
    TimDlyState,
    TimDlyStr,
    TimDiv,
    TimDivStr,
    TimDivValue,
    TimDivUnit,

    // Trigger
    TrPos,
    TrLev,
    TrHoldOff,
    TrMode,
    TrSource,
    TrSlope,
    TrState,
    TrLevSlider,

    // Acquisition and status registers
    Run,
    Stop,
    AcqState,
    Ese,
    Esr,
    Stb,
    Opc,
    Cls,
    Reset,
    Init,
    ErrUpdate,
    EventQueue,
    Header,

    // Identity
    Idn,
    IpAddr,
    Name,

    // Interactive
    Command,
    Reply,
    EvMsg,
    Event,
    Message,

    // Analysis
    Analyze,
    TakePedestal,
    Area,
    Pedestal,
    MarkerChannel,
    Marker1,
    Marker2,

    // Position slider for the selected channel
    PosSlider,

    // Persistence
    FilePath,
    Save,
    Restore,
    Recall,
    Store,

    // Measurements, addressed by slot
    Meas,
    MeasUnits,
    MeasType,
    MeasState,
    MeasEnabled,

    // Diagnostics
    PollPeriod,
    QueueSent,
    QueueFailed,
    RangeErrors,
    Connected,
    Update,
}

impl Param {
    /// Every parameter, in declaration order.
    pub const ALL: &'static [Param] = &[
        Param::ChOn,
        Param::ChPos,
        Param::ChImp,
        Param::ChCpl,
        Param::ChScl,
        Param::ChSclStep,
        Param::ChSel,
        Param::WfTrace,
        Param::WfNpts,
        Param::WfStart,
        Param::WfStop,
        Param::WfFmt,
        Param::WfWidth,
        Param::WfSource,
        Param::GetWf,
        Param::GetWfAll,
        Param::XNpts,
        Param::TraceMode,
        Param::ReadTraces,
        Param::WfTime,
        Param::WfTimeMin,
        Param::WfTimeMax,
        Param::WfPeriod,
        Param::WfRate,
        Param::TraceCount,
        Param::TimDly,
        Param::TimDlyState,
        Param::TimDlyStr,
        Param::TimDiv,
        Param::TimDivStr,
        Param::TimDivValue,
        Param::TimDivUnit,
        Param::TrPos,
        Param::TrLev,
        Param::TrHoldOff,
        Param::TrMode,
        Param::TrSource,
        Param::TrSlope,
        Param::TrState,
        Param::TrLevSlider,
        Param::Run,
        Param::Stop,
        Param::AcqState,
        Param::Ese,
        Param::Esr,
        Param::Stb,
        Param::Opc,
        Param::Cls,
        Param::Reset,
        Param::Init,
        Param::ErrUpdate,
        Param::EventQueue,
        Param::Header,
        Param::Idn,
        Param::IpAddr,
        Param::Name,
        Param::Command,
        Param::Reply,
        Param::EvMsg,
        Param::Event,
        Param::Message,
        Param::Analyze,
        Param::TakePedestal,
        Param::Area,
        Param::Pedestal,
        Param::MarkerChannel,
        Param::Marker1,
        Param::Marker2,
        Param::PosSlider,
        Param::FilePath,
        Param::Save,
        Param::Restore,
        Param::Recall,
        Param::Store,
        Param::Meas,
        Param::MeasUnits,
        Param::MeasType,
        Param::MeasState,
        Param::MeasEnabled,
        Param::PollPeriod,
        Param::QueueSent,
        Param::QueueFailed,
        Param::RangeErrors,
        Param::Connected,
        Param::Update,
    ];

    /// The type of value this parameter holds.
    pub fn kind(self) -> ValueKind {
        use Param::*;
        match self {
            ChPos | ChScl | WfTime | WfTimeMin | WfTimeMax | WfPeriod | WfRate | TimDly
            | TimDiv | TrPos | TrLev | TrHoldOff | Area | Pedestal | Meas | PollPeriod => {
                ValueKind::Float
            }
            WfFmt | WfSource | TimDlyStr | TimDivStr | Header | Idn | IpAddr | Name
            | Command | Reply | Event | Message | FilePath | MeasUnits => ValueKind::Str,
            ChImp | ChCpl | ChSclStep | TraceMode | TimDivValue | TimDivUnit | TrMode
            | TrSource | TrSlope | TrState | MeasType => ValueKind::Enum,
            WfTrace => ValueKind::FloatArray,
            _ => ValueKind::Int,
        }
    }

    /// Whether this parameter exists once per channel (or measurement slot).
    pub fn multiplicity(self) -> Multiplicity {
        use Param::*;
        match self {
            ChOn | ChPos | ChImp | ChCpl | ChScl | ChSclStep | ChSel | WfTrace | GetWf
            | Analyze | TakePedestal | Area | Pedestal | Meas | MeasUnits | MeasType
            | MeasState => Multiplicity::PerChannel,
            _ => Multiplicity::Scalar,
        }
    }

    /// Lower-case name used by the CLI and in log output.
    pub fn name(self) -> &'static str {
        use Param::*;
        match self {
            ChOn => "ch_on",
            ChPos => "ch_pos",
            ChImp => "ch_imp",
            ChCpl => "ch_cpl",
            ChScl => "ch_scl",
            ChSclStep => "ch_scl_step",
            ChSel => "ch_sel",
            WfTrace => "wf_trace",
            WfNpts => "wf_npts",
            WfStart => "wf_start",
            WfStop => "wf_stop",
            WfFmt => "wf_fmt",
            WfWidth => "wf_width",
            WfSource => "wf_source",
            GetWf => "get_wf",
            GetWfAll => "get_wf_all",
            XNpts => "x_npts",
            TraceMode => "trace_mode",
            ReadTraces => "read_traces",
            WfTime => "wf_time",
            WfTimeMin => "wf_time_min",
            WfTimeMax => "wf_time_max",
            WfPeriod => "wf_period",
            WfRate => "wf_rate",
            TraceCount => "trace_count",
            TimDly => "tim_dly",
            TimDlyState => "tim_dly_state",
            TimDlyStr => "tim_dly_str",
            TimDiv => "tim_div",
            TimDivStr => "tim_div_str",
            TimDivValue => "tim_div_value",
            TimDivUnit => "tim_div_unit",
            TrPos => "tr_pos",
            TrLev => "tr_lev",
            TrHoldOff => "tr_hold_off",
            TrMode => "tr_mode",
            TrSource => "tr_source",
            TrSlope => "tr_slope",
            TrState => "tr_state",
            TrLevSlider => "tr_lev_slider",
            Run => "run",
            Stop => "stop",
            AcqState => "acq_state",
            Ese => "ese",
            Esr => "esr",
            Stb => "stb",
            Opc => "opc",
            Cls => "cls",
            Reset => "reset",
            Init => "init",
            ErrUpdate => "err_update",
            EventQueue => "event_queue",
            Header => "header",
            Idn => "idn",
            IpAddr => "ip_addr",
            Name => "name",
            Command => "command",
            Reply => "reply",
            EvMsg => "ev_msg",
            Event => "event",
            Message => "message",
            Analyze => "analyze",
            TakePedestal => "take_pedestal",
            Area => "area",
            Pedestal => "pedestal",
            MarkerChannel => "marker_channel",
            Marker1 => "marker1",
            Marker2 => "marker2",
            PosSlider => "pos_slider",
            FilePath => "file_path",
            Save => "save",
            Restore => "restore",
            Recall => "recall",
            Store => "store",
            Meas => "meas",
            MeasUnits => "meas_units",
            MeasType => "meas_type",
            MeasState => "meas_state",
            MeasEnabled => "meas_enabled",
            PollPeriod => "poll_period",
            QueueSent => "queue_sent",
            QueueFailed => "queue_failed",
            RangeErrors => "range_errors",
            Connected => "connected",
            Update => "update",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| format!("unknown parameter: {s}"))
    }
}
