//! Instrument-model configuration.
//!
//! An instrument variant is pure data: a [`CommandTable`] mapping each
//! [`CommandId`] to a printf-style template and optional keyword list, the
//! time/div vocabulary, a horizontal-scale table and a preamble layout tag.
//! The dispatch engine is parameterized by a [`ScopeModel`] at construction
//! and never hard-codes instrument vocabulary.

use crate::error::{Error, Result};

/// Abstract command index, independent of any instrument's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    // Channel
    ChOn,
    ChPos,
    ChImp,
    ChCpl,
    ChScl,
    ChSclStep,

    // Waveform transfer
    WfData,
    WfNpts,
    WfWidth,
    WfStart,
    WfStop,
    WfFmt,
    WfSource,

    // Timebase
    TimDly,
    TimDlyState,
    TimDiv,
    TrPos,

    // Trigger
    TrLev,
    TrHoldOff,
    TrMode,
    TrSource,
    TrSlope,
    TrState,

    // Acquisition
    AcqState,
    Run,
    Stop,

    // IEEE 488.2 common commands and status
    Ese,
    Cls,
    Esr,
    EventQueue,
    Opc,
    Stb,
    Reset,
    Recall,
    Store,
    Idn,
    IpAddr,
    Init,
    Header,
    GetConf,
    ErrMsg,

    // Measurements, one slot per placeholder value
    MeasValue,
    MeasUnits,
    MeasType,
    MeasState,
}

/// One command template with its optional keyword list.
///
/// `template` contains at most one `%d` placeholder, replaced by the 1-based
/// channel (or measurement slot). An empty template marks the command as
/// unsupported on this model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub id: CommandId,
    pub template: &'static str,
    pub keywords: &'static [&'static str],
}

impl CommandSpec {
    pub const fn new(id: CommandId, template: &'static str) -> Self {
        CommandSpec {
            id,
            template,
            keywords: &[],
        }
    }

    pub const fn with_keywords(
        id: CommandId,
        template: &'static str,
        keywords: &'static [&'static str],
    ) -> Self {
        CommandSpec {
            id,
            template,
            keywords,
        }
    }

    /// Whether the template expects a channel substitution.
    pub fn has_channel(&self) -> bool {
        self.template.contains("%d")
    }
}

/// Immutable table of command specs for one instrument model.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    specs: Vec<CommandSpec>,
}

impl CommandTable {
    pub fn new(specs: Vec<CommandSpec>) -> Self {
        CommandTable { specs }
    }

    /// Resolve a command, failing with [`Error::Unsupported`] when the model
    /// has no template for it.
    pub fn get(&self, id: CommandId) -> Result<&CommandSpec> {
        self.specs
            .iter()
            .find(|s| s.id == id && !s.template.is_empty())
            .ok_or_else(|| Error::Unsupported(format!("{id:?}")))
    }

    /// Keyword list for an enumerated command; empty if none.
    pub fn keywords(&self, id: CommandId) -> &'static [&'static str] {
        self.specs
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.keywords)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }
}

/// One row of the horizontal-scale table.
///
/// At the given time/div the on-screen portion of a capture starts at sample
/// `start` and spans `points` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizontalScale {
    /// Time per division in nanoseconds.
    pub nanos: u64,
    pub start: usize,
    pub points: usize,
}

impl HorizontalScale {
    pub const fn new(nanos: u64, start: usize, points: usize) -> Self {
        HorizontalScale {
            nanos,
            start,
            points,
        }
    }
}

/// Layout of the textual waveform preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreambleFormat {
    /// 16 `;`-separated fields, point count in field 6 (TDS3000 family).
    TdsSemicolon16,
    /// 22 `;`-separated fields, point count in field 7 (MDO3000 family).
    MdoSemicolon22,
}

impl PreambleFormat {
    /// Number of `;`-terminated fields preceding the binary block.
    pub fn field_count(self) -> usize {
        match self {
            PreambleFormat::TdsSemicolon16 => 16,
            PreambleFormat::MdoSemicolon22 => 22,
        }
    }
}

/// One persisted section: the settings written as a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveGroup {
    pub name: &'static str,
    /// Settings in write order; channel 0 means the command takes none.
    pub settings: Vec<(CommandId, usize)>,
}

/// Static definition of an oscilloscope model.
#[derive(Debug, Clone)]
pub struct ScopeModel {
    /// Human-readable model name (e.g. "MDO3000").
    pub name: &'static str,
    /// Machine-readable identifier used for lookup.
    pub model_id: &'static str,
    pub default_tcp_port: u16,
    pub default_baud_rate: u32,
    pub commands: CommandTable,
    /// Time/div mantissas, indexed by `TimDivValue`.
    pub time_div_values: &'static [u32],
    /// Time/div units, indexed by `TimDivUnit`.
    pub time_div_units: &'static [&'static str],
    pub horizontal_scales: Vec<HorizontalScale>,
    pub preamble: PreambleFormat,
    /// Length of every published trace array.
    pub trace_length: usize,
    pub num_measurements: usize,
    /// Index into the `TrState` keyword list that means "triggered".
    pub triggered_state: usize,
    pub save_groups: Vec<SaveGroup>,
}

impl ScopeModel {
    /// Find the on-screen window for a time/div in seconds.
    ///
    /// Matching is exact on the value rounded to whole nanoseconds; anything
    /// unrecognized falls back to the last (slowest) entry. A model without a
    /// table shows the whole record.
    pub fn scale_for(&self, time_per_div: f64) -> HorizontalScale {
        let nanos = (time_per_div * 1e9).round();
        self.horizontal_scales
            .iter()
            .find(|hs| hs.nanos as f64 == nanos)
            .or_else(|| self.horizontal_scales.last())
            .copied()
            .unwrap_or(HorizontalScale::new(0, 0, self.trace_length))
    }
}
