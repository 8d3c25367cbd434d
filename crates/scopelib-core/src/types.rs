//! Core types used throughout scopelib.

use std::fmt;
use std::str::FromStr;

/// Number of analog input channels on every supported instrument.
pub const NUM_CHANNELS: usize = 4;

/// Value stored in the parameter registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
    FloatArray(Vec<f64>),
}

impl Value {
    /// The zero value for a parameter of the given kind.
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int | ValueKind::Enum => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::FloatArray => Value::FloatArray(Vec::new()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::FloatArray(a) => write!(f, "[{} samples]", a.len()),
        }
    }
}

/// How a parameter's value is typed and parsed from instrument replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    /// Integer index into a model keyword list.
    Enum,
    FloatArray,
}

/// Whether a parameter exists once or once per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    Scalar,
    PerChannel,
}

/// Alarm status attached to every registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlarmStatus {
    #[default]
    NoAlarm,
    /// Communication with the instrument failed.
    Comm,
    /// Last read could not be parsed.
    Read,
}

/// Alarm severity attached to every registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

/// Combined alarm state of one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alarm {
    pub status: AlarmStatus,
    pub severity: AlarmSeverity,
}

impl Alarm {
    /// The alarm raised on every parameter when the connection goes down.
    pub const COMM_INVALID: Alarm = Alarm {
        status: AlarmStatus::Comm,
        severity: AlarmSeverity::Invalid,
    };

    pub fn is_active(&self) -> bool {
        self.severity != AlarmSeverity::NoAlarm
    }
}

/// How waveforms are collected during idle polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TraceMode {
    /// Channels are fetched independently.
    #[default]
    None,
    /// Same as `None`; kept so stored values keep their meaning.
    Async,
    /// Acquisition is stopped so all channels come from the same trigger.
    Sync,
}

impl TraceMode {
    pub fn from_index(v: i32) -> Self {
        match v {
            1 => TraceMode::Async,
            2 => TraceMode::Sync,
            _ => TraceMode::None,
        }
    }
}

/// Keyword match rule used when mapping a reply onto a keyword list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnumMatch {
    /// The trimmed reply must equal the keyword.
    #[default]
    Exact,
    /// The keyword must start with the trimmed reply.
    ///
    /// Accepts abbreviated replies such as `"RI"` for `"RIBINARY"`, but a
    /// short reply can match a longer keyword that merely shares a prefix.
    Prefix,
}

impl FromStr for EnumMatch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(EnumMatch::Exact),
            "prefix" => Ok(EnumMatch::Prefix),
            _ => Err(format!("unknown enum match rule: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_defaults_follow_kind() {
        assert_eq!(Value::default_for(ValueKind::Int), Value::Int(0));
        assert_eq!(Value::default_for(ValueKind::Enum), Value::Int(0));
        assert_eq!(Value::default_for(ValueKind::Float), Value::Float(0.0));
        assert_eq!(Value::default_for(ValueKind::Str), Value::Str(String::new()));
        assert_eq!(
            Value::default_for(ValueKind::FloatArray),
            Value::FloatArray(Vec::new())
        );
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Str("TEKTRONIX".into()).to_string(), "TEKTRONIX");
        assert_eq!(
            Value::FloatArray(vec![0.0; 10]).to_string(),
            "[10 samples]"
        );
    }

    #[test]
    fn alarm_default_is_inactive() {
        assert!(!Alarm::default().is_active());
        assert!(Alarm::COMM_INVALID.is_active());
    }

    #[test]
    fn trace_mode_from_index() {
        assert_eq!(TraceMode::from_index(0), TraceMode::None);
        assert_eq!(TraceMode::from_index(1), TraceMode::Async);
        assert_eq!(TraceMode::from_index(2), TraceMode::Sync);
        assert_eq!(TraceMode::from_index(7), TraceMode::None);
    }

    #[test]
    fn enum_match_from_str() {
        assert_eq!("exact".parse::<EnumMatch>().unwrap(), EnumMatch::Exact);
        assert_eq!("PREFIX".parse::<EnumMatch>().unwrap(), EnumMatch::Prefix);
        assert!("fuzzy".parse::<EnumMatch>().is_err());
    }
}
