//! Time/div and delay display helpers.

use tracing::debug;

use scopelib_core::model::CommandId;
use scopelib_core::params::Param;

use crate::engine::Engine;

/// Seconds per unit for the `ns`, `us`, `ms`, `s` unit indices.
const UNIT_SCALE: [f64; 4] = [1e-9, 1e-6, 1e-3, 1.0];
const UNIT_NAMES: [&str; 4] = ["ns", "us", "ms", "s"];

/// A time/div value broken into display parts.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePerDiv {
    pub mantissa: i64,
    /// Index into the model's mantissa list.
    pub value_index: usize,
    /// Index into `ns`, `us`, `ms`, `s`.
    pub unit_index: usize,
    pub label: String,
}

/// Split seconds-per-division into a mantissa and unit.
pub fn split_time_per_div(seconds: f64, values: &[u32]) -> TimePerDiv {
    let unit_index = if seconds < 0.9e-6 {
        0
    } else if seconds < 0.9e-3 {
        1
    } else if seconds < 0.9 {
        2
    } else {
        3
    };
    let mantissa = (seconds / UNIT_SCALE[unit_index]).round() as i64;
    let value_index = values
        .iter()
        .position(|&v| mantissa <= i64::from(v))
        .unwrap_or(values.len().saturating_sub(1));
    TimePerDiv {
        mantissa,
        value_index,
        unit_index,
        label: format!("{mantissa} {}/div", UNIT_NAMES[unit_index]),
    }
}

/// Format a trigger delay, keeping its sign.
pub fn delay_label(seconds: f64) -> String {
    let magnitude = seconds.abs();
    let unit_index = if magnitude < 1e-6 {
        0
    } else if magnitude < 1e-3 {
        1
    } else if magnitude < 1.0 {
        2
    } else {
        3
    };
    let m = (seconds / UNIT_SCALE[unit_index]).round() as i64;
    format!("{m} {}", UNIT_NAMES[unit_index])
}

/// Seconds per division for a (mantissa index, unit index) pair.
pub fn compose(value_index: usize, unit_index: usize, values: &[u32]) -> Option<f64> {
    let mantissa = f64::from(*values.get(value_index)?);
    Some(mantissa * UNIT_SCALE.get(unit_index)?)
}

impl Engine {
    /// Republish every value derived from the current time/div.
    pub(crate) fn publish_time_per_div(&mut self, seconds: f64) {
        let split = split_time_per_div(seconds, self.model.time_div_values);
        self.registry.set_string(Param::TimDivStr, 0, split.label);
        self.registry
            .set_int(Param::TimDivValue, 0, split.value_index as i32);
        self.registry
            .set_int(Param::TimDivUnit, 0, split.unit_index as i32);
        let points = self.model.scale_for(seconds).points;
        self.registry.set_int(Param::XNpts, 0, points as i32);
    }

    pub(crate) fn publish_delay(&mut self, seconds: f64) {
        self.registry
            .set_string(Param::TimDlyStr, 0, delay_label(seconds));
    }

    /// Write the time/div named by a mantissa and unit index.
    pub(crate) async fn set_time_per_div(&mut self, value_index: i32, unit_index: i32) {
        let seconds = usize::try_from(value_index)
            .ok()
            .zip(usize::try_from(unit_index).ok())
            .and_then(|(v, u)| compose(v, u, self.model.time_div_values));
        let Some(seconds) = seconds else {
            debug!(value_index, unit_index, "time/div selection out of range");
            return;
        };
        if self
            .dispatch
            .set_text(CommandId::TimDiv, 0, &format!("{seconds:e}"))
            .await
        {
            self.registry.set_float(Param::TimDiv, 0, seconds);
            self.publish_time_per_div(seconds);
        }
    }
}
