//! Channel selection and slider synchronization.
//!
//! One channel at a time is "selected": its position drives the position
//! slider, and slider edits are written back to it. Slider edits are
//! debounced: each edit restarts a one-shot timer, and only when the timer
//! expires is a commit request pushed back through the request queue, so the
//! device write still happens on the poller.
//!
//! The trigger-level slider maps onto the trigger source channel's screen:
//! `slider = (position + level / volts_per_div) * 100`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use scopelib_core::model::CommandId;
use scopelib_core::params::Param;
use scopelib_core::types::NUM_CHANNELS;

use crate::engine::Engine;
use crate::poller::Request;

/// Coalesces rapid edits into one deferred commit.
#[derive(Debug)]
pub struct Debouncer {
    period: Duration,
    staged: f64,
    in_progress: bool,
    generation: u64,
    /// Generation whose commit could not be delivered.
    abandoned: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(period: Duration) -> Self {
        Debouncer {
            period,
            staged: 0.0,
            in_progress: false,
            generation: 0,
            abandoned: Arc::new(AtomicU64::new(0)),
            timer: None,
        }
    }

    /// Stage `value` and restart the timer; `fire` runs with the new
    /// generation once the period passes without another edit.
    ///
    /// `fire` reports whether the commit was delivered. An undelivered
    /// commit ends the edit as if it had been cancelled.
    pub fn restart<F>(&mut self, value: f64, fire: F)
    where
        F: FnOnce(u64) -> bool + Send + 'static,
    {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.staged = value;
        self.in_progress = true;
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let period = self.period;
        let abandoned = Arc::clone(&self.abandoned);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            if !fire(generation) {
                abandoned.store(generation, Ordering::Release);
            }
        }));
    }

    /// Take the staged value if `generation` is the latest edit.
    pub fn take(&mut self, generation: u64) -> Option<f64> {
        if self.in_progress() && generation == self.generation {
            self.in_progress = false;
            self.timer = None;
            Some(self.staged)
        } else {
            None
        }
    }

    /// Drop any pending edit.
    pub fn cancel(&mut self) {
        self.in_progress = false;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress && self.abandoned.load(Ordering::Acquire) != self.generation
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Selected-channel bookkeeping.
#[derive(Debug)]
pub(crate) struct ChannelSync {
    pub(crate) selected: Option<usize>,
    /// Channels whose details have been read at least once.
    pub(crate) seen: [bool; NUM_CHANNELS],
    pub(crate) slider: Debouncer,
}

impl ChannelSync {
    pub(crate) fn new(debounce: Duration) -> Self {
        ChannelSync {
            selected: None,
            seen: [false; NUM_CHANNELS],
            slider: Debouncer::new(debounce),
        }
    }
}

impl Engine {
    fn channel_on(&self, ch: usize) -> bool {
        self.registry.get_int(Param::ChOn, ch) != 0
    }

    /// Select `ch` for the position slider.
    ///
    /// A disabled channel keeps the current selection; its select flag is
    /// pulsed so displays re-read it.
    pub(crate) fn select_channel(&mut self, ch: usize) {
        if ch >= NUM_CHANNELS {
            return;
        }
        if !self.channel_on(ch) {
            self.registry.set_int(Param::ChSel, ch, 1);
            self.registry.notify(ch);
            self.registry.set_int(Param::ChSel, ch, 0);
            return;
        }
        self.channels.slider.cancel();
        for i in 0..NUM_CHANNELS {
            self.registry.set_int(Param::ChSel, i, i32::from(i == ch));
        }
        self.channels.selected = Some(ch);
        self.update_pos_slider(ch);
        debug!(ch, "channel selected");
    }

    /// Keep a selection on an enabled channel if there is one.
    pub(crate) fn auto_select(&mut self) {
        if let Some(ch) = self.channels.selected {
            if self.channel_on(ch) {
                return;
            }
        }
        if let Some(ch) = (0..NUM_CHANNELS).find(|&ch| self.channel_on(ch)) {
            self.select_channel(ch);
        }
    }

    /// Mirror a channel's position onto the slider unless an edit is pending.
    pub(crate) fn update_pos_slider(&mut self, ch: usize) {
        if self.channels.selected != Some(ch) || self.channels.slider.in_progress() {
            return;
        }
        let pos = self.registry.get_float(Param::ChPos, ch);
        self.registry
            .set_int(Param::PosSlider, 0, (pos * 100.0).round() as i32);
    }

    /// The trigger source as a channel index, if it is an enabled channel.
    fn trigger_channel(&self) -> Option<usize> {
        let src = usize::try_from(self.registry.get_int(Param::TrSource, 0)).ok()?;
        (src < NUM_CHANNELS && self.channel_on(src)).then_some(src)
    }

    /// Recompute the trigger-level slider from the current level.
    pub(crate) fn update_trig_slider(&mut self) {
        let Some(src) = self.trigger_channel() else {
            return;
        };
        let pos = self.registry.get_float(Param::ChPos, src);
        let mut scl = self.registry.get_float(Param::ChScl, src);
        if scl.abs() < 1e-6 {
            scl = 1.0;
        }
        let level = self.registry.get_float(Param::TrLev, 0);
        let slider = ((pos + level / scl) * 100.0).round() as i32;
        self.registry.set_int(Param::TrLevSlider, 0, slider);
    }

    /// Write the trigger level that puts the trigger at `slider`.
    pub(crate) async fn set_trig_level(&mut self, slider: i32) {
        let Some(src) = self.trigger_channel() else {
            return;
        };
        let pos = self.registry.get_float(Param::ChPos, src);
        let scl = self.registry.get_float(Param::ChScl, src);
        let level = (f64::from(slider) / 100.0 - pos) * scl;
        self.dispatch
            .set_float(CommandId::TrLev, Param::TrLev, 0, level)
            .await;
        self.registry.set_int(Param::TrLevSlider, 0, slider);
    }

    /// Stage a position-slider edit for the selected channel.
    pub(crate) fn slider_moved(&mut self, slider: i32) {
        if self.channels.selected.is_none() {
            return;
        }
        let Some(requests) = self.requests.clone() else {
            return;
        };
        let stats = Arc::clone(&self.queue_stats);
        let registry = Arc::clone(&self.registry);
        self.registry.set_int(Param::PosSlider, 0, slider);
        self.channels
            .slider
            .restart(f64::from(slider) / 100.0, move |generation| {
                let Some(tx) = requests.upgrade() else {
                    return false;
                };
                match tx.try_send(Request::SliderCommit { generation }) {
                    Ok(()) => true,
                    Err(_) => {
                        let failed = stats.record_failure(&registry);
                        registry.notify(0);
                        warn!(generation, failed, "slider commit dropped, queue full");
                        false
                    }
                }
            });
    }

    /// Write the staged slider position if `generation` is still current.
    pub(crate) async fn commit_slider(&mut self, generation: u64) {
        let Some(ch) = self.channels.selected else {
            return;
        };
        if let Some(pos) = self.channels.slider.take(generation) {
            self.put_float_cmds(Param::ChPos, ch, pos).await;
        }
    }
}
