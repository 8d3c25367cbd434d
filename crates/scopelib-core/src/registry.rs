//! Parameter registry shared between callers and the poller task.
//!
//! Every [`Param`] has one slot (scalar parameters) or one slot per channel.
//! Writes mark the slot changed; [`Registry::notify`] publishes the set of
//! changed parameters at an address as a single [`ScopeEvent`].
//!
//! The map lives behind a `std::sync::RwLock` that is only held for the
//! duration of a lookup, so callers on any thread see last-write-wins values
//! without ever waiting on instrument I/O.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use crate::events::ScopeEvent;
use crate::params::Param;
use crate::types::{Alarm, AlarmSeverity, AlarmStatus, Multiplicity, NUM_CHANNELS, Value};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    alarm: Alarm,
    changed: bool,
}

/// Per-address key/value store with alarms and change notification.
#[derive(Debug)]
pub struct Registry {
    slots: RwLock<HashMap<(Param, usize), Slot>>,
    event_tx: broadcast::Sender<ScopeEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry with every parameter at its zero value.
    pub fn new() -> Self {
        let mut slots = HashMap::new();
        for &param in Param::ALL {
            let addrs = match param.multiplicity() {
                Multiplicity::Scalar => 1,
                Multiplicity::PerChannel => NUM_CHANNELS,
            };
            for addr in 0..addrs {
                slots.insert(
                    (param, addr),
                    Slot {
                        value: Value::default_for(param.kind()),
                        alarm: Alarm::default(),
                        changed: false,
                    },
                );
            }
        }
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Registry {
            slots: RwLock::new(slots),
            event_tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(Param, usize), Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(Param, usize), Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scalar parameters live at address 0 whatever address is passed.
    fn key(param: Param, addr: usize) -> (Param, usize) {
        match param.multiplicity() {
            Multiplicity::Scalar => (param, 0),
            Multiplicity::PerChannel => (param, addr),
        }
    }

    /// Read a raw value, or `None` for an address the parameter does not have.
    pub fn get(&self, param: Param, addr: usize) -> Option<Value> {
        self.read()
            .get(&Self::key(param, addr))
            .map(|s| s.value.clone())
    }

    pub fn get_int(&self, param: Param, addr: usize) -> i32 {
        match self.get(param, addr) {
            Some(Value::Int(v)) => v,
            Some(Value::Float(v)) => v as i32,
            _ => 0,
        }
    }

    pub fn get_float(&self, param: Param, addr: usize) -> f64 {
        match self.get(param, addr) {
            Some(Value::Float(v)) => v,
            Some(Value::Int(v)) => f64::from(v),
            _ => 0.0,
        }
    }

    pub fn get_string(&self, param: Param, addr: usize) -> String {
        match self.get(param, addr) {
            Some(Value::Str(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn get_array(&self, param: Param, addr: usize) -> Vec<f64> {
        match self.get(param, addr) {
            Some(Value::FloatArray(a)) => a,
            _ => Vec::new(),
        }
    }

    /// Store a value and mark it changed. Unknown addresses are ignored.
    pub fn set(&self, param: Param, addr: usize, value: Value) {
        let mut slots = self.write();
        match slots.get_mut(&Self::key(param, addr)) {
            Some(slot) => {
                slot.value = value;
                slot.changed = true;
            }
            None => tracing::debug!(param = %param, addr, "write to unknown address ignored"),
        }
    }

    pub fn set_int(&self, param: Param, addr: usize, value: i32) {
        self.set(param, addr, Value::Int(value));
    }

    pub fn set_float(&self, param: Param, addr: usize, value: f64) {
        self.set(param, addr, Value::Float(value));
    }

    pub fn set_string(&self, param: Param, addr: usize, value: impl Into<String>) {
        self.set(param, addr, Value::Str(value.into()));
    }

    pub fn set_array(&self, param: Param, addr: usize, value: Vec<f64>) {
        self.set(param, addr, Value::FloatArray(value));
    }

    pub fn alarm(&self, param: Param, addr: usize) -> Alarm {
        self.read()
            .get(&Self::key(param, addr))
            .map(|s| s.alarm)
            .unwrap_or_default()
    }

    pub fn set_alarm(
        &self,
        param: Param,
        addr: usize,
        status: AlarmStatus,
        severity: AlarmSeverity,
    ) {
        if let Some(slot) = self.write().get_mut(&Self::key(param, addr)) {
            slot.alarm = Alarm { status, severity };
            slot.changed = true;
        }
    }

    /// Apply `alarm` to every slot except those of `except`.
    pub fn set_alarm_all_except(&self, except: Param, alarm: Alarm) {
        for ((param, _), slot) in self.write().iter_mut() {
            if *param != except {
                slot.alarm = alarm;
                slot.changed = true;
            }
        }
    }

    /// Clear every active alarm.
    pub fn clear_alarms(&self) {
        for slot in self.write().values_mut() {
            if slot.alarm.is_active() {
                slot.alarm = Alarm::default();
                slot.changed = true;
            }
        }
    }

    /// Publish the parameters changed at `addr` since the last notify.
    ///
    /// Scalar parameters are reported with address 0.
    pub fn notify(&self, addr: usize) {
        let mut params: Vec<Param> = self
            .write()
            .iter_mut()
            .filter(|((_, a), slot)| *a == addr && slot.changed)
            .map(|((p, _), slot)| {
                slot.changed = false;
                *p
            })
            .collect();
        if params.is_empty() {
            return;
        }
        params.sort();
        // No receivers is not an error.
        let _ = self.event_tx.send(ScopeEvent::ParamsChanged { addr, params });
    }

    /// Notify every channel address.
    pub fn notify_all(&self) {
        for addr in 0..NUM_CHANNELS {
            self.notify(addr);
        }
    }

    /// Broadcast a connection-level event.
    pub fn emit(&self, event: ScopeEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.event_tx.subscribe()
    }
}
