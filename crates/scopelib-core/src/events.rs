//! Asynchronous scope event types.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel owned by
//! the [`crate::registry::Registry`]. Host bindings subscribe to these events
//! to refresh displayed values without polling the registry.

use crate::params::Param;

/// An event emitted when driver state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events while traces are streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeEvent {
    /// One or more parameters changed at an address.
    ParamsChanged {
        /// Channel (0..3), measurement slot, or 0 for scalar parameters.
        addr: usize,
        /// Parameters written since the previous notify for this address.
        params: Vec<Param>,
    },

    /// Communication with the instrument recovered.
    Connected,

    /// Consecutive failures reached the threshold; every parameter is now
    /// flagged with a communication alarm.
    Disconnected,
}
