//! scopelib-core: Core traits, types, and error definitions for scopelib.
//!
//! This crate defines the instrument-agnostic abstractions shared by the
//! dispatch engine, the transports, and every instrument variant.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`Param`] -- abstract parameters, independent of instrument vocabulary
//! - [`Registry`] -- per-address value store with alarms and notification
//! - [`ScopeModel`] -- instrument variant as pure configuration data
//! - [`ScopeEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod model;
pub mod params;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use scopelib_core::*`.
pub use error::{Error, ErrorClass, Result};
pub use events::ScopeEvent;
pub use model::{
    CommandId, CommandSpec, CommandTable, HorizontalScale, PreambleFormat, SaveGroup, ScopeModel,
};
pub use params::Param;
pub use registry::Registry;
pub use transport::Transport;
pub use types::*;
