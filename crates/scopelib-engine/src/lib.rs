//! scopelib-engine: the driver machinery shared by every oscilloscope model.
//!
//! One poller task owns the transport and performs all instrument I/O;
//! callers interact through a [`Scope`] handle whose writes are queued and
//! whose reads come from the parameter registry.
//!
//! # Architecture
//!
//! - [`protocol`] -- command formatting and reply framing/parsing
//! - [`dispatch`] -- table-driven typed get/set over the transport
//! - [`health`] -- consecutive-failure tracking
//! - [`poller`] -- bounded request queue and the poll loop
//! - [`waveform`] -- preamble parsing, sample decoding, trace rendering
//! - [`timebase`] -- time/div and delay display helpers
//! - [`scope`] / [`builder`] -- the public handle and its builder
//!
//! Request handling, channel synchronization and persistence are internal
//! to the poller.

pub mod builder;
pub mod dispatch;
mod engine;
pub mod health;
mod persist;
pub mod poller;
pub mod protocol;
mod requests;
pub mod scope;
pub mod sync;
pub mod timebase;
pub mod waveform;

#[cfg(test)]
mod testing;

pub use builder::ScopeBuilder;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use engine::EngineConfig;
pub use health::ConnectionHealth;
pub use poller::{DEFAULT_QUEUE_CAPACITY, PendingRequest, QueueStats, RequestKind};
pub use scope::Scope;
pub use waveform::{Preamble, SENTINEL, Trace};
