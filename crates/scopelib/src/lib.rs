//! # scopelib -- asynchronous oscilloscope control
//!
//! `scopelib` drives SCPI oscilloscopes over a LAN socket or a serial line.
//! A single poller task owns the link: writes from the caller are queued,
//! idle time is spent refreshing traces and measurements, and every value
//! the instrument reports lands in a parameter registry that callers read
//! or subscribe to.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scopelib::{Param, ScopeBuilder};
//! use scopelib::tek::mdo3000;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scope = ScopeBuilder::new(mdo3000())
//!         .host("192.168.1.20")
//!         .build()
//!         .await?;
//!     scope.after_init()?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     println!("{}", scope.read_string(Param::Idn, 0));
//!     scope.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                    | Purpose                                              |
//! |--------------------------|------------------------------------------------------|
//! | `scopelib-core`          | Parameters, registry, model tables, errors           |
//! | `scopelib-transport`     | TCP and serial transports                            |
//! | `scopelib-engine`        | Dispatch, poller, waveform decoding, `Scope` handle  |
//! | `scopelib-tek`           | Tektronix MDO3000 and TDS3000 tables                 |
//! | **`scopelib`**           | This facade crate -- re-exports everything           |
//!
//! ## Feature Flags
//!
//! | Feature | Enables                      | Default |
//! |---------|------------------------------|---------|
//! | `tek`   | [`tek`] module (Tektronix)   | yes     |

pub use scopelib_core::*;

pub use scopelib_engine::{
    ConnectionHealth, DEFAULT_QUEUE_CAPACITY, PendingRequest, QueueStats, RequestKind, SENTINEL,
    Scope, ScopeBuilder,
};

/// Engine internals for callers that decode or format on their own.
pub mod engine {
    pub use scopelib_engine::{dispatch, health, poller, protocol, sync, timebase, waveform};
}

/// Transports for callers that open the link themselves and hand it to
/// [`ScopeBuilder::build_with_transport`].
pub mod transport {
    pub use scopelib_transport::*;
}

/// Tektronix instrument tables.
#[cfg(feature = "tek")]
pub mod tek {
    pub use scopelib_tek::*;
}

/// Every model from the enabled instrument backends.
///
/// ```
/// for model in scopelib::supported_models() {
///     println!("{} ({} samples)", model.name, model.trace_length);
/// }
/// ```
pub fn supported_models() -> Vec<ScopeModel> {
    #[allow(unused_mut)]
    let mut models = Vec::new();

    #[cfg(feature = "tek")]
    models.extend(tek::all_tek_models());

    models
}

/// Find a model by name across all enabled backends, ignoring case.
pub fn find_model(name: &str) -> Option<ScopeModel> {
    supported_models()
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name) || m.model_id.eq_ignore_ascii_case(name))
}
