//! Transport implementations for scopelib.
//!
//! Concrete implementations of the [`Transport`](scopelib_core::Transport)
//! trait for the physical links oscilloscopes are controlled over:
//!
//! - [`TcpTransport`]: raw socket servers on LAN-attached instruments
//! - [`SerialTransport`]: RS-232 and USB-serial ports

pub mod serial;
pub mod tcp;

pub use serial::{FlowControl, Parity, SerialConfig, SerialTransport};
pub use tcp::TcpTransport;
