//! scopelib-test-harness: mock transports for testing scopelib without an
//! instrument.
//!
//! [`MockTransport`] scripts request/response pairs at the [`Transport`]
//! level for unit tests of the dispatch engine and poller.
//! [`MockTcpServer`] plays the same kind of script over a real socket.
//!
//! [`Transport`]: scopelib_core::Transport

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::{MockHandle, MockTransport};
