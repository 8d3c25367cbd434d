//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to an oscilloscope.
//! Implementations exist for TCP sockets (LAN instruments), serial ports, and
//! mock transports for testing.
//!
//! The dispatch engine operates on a `Transport` rather than directly on a
//! socket, enabling both real hardware control and deterministic unit testing
//! with `MockTransport` from the `scopelib-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound on bytes discarded by the default [`Transport::flush`].
const FLUSH_LIMIT: usize = 64 * 1024;

/// Asynchronous byte-level transport to an instrument.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Command formatting, reply framing and parsing are handled by the
/// dispatch engine that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the instrument.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the instrument into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`] if no data is received
    /// within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard any stale input before a new exchange.
    ///
    /// The default implementation reads with a zero timeout until nothing
    /// is left.
    async fn flush(&mut self) -> Result<()> {
        let mut buf = [0u8; 512];
        let mut discarded = 0;
        loop {
            match self.receive(&mut buf, Duration::ZERO).await {
                Ok(0) | Err(Error::Timeout) => break,
                Ok(n) => {
                    discarded += n;
                    if discarded >= FLUSH_LIMIT {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarded stale input");
        }
        Ok(())
    }

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`].
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
