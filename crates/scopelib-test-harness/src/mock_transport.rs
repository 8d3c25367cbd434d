//! Mock transport for deterministic testing of the dispatch engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. Its script and send log live behind a shared
//! [`MockHandle`], so a test can keep inspecting and extending the script
//! after the transport has been moved into the poller task.
//!
//! # Example
//!
//! ```
//! use scopelib_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.expect(b"*IDN?\n", b"TEKTRONIX,MDO3024,C012345,CF:91.1CT\n");
//! // A write-only command is scripted with an empty response.
//! mock.expect(b"ACQ:STATE RUN\n", b"");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scopelib_core::error::{Error, Result};
use scopelib_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct Script {
    expectations: VecDeque<Expectation>,
    sent_log: Vec<Vec<u8>>,
    flushes: usize,
}

/// Shared view of a [`MockTransport`]'s script and send log.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    script: Arc<Mutex<Script>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an expected request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Every `send()` so far, one element per call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// The send log decoded lossily as text, trailing newline removed.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).trim_end_matches('\n').to_string())
            .collect()
    }

    /// Number of `flush()` calls so far.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }
}

/// A mock [`Transport`] for testing without an instrument.
///
/// Expectations are consumed in order. `send()` records the data and
/// matches it against the next expectation; the paired response is then
/// returned by the following `receive()` calls. An empty response makes the
/// next `receive()` time out, which is how a write-only command or a silent
/// instrument is scripted.
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    connected: bool,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            handle: MockHandle::default(),
            pending_response: None,
            response_cursor: 0,
            connected: true,
        }
    }

    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.handle.expect(request, response);
    }

    /// A handle that stays valid after the transport is moved elsewhere.
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle.sent_data()
    }

    /// Number of `flush()` calls so far.
    pub fn flush_count(&self) -> usize {
        self.handle.lock().flushes
    }

    pub fn remaining_expectations(&self) -> usize {
        self.handle.remaining_expectations()
    }

    /// When `false`, `send()` and `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let mut script = self.handle.lock();
        script.sent_log.push(data.to_vec());

        match script.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                self.pending_response = Some(expectation.response);
                self.response_cursor = 0;
                Ok(())
            }
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))),
            None => Err(Error::Protocol(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            ))),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let Some(response) = self.pending_response.as_ref() else {
            return Err(Error::Timeout);
        };
        let remaining = &response[self.response_cursor..];
        if remaining.is_empty() {
            self.pending_response = None;
            self.response_cursor = 0;
            return Err(Error::Timeout);
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.response_cursor += n;
        if self.response_cursor >= response.len() {
            self.pending_response = None;
            self.response_cursor = 0;
        }
        Ok(n)
    }

    /// Drops whatever is left of the last response.
    async fn flush(&mut self) -> Result<()> {
        self.handle.lock().flushes += 1;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_query_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"TEKTRONIX,TDS3014\n");

        mock.send(b"*IDN?\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"TEKTRONIX,TDS3014\n");
    }

    #[tokio::test]
    async fn handle_sees_sends_after_move() {
        let mut mock = MockTransport::new();
        mock.expect(b"ACQ:STATE RUN\n", b"");
        let handle = mock.handle();

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        boxed.send(b"ACQ:STATE RUN\n").await.unwrap();

        assert_eq!(handle.sent_lines(), vec!["ACQ:STATE RUN".to_string()]);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn handle_can_extend_script() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut boxed: Box<dyn Transport> = Box::new(mock);

        handle.expect(b"*OPC?\n", b"1\n");
        boxed.send(b"*OPC?\n").await.unwrap();
        let mut buf = [0u8; 8];
        let n = boxed
            .receive(&mut buf, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"1\n");
    }

    #[tokio::test]
    async fn empty_response_times_out() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS?\n", b"");
        mock.send(b"CH1:POS?\n").await.unwrap();

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn wrong_request_is_protocol_error() {
        let mut mock = MockTransport::new();
        mock.expect(b"CH1:POS?\n", b"0\n");
        let result = mock.send(b"CH2:POS?\n").await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn exhausted_script_is_protocol_error() {
        let mut mock = MockTransport::new();
        assert!(matches!(mock.send(b"X\n").await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn disconnected_mock_refuses_io() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(b"X").await, Err(Error::NotConnected)));

        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn partial_receive() {
        let mut mock = MockTransport::new();
        mock.expect(b"WAVF?\n", b"ABCD");
        mock.send(b"WAVF?\n").await.unwrap();

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"AB");
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"CD");
    }

    #[tokio::test]
    async fn flush_discards_unread_response() {
        let mut mock = MockTransport::new();
        mock.expect(b"*CLS\n", b"stale\n");
        let handle = mock.handle();
        mock.send(b"*CLS\n").await.unwrap();
        mock.flush().await.unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await,
            Err(Error::Timeout)
        ));
        assert_eq!(handle.flush_count(), 1);
    }

    #[tokio::test]
    async fn close_disconnects() {
        let mut mock = MockTransport::new();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
    }
}
