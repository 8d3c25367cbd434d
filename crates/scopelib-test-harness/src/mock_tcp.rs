//! Mock instrument socket server.
//!
//! [`MockTcpServer`] listens on a random localhost port and answers a single
//! client from a script of line-oriented exchanges, the way a LAN
//! oscilloscope's socket server behaves. It exercises the real
//! `TcpTransport` end to end without an instrument on the bench.
//!
//! # Example
//!
//! ```
//! use scopelib_test_harness::MockTcpServer;
//!
//! # async fn example() -> scopelib_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(b"*IDN?\n", b"TEKTRONIX,MDO3024\n");
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` ...
//! server.wait().await.map_err(scopelib_core::Error::Transport)?;
//! # Ok(())
//! # }
//! ```

use scopelib_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A scripted single-client socket server.
///
/// For each expectation the server reads exactly `request.len()` bytes,
/// compares them, and writes `response` (possibly empty). A mismatch ends
/// the session with an error reported by [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a listener on a random localhost port.
    ///
    /// The listener is bound immediately, so clients may connect as soon as
    /// [`start`](MockTcpServer::start) has been called.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The port half of [`addr`](MockTcpServer::addr).
    pub fn port(&self) -> u16 {
        self.addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    }

    /// Accept one client and play the script in a background task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        self.server_handle = Some(tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            for (i, expectation) in expectations.iter().enumerate() {
                serve_one(&mut stream, i, expectation).await?;
            }
            Ok(())
        }));
    }

    /// Wait for the script to finish and report any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

async fn serve_one(
    stream: &mut TcpStream,
    i: usize,
    expectation: &TcpExpectation,
) -> std::result::Result<(), String> {
    let mut buf = vec![0u8; expectation.request.len()];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| format!("expectation {i}: read error: {e}"))?;

    if buf != expectation.request {
        return Err(format!(
            "expectation {i}: request mismatch: expected {:?}, got {:?}",
            String::from_utf8_lossy(&expectation.request),
            String::from_utf8_lossy(&buf)
        ));
    }

    if !expectation.response.is_empty() {
        stream
            .write_all(&expectation.response)
            .await
            .map_err(|e| format!("expectation {i}: write error: {e}"))?;
        stream
            .flush()
            .await
            .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
    }
    Ok(())
}
