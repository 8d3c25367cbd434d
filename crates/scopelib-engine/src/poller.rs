//! Message queue and poller task.
//!
//! One tokio task owns the [`Engine`] (and through it the transport) and is
//! the only code that talks to the instrument. Callers push requests into a
//! bounded queue without ever blocking; a full queue is counted and the
//! request dropped.
//!
//! The loop drains queued requests back to back. When the queue is empty it
//! runs the idle work (trace acquisition and measurement refresh, each only
//! when enabled) and then sleeps one poll interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scopelib_core::error::{Error, Result};
use scopelib_core::params::Param;
use scopelib_core::registry::Registry;
use scopelib_core::transport::Transport;

use crate::engine::Engine;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 400;

/// Shortest idle sleep, whatever `PollPeriod` says.
const MIN_POLL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a queued request asks the poller to do with its parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestKind {
    /// Read the parameter from the instrument.
    Query,
    SetInt(i32),
    SetFloat(f64),
}

/// A parameter operation waiting for the poller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRequest {
    pub param: Param,
    /// Channel (or measurement slot) index; 0 for scalar parameters.
    pub addr: usize,
    pub kind: RequestKind,
}

impl PendingRequest {
    pub fn query(param: Param, addr: usize) -> Self {
        PendingRequest {
            param,
            addr,
            kind: RequestKind::Query,
        }
    }

    pub fn set_int(param: Param, addr: usize, value: i32) -> Self {
        PendingRequest {
            param,
            addr,
            kind: RequestKind::SetInt(value),
        }
    }

    pub fn set_float(param: Param, addr: usize, value: f64) -> Self {
        PendingRequest {
            param,
            addr,
            kind: RequestKind::SetFloat(value),
        }
    }
}

/// Everything the poller task accepts.
pub(crate) enum Request {
    Pending(PendingRequest),
    /// Free-form instrument command.
    Raw(String),
    /// A debounced slider edit is due.
    SliderCommit { generation: u64 },
    /// Stop the task and hand the transport back.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Push counters, mirrored into `QueueSent` and `QueueFailed`.
#[derive(Debug, Default)]
pub struct QueueStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl QueueStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Count a rejected push and mirror it into `QueueFailed`.
    pub(crate) fn record_failure(&self, registry: &Registry) -> u64 {
        let n = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
        registry.set_int(Param::QueueFailed, 0, clamp_count(n));
        n
    }
}

/// Handle to the poller task.
pub(crate) struct Poller {
    tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<QueueStats>,
    registry: Arc<Registry>,
}

impl Poller {
    /// Non-blocking push. A full queue counts a failure and drops `req`.
    pub(crate) fn enqueue(&self, req: PendingRequest) -> Result<()> {
        self.push(Request::Pending(req))
    }

    pub(crate) fn enqueue_raw(&self, text: String) -> Result<()> {
        self.push(Request::Raw(text))
    }

    fn push(&self, req: Request) -> Result<()> {
        match self.tx.try_send(req) {
            Ok(()) => {
                let n = self.stats.sent.fetch_add(1, Ordering::Relaxed) + 1;
                self.registry
                    .set_int(Param::QueueSent, 0, clamp_count(n));
                Ok(())
            }
            Err(TrySendError::Full(req)) => {
                let n = self.stats.record_failure(&self.registry);
                if let Request::Pending(p) = req {
                    warn!(param = ?p.param, addr = p.addr, failed = n, "request queue full");
                } else {
                    warn!(failed = n, "request queue full");
                }
                Err(Error::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(Error::NotConnected),
        }
    }

    pub(crate) fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Stop the poller after the requests already queued and recover the
    /// transport.
    pub(crate) async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(Request::Shutdown { reply: reply_tx }).await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }

    /// Stop the poller immediately; the transport is dropped.
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
    }
}

fn clamp_count(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the poller task around `engine`.
pub(crate) fn spawn_poller(mut engine: Engine, capacity: usize) -> Poller {
    let (tx, rx) = mpsc::channel::<Request>(capacity.max(1));
    engine.attach(tx.downgrade());
    let registry = Arc::clone(&engine.registry);
    let stats = Arc::clone(&engine.queue_stats);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poll_loop(engine, rx, cancel.clone()));
    Poller {
        tx,
        cancel,
        task,
        stats,
        registry,
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

fn poll_interval(registry: &Registry) -> Duration {
    let secs = registry.get_float(Param::PollPeriod, 0);
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs).max(MIN_POLL)
    } else {
        MIN_POLL
    }
}

async fn poll_loop(
    mut engine: Engine,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            debug!("poller cancelled");
            break;
        }
        match rx.try_recv() {
            Ok(Request::Shutdown { reply }) => {
                debug!("poller shutdown requested");
                let _ = reply.send(engine.into_transport());
                return;
            }
            Ok(req) => {
                engine.handle(req).await;
                engine.registry.notify_all();
            }
            Err(TryRecvError::Empty) => {
                engine.poll_idle().await;
                let interval = poll_interval(&engine.registry);
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("poller cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(TryRecvError::Disconnected) => {
                debug!("request queue closed, exiting poller");
                break;
            }
        }
    }
}

impl Engine {
    /// Dispatch one dequeued request.
    pub(crate) async fn handle(&mut self, req: Request) {
        match req {
            Request::Pending(p) => self.handle_pending(p).await,
            Request::Raw(text) => {
                let result = self.dispatch.command(&text).await;
                if let Err(e) = result {
                    warn!(cmd = %text, error = %e, "command failed");
                }
            }
            Request::SliderCommit { generation } => self.commit_slider(generation).await,
            // Handled by the loop; a stray one just drops the reply.
            Request::Shutdown { .. } => {}
        }
    }

    /// Idle work: traces and measurements when enabled.
    pub(crate) async fn poll_idle(&mut self) {
        if self.registry.get_int(Param::ReadTraces, 0) != 0 {
            self.get_traces().await;
        }
        if self.registry.get_int(Param::MeasEnabled, 0) != 0 {
            self.get_measurements(self.tick).await;
        }
        self.tick = (self.tick + 1) % 100;
        self.registry.notify_all();
    }
}
