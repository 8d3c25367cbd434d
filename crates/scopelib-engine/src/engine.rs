//! Poller-owned engine state.
//!
//! [`Engine`] bundles the dispatcher with everything the request handlers
//! need: the model, the registry, channel-selection and slider state, and
//! per-channel acquisition bookkeeping. It lives on the poller task and is
//! never shared; the few settings callers change directly (analysis flags
//! and markers) sit in [`Shared`] behind a mutex.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use scopelib_core::model::ScopeModel;
use scopelib_core::registry::Registry;
use scopelib_core::transport::Transport;

use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::poller::{QueueStats, Request};
use crate::sync::ChannelSync;
use crate::waveform::{Acquisition, Analysis};

/// Engine settings chosen at build time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    /// Quiet period before a position-slider edit is written.
    pub debounce: Duration,
    /// Fallback save/restore file when `FilePath` is empty.
    pub config_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dispatch: DispatchConfig::default(),
            debounce: Duration::from_millis(200),
            config_path: None,
        }
    }
}

/// State written from caller threads and read by the poller.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    analysis: Mutex<Analysis>,
}

impl Shared {
    pub(crate) fn analysis(&self) -> MutexGuard<'_, Analysis> {
        self.analysis.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Engine {
    pub(crate) dispatch: Dispatcher,
    pub(crate) registry: Arc<Registry>,
    pub(crate) model: Arc<ScopeModel>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) channels: ChannelSync,
    pub(crate) acquisition: Acquisition,
    /// Idle-poll counter, wraps at 100.
    pub(crate) tick: u32,
    pub(crate) config_path: Option<PathBuf>,
    /// Path back into the request queue for deferred work.
    pub(crate) requests: Option<mpsc::WeakSender<Request>>,
    /// Push counters shared with the caller-side queue handle.
    pub(crate) queue_stats: Arc<QueueStats>,
}

impl Engine {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        model: Arc<ScopeModel>,
        registry: Arc<Registry>,
        config: EngineConfig,
    ) -> Self {
        let dispatch = Dispatcher::new(
            transport,
            Arc::clone(&model),
            Arc::clone(&registry),
            &config.dispatch,
        );
        Engine {
            dispatch,
            registry,
            model,
            shared: Arc::new(Shared::default()),
            channels: ChannelSync::new(config.debounce),
            acquisition: Acquisition::default(),
            tick: 0,
            config_path: config.config_path,
            requests: None,
            queue_stats: Arc::new(QueueStats::default()),
        }
    }

    /// Let deferred work (the slider debounce) enqueue requests.
    pub(crate) fn attach(&mut self, requests: mpsc::WeakSender<Request>) {
        self.requests = Some(requests);
    }

    pub(crate) fn into_transport(self) -> Box<dyn Transport> {
        self.dispatch.into_transport()
    }
}
