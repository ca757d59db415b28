//! Layered cancellation for scrape operations
//!
//! Composes an optional external abort signal (crawl-level or
//! server-level) with a per-scrape deadline derived from
//! `ScrapeOptions::timeout`. Engines await a single composite signal;
//! the first tier to fire is recorded so errors surface with the
//! originating cause. All timers are dropped with the manager,
//! whatever the scrape outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{EngineError, PipelineResult};

/// Which cancellation tier fired first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortTier {
    /// Caller-supplied signal (crawl shutdown, client disconnect)
    External,
    /// The per-scrape timeout elapsed
    ScrapeTimeout,
}

/// Cloneable view of an abort signal. Firing is idempotent; only the
/// first tier is recorded.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<Option<AbortTier>>>,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record `tier` as the abort cause unless another tier fired first.
    pub fn fire(&self, tier: AbortTier) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(tier);
                true
            } else {
                false
            }
        });
    }

    #[must_use]
    pub fn fired(&self) -> Option<AbortTier> {
        *self.tx.borrow()
    }

    /// Resolves once any tier has fired. Completes immediately if one
    /// already has.
    pub async fn cancelled(&self) -> AbortTier {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(tier) = *rx.borrow() {
                return tier;
            }
            if rx.changed().await.is_err() {
                // Sender kept alive through the Arc; unreachable in
                // practice, but park rather than spin.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-scrape cancellation manager. Owns the deadline timer and the
/// listener bridging an external parent signal.
pub struct AbortManager {
    handle: AbortHandle,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    parent_listener: Option<JoinHandle<()>>,
}

impl AbortManager {
    /// Compose an optional parent signal with an optional scrape
    /// timeout into one composite signal.
    #[must_use]
    pub fn new(parent: Option<AbortHandle>, timeout: Option<Duration>) -> Self {
        let handle = AbortHandle::new();

        let timer = timeout.map(|t| {
            let fire = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(t).await;
                fire.fire(AbortTier::ScrapeTimeout);
            })
        });

        let parent_listener = parent.map(|parent| {
            let fire = handle.clone();
            tokio::spawn(async move {
                parent.cancelled().await;
                fire.fire(AbortTier::External);
            })
        });

        Self {
            handle,
            deadline: timeout.map(|t| Instant::now() + t),
            timer,
            parent_listener,
        }
    }

    #[must_use]
    pub fn handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn fired(&self) -> Option<AbortTier> {
        self.handle.fired()
    }

    /// Milliseconds left until the scrape deadline, if one exists.
    #[must_use]
    pub fn remaining_ms(&self) -> Option<u64> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()).as_millis() as u64)
    }

    /// The error attributed to whichever tier fired first.
    #[must_use]
    pub fn abort_error(&self) -> EngineError {
        match self.handle.fired() {
            Some(AbortTier::ScrapeTimeout) => EngineError::Timeout,
            Some(AbortTier::External) | None => EngineError::Aborted,
        }
    }

    /// Run `fut` until it completes or a tier fires, whichever comes
    /// first. Every engine suspension point goes through here.
    pub async fn scope<T>(
        &self,
        fut: impl std::future::Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        tokio::select! {
            biased;
            _ = self.handle.cancelled() => Err(self.abort_error()),
            result = fut => result,
        }
    }
}

impl Drop for AbortManager {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(listener) = self.parent_listener.take() {
            listener.abort();
        }
    }
}
