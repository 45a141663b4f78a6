//! Watches workspace roots and keeps the project cache in step.

use std::path::PathBuf;
use std::sync::Arc;

use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::cache::ProjectCache;

use super::error::WatchError;
use super::router::{ChangeRouter, WatchAction};

/// Watches the top level of every workspace root.
///
/// Holds a single non-recursive `notify::RecommendedWatcher` per process.
/// Deletions trigger an immediate rebuild-and-refresh; creations wait for
/// their workspace root to go quiet first. Rebuilds run on spawned tasks so
/// event delivery is never held up; the cache serializes them.
pub struct WorkspaceWatcher {
    cache: Arc<ProjectCache>,
    router: ChangeRouter,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    _watcher: notify::RecommendedWatcher,
    tick: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WorkspaceWatcher {
    pub fn builder() -> WorkspaceWatcherBuilder {
        WorkspaceWatcherBuilder::new()
    }

    /// Run the event loop until the shutdown signal fires.
    pub async fn watch(mut self) -> Result<(), WatchError> {
        crate::log_event!(
            "watcher",
            "started",
            "{} workspace roots",
            self.router.roots().count()
        );

        // One schedule for the whole loop: incoming events must not push back
        // the check for settled creations.
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.event_rx.recv() => {
                    match received {
                        Some(Ok(event)) => self.handle_event(event),
                        Some(Err(e)) => {
                            let error = WatchError::EventError { details: e.to_string() };
                            tracing::error!("[watcher] {error}");
                        }
                        None => return Err(WatchError::ChannelClosed),
                    }
                }

                _ = ticker.tick() => {
                    let ready = self.router.take_ready();
                    if !ready.is_empty() {
                        crate::debug_event!("watcher", "settled", "{} workspace roots", ready.len());
                        self.spawn_rebuild("creation settled");
                    }
                }

                _ = wait_for_shutdown(&mut self.shutdown) => {
                    crate::log_event!("watcher", "stopped");
                    return Ok(());
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match self.router.route(&event) {
            WatchAction::Rebuild { trigger } => {
                crate::log_event!("watcher", "removed", "{}", trigger.display());
                self.spawn_rebuild("entry removed");
            }
            WatchAction::Deferred { root } => {
                crate::debug_event!("watcher", "created under", "{}", root.display());
            }
            WatchAction::None => {
                crate::debug_event!("watcher", "ignored", "{:?} {:?}", event.kind, event.paths);
            }
        }
    }

    fn spawn_rebuild(&self, reason: &'static str) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            crate::debug_event!("watcher", "rebuilding", "{reason}");
            if let Err(e) = cache.rebuild_and_refresh().await {
                tracing::error!("[watcher] rebuild after {reason} failed: {e}");
            }
        });
    }
}

/// Resolves when shutdown is requested or the signal's sender is gone.
/// Never resolves without a signal.
async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Builder for constructing a WorkspaceWatcher.
pub struct WorkspaceWatcherBuilder {
    cache: Option<Arc<ProjectCache>>,
    roots: Option<Vec<PathBuf>>,
    debounce_ms: u64,
    tick_ms: u64,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WorkspaceWatcherBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            roots: None,
            debounce_ms: 2000,
            tick_ms: 100,
            shutdown: None,
        }
    }

    /// Cache to rebuild. Required.
    pub fn cache(mut self, cache: Arc<ProjectCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Roots to watch. Defaults to the cache's workspace roots.
    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Quiet period after a top-level creation, in milliseconds.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Polling interval for settled creations, in milliseconds.
    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms.max(1);
        self
    }

    /// Stop the loop once this flips to `true` or its sender is dropped.
    pub fn shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the watcher and register every root with the OS.
    ///
    /// A root that cannot be watched is logged and skipped.
    pub fn build(self) -> Result<WorkspaceWatcher, WatchError> {
        let cache = self.cache.ok_or_else(|| WatchError::InitFailed {
            reason: "Project cache is required".to_string(),
        })?;
        let roots = self.roots.unwrap_or_else(|| cache.workspace_roots());

        let (tx, rx) = mpsc::channel(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        for root in &roots {
            match watcher.watch(root, RecursiveMode::NonRecursive) {
                Ok(()) => crate::debug_event!("watcher", "watching", "{}", root.display()),
                Err(e) => {
                    let error = WatchError::PathWatchFailed {
                        path: root.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("[watcher] {error}");
                }
            }
        }

        Ok(WorkspaceWatcher {
            cache,
            router: ChangeRouter::new(roots, Duration::from_millis(self.debounce_ms)),
            event_rx: rx,
            _watcher: watcher,
            tick: Duration::from_millis(self.tick_ms),
            shutdown: self.shutdown,
        })
    }
}

impl Default for WorkspaceWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
