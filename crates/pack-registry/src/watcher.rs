//! Filesystem-driven and manual rescans.
//!
//! A single worker task owns every rescan after startup, so two scans never
//! race to publish. Filesystem notifications are gated by a cooldown measured
//! from the last published scan, then held for a settle delay so a burst of
//! events (an unzip, a copy of many files) collapses into one scan. Manual
//! rescans skip the cooldown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, Result};
use crate::registry::Registry;

const CHANGE_QUEUE: usize = 64;

/// Knobs for the rescan worker.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Subscribe to filesystem notifications on the root.
    pub enabled: bool,
    /// Pause after a notification before scanning.
    pub settle_delay: Duration,
    /// Minimum time since the last scan before a notification may rescan.
    pub scan_cooldown: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay: Duration::from_secs(1),
            scan_cooldown: Duration::from_secs(2),
        }
    }
}

/// Guard for the rescan worker and its filesystem subscription.
pub struct PackWatcher {
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    subscription: Option<RecommendedWatcher>,
}

impl PackWatcher {
    /// Whether filesystem notifications are flowing; `false` means manual
    /// rescans only.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Close the subscription and stop the worker, aborting it if it does not
    /// finish within `grace`.
    pub async fn shutdown(mut self, grace: Duration) {
        self.subscription.take();
        self.cancel.cancel();
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "pack watcher did not stop in time, aborting");
                handle.abort();
            }
        }
        tracing::info!("pack watcher stopped");
    }
}

impl Drop for PackWatcher {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Cloneable trigger for rescans.
#[derive(Clone)]
pub struct RescanHandle {
    manual: mpsc::Sender<()>,
}

impl RescanHandle {
    /// Request a rescan regardless of the cooldown and return immediately.
    ///
    /// Requests made while one is already queued are merged into it.
    pub fn trigger(&self) -> Result<()> {
        match self.manual.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => Err(RegistryError::WatcherStopped),
        }
    }
}

/// Start the rescan worker for `registry`.
///
/// Must be called from within a tokio runtime. Failing to subscribe to
/// filesystem notifications is logged and leaves manual rescans working.
pub fn start_pack_watcher(registry: Arc<Registry>, cfg: WatchConfig) -> (PackWatcher, RescanHandle) {
    let (watcher, handle, _changes) = spawn_worker(registry, cfg);
    (watcher, handle)
}

/// Spawn the worker, returning the sender its change queue listens on.
fn spawn_worker(
    registry: Arc<Registry>,
    cfg: WatchConfig,
) -> (PackWatcher, RescanHandle, mpsc::Sender<()>) {
    let (change_tx, change_rx) = mpsc::channel(CHANGE_QUEUE);
    let (manual_tx, manual_rx) = mpsc::channel(1);

    let subscription = if cfg.enabled {
        match subscribe(registry.root_directory(), change_tx.clone()) {
            Ok(watcher) => {
                tracing::info!(root = %registry.root_directory().display(), "file monitoring started");
                Some(watcher)
            }
            Err(err) => {
                tracing::error!(
                    root = %registry.root_directory().display(),
                    error = %err,
                    "failed to start file monitoring, manual rescans only"
                );
                None
            }
        }
    } else {
        tracing::info!("file monitoring disabled, manual rescans only");
        None
    };

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_worker(
        registry,
        cfg,
        change_rx,
        manual_rx,
        cancel.clone(),
    ));

    let watcher = PackWatcher {
        handle: Some(handle),
        cancel,
        subscription,
    };
    let handle = RescanHandle { manual: manual_tx };
    (watcher, handle, change_tx)
}

fn subscribe(root: &Path, changes: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event.kind) => queue_change(&changes),
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "file monitoring error"),
    })?;
    watch_root(&mut watcher, root)?;
    Ok(watcher)
}

/// Watch `root` recursively, or only its top level when the recursive watch
/// cannot be established (for example when the inotify watch limit is hit).
fn watch_root<W: Watcher>(watcher: &mut W, root: &Path) -> notify::Result<RecursiveMode> {
    match watcher.watch(root, RecursiveMode::Recursive) {
        Ok(()) => Ok(RecursiveMode::Recursive),
        Err(err) => {
            tracing::warn!(
                root = %root.display(),
                error = %err,
                "recursive file monitoring failed, watching the pack root only"
            );
            let _ = watcher.unwatch(root);
            watcher.watch(root, RecursiveMode::NonRecursive)?;
            Ok(RecursiveMode::NonRecursive)
        }
    }
}

/// Reads (including our own scans) are not changes.
fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

fn queue_change(changes: &mpsc::Sender<()>) {
    if let Err(TrySendError::Full(())) = changes.try_send(()) {
        tracing::trace!("change queue full, rescan already pending");
    }
}

enum Trigger {
    Change,
    Manual,
}

async fn run_worker(
    registry: Arc<Registry>,
    cfg: WatchConfig,
    mut changes: mpsc::Receiver<()>,
    mut manual: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    loop {
        let trigger = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(()) = manual.recv() => Trigger::Manual,
            Some(()) = changes.recv() => Trigger::Change,
            else => break,
        };

        match trigger {
            Trigger::Change => {
                if is_cooling(&registry, cfg.scan_cooldown) {
                    tracing::trace!("change ignored during scan cooldown");
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(cfg.settle_delay) => {}
                }
                while changes.try_recv().is_ok() {}
                tracing::info!("pack directory changed, rescanning");
            }
            Trigger::Manual => tracing::info!("manual rescan requested"),
        }

        rescan(&registry).await;
    }
    tracing::debug!("pack watcher worker exiting");
}

fn is_cooling(registry: &Registry, cooldown: Duration) -> bool {
    registry
        .last_scan()
        .is_some_and(|at| at.elapsed() < cooldown)
}

async fn rescan(registry: &Arc<Registry>) {
    let target = Arc::clone(registry);
    match task::spawn_blocking(move || target.rescan_blocking()).await {
        Ok(Ok(diff)) => {
            tracing::debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                changed = diff.changed.len(),
                "rescan published"
            );
        }
        Ok(Err(err)) => tracing::error!(error = %err, "pack rescan failed, keeping previous index"),
        Err(join) => {
            let err = RegistryError::ScanTask {
                reason: join.to_string(),
            };
            tracing::error!(error = %err, "pack rescan failed, keeping previous index");
            registry.record_scan_error(&err);
        }
    }
}
