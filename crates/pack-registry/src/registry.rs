use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::{RegistryError, Result};
use crate::fingerprint::Fingerprint;
use crate::index::{Index, IndexDiff};
use crate::pack::Pack;
use crate::scanner;

/// Owner of the live pack index for one root directory.
///
/// Readers load the current index without blocking; a finished scan is
/// published with a single pointer swap, so a reader sees either the previous
/// or the next index in full.
pub struct Registry {
    root: PathBuf,
    index: ArcSwap<Index>,
    status: Mutex<ScanStatus>,
}

/// Bookkeeping about past scans.
#[derive(Debug, Clone, Default)]
pub struct ScanStatus {
    /// Monotonic time of the last published scan; drives the watcher cooldown.
    pub last_scan: Option<Instant>,
    pub last_scan_at: Option<SystemTime>,
    pub last_error: Option<String>,
    pub completed_scans: u64,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: ArcSwap::from_pointee(Index::empty()),
            status: Mutex::new(ScanStatus::default()),
        }
    }

    pub fn root_directory(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pack>> {
        self.index.load().get(name).cloned()
    }

    /// Every pack, ordered by name, taken from one snapshot.
    pub fn all(&self) -> Vec<Arc<Pack>> {
        self.index.load().packs().cloned().collect()
    }

    pub fn hash(&self, name: &str) -> Option<Fingerprint> {
        self.index
            .load()
            .get(name)
            .map(|pack| pack.fingerprint.clone())
    }

    pub fn snapshot(&self) -> Arc<Index> {
        self.index.load_full()
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish a freshly scanned index.
    pub fn replace(&self, next: Index) -> IndexDiff {
        let next = Arc::new(next);
        let previous = self.index.swap(Arc::clone(&next));
        {
            let mut status = self.status.lock();
            status.last_scan = Some(Instant::now());
            status.last_scan_at = Some(SystemTime::now());
            status.last_error = None;
            status.completed_scans += 1;
        }

        let diff = next.diff(&previous);
        if !diff.added.is_empty() {
            tracing::info!(names = ?diff.added, "packs added");
        }
        if !diff.removed.is_empty() {
            tracing::info!(names = ?diff.removed, "packs removed");
        }
        if !diff.changed.is_empty() {
            tracing::info!(names = ?diff.changed, "packs changed");
        }
        diff
    }

    /// Scan the root on the calling thread and publish the result.
    ///
    /// A failed scan leaves the current index in place.
    pub fn rescan_blocking(&self) -> Result<IndexDiff> {
        match scanner::scan(&self.root) {
            Ok(index) => Ok(self.replace(index)),
            Err(err) => {
                self.record_scan_error(&err);
                Err(err)
            }
        }
    }

    pub fn record_scan_error(&self, err: &RegistryError) {
        self.status.lock().last_error = Some(err.to_string());
    }

    pub fn status(&self) -> ScanStatus {
        self.status.lock().clone()
    }

    pub fn last_scan(&self) -> Option<Instant> {
        self.status.lock().last_scan
    }
}
