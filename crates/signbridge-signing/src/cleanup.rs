//! Process-wide registry of temporary paths awaiting cleanup
//!
//! Every [`TemporaryFile`](crate::temp::TemporaryFile) registers the path it
//! owns when created and unregisters it when released. Whatever is still
//! registered when the process tears down (a handle that was leaked, a
//! `std::process::exit`, a Ctrl-C) is removed by [`CleanupRegistry::drain`].
//!
//! Teardown is explicit: hold the guard returned by [`init`] for the life of
//! `main`, and call [`CleanupRegistry::drain`] from signal handlers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

static GLOBAL: Lazy<Arc<CleanupRegistry>> = Lazy::new(|| Arc::new(CleanupRegistry::new()));

/// Registry of paths that must be removed before the process exits
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    pending: Mutex<BTreeMap<u64, PathBuf>>,
    next_id: AtomicU64,
}

impl CleanupRegistry {
    /// Create an empty, standalone registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<CleanupRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Track a path; returns the ticket used to untrack it
    pub(crate) fn register(&self, path: PathBuf) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, path = %path.display(), "registered temporary path");
        self.pending.lock().insert(id, path);
        id
    }

    /// Stop tracking a path that its owner already removed
    pub(crate) fn unregister(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    /// Number of paths still awaiting cleanup
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Paths still awaiting cleanup, in registration order
    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.lock().values().cloned().collect()
    }

    /// Remove every pending path and empty the registry.
    ///
    /// Returns the number of paths that were removed (or already gone).
    pub fn drain(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for path in pending.into_values() {
            match remove_path(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary path"),
            }
        }
        info!(removed, "drained temporary path registry");
        removed
    }
}

/// Install process-wide cleanup; the returned guard drains the global registry on drop
#[must_use = "the registry is drained when the guard is dropped"]
pub fn init() -> CleanupGuard {
    CleanupGuard::new(CleanupRegistry::global())
}

/// Drains a registry when dropped
#[derive(Debug)]
pub struct CleanupGuard {
    registry: Arc<CleanupRegistry>,
}

impl CleanupGuard {
    /// Guard an explicit registry
    pub fn new(registry: Arc<CleanupRegistry>) -> Self {
        Self { registry }
    }

    /// The guarded registry
    pub fn registry(&self) -> &Arc<CleanupRegistry> {
        &self.registry
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.drain();
    }
}

/// Remove a file or directory tree; a path that is already gone counts as removed
pub(crate) fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
