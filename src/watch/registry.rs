//! File Watch Registry
//!
//! One OS-level watch per path, fanned out in-process to any number of
//! listeners. The first listener for a path installs the watch; removing the
//! last one tears it down.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::WatchError;
use crate::watch::notifier::{FileNotifier, FileStat, StatCallback};

/// Callback invoked with the path that changed.
pub type Listener = Arc<dyn Fn(&Path) + Send + Sync>;

/// Handle identifying one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Entries = Mutex<HashMap<PathBuf, BTreeMap<ListenerId, Listener>>>;

/// Process-wide table of watched paths and their listeners.
pub struct WatchRegistry {
    notifier: Arc<dyn FileNotifier>,
    interval: Duration,
    entries: Arc<Entries>,
    /// Serializes OS watch install/teardown. Never taken on the dispatch path.
    os_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub fn new(notifier: Arc<dyn FileNotifier>, interval: Duration) -> Self {
        Self {
            notifier,
            interval,
            entries: Arc::new(Mutex::new(HashMap::new())),
            os_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn notifier(&self) -> &Arc<dyn FileNotifier> {
        &self.notifier
    }

    /// Register `listener` for `path`, installing the OS watch if this is the first.
    pub fn watch(&self, path: &Path, listener: Listener) -> Result<ListenerId, WatchError> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let _os = self.os_lock.lock();

        {
            let mut entries = self.entries.lock();
            if let Some(listeners) = entries.get_mut(path) {
                listeners.insert(id, listener);
                trace!(path = %path.display(), listener = %id, "Added listener to existing watch");
                return Ok(id);
            }
        }

        let weak = Arc::downgrade(&self.entries);
        let watched = path.to_path_buf();
        let on_change: StatCallback =
            Arc::new(move |prev, curr| Self::dispatch(&weak, &watched, prev, curr));
        self.notifier.watch_file(path, self.interval, on_change)?;

        let mut listeners = BTreeMap::new();
        listeners.insert(id, listener);
        self.entries.lock().insert(path.to_path_buf(), listeners);
        debug!(path = %path.display(), backend = self.notifier.name(), "Installed watch");
        Ok(id)
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn unwatch(&self, path: &Path, id: ListenerId) -> bool {
        let _os = self.os_lock.lock();
        let (removed, now_empty) = {
            let mut entries = self.entries.lock();
            let Some(listeners) = entries.get_mut(path) else {
                return false;
            };
            let removed = listeners.remove(&id).is_some();
            let now_empty = listeners.is_empty();
            if now_empty {
                entries.remove(path);
            }
            (removed, now_empty)
        };

        if now_empty {
            self.notifier.unwatch_file(path);
            debug!(path = %path.display(), "Removed watch");
        }
        removed
    }

    /// Listeners currently registered for `path`, in registration order.
    pub fn listeners_of(&self, path: &Path) -> Vec<Listener> {
        self.entries
            .lock()
            .get(path)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn listener_ids(&self, path: &Path) -> Vec<ListenerId> {
        self.entries
            .lock()
            .get(path)
            .map(|listeners| listeners.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Drop every listener and tear down every OS watch.
    pub fn clear(&self) {
        let _os = self.os_lock.lock();
        let paths: Vec<PathBuf> = self.entries.lock().drain().map(|(path, _)| path).collect();
        for path in &paths {
            self.notifier.unwatch_file(path);
        }
        if !paths.is_empty() {
            debug!(count = paths.len(), "Cleared all watches");
        }
    }

    fn dispatch(entries: &Weak<Entries>, path: &Path, prev: FileStat, curr: FileStat) {
        if !prev.modification_differs(&curr) {
            trace!(path = %path.display(), "Ignoring notification with unchanged mtime");
            return;
        }
        let Some(entries) = entries.upgrade() else {
            return;
        };
        let listeners: Vec<Listener> = entries
            .lock()
            .get(path)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default();
        debug!(path = %path.display(), listeners = listeners.len(), "File changed");
        for listener in listeners {
            listener(path);
        }
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
