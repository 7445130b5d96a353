//! OS-level file change notification backends.
//!
//! A backend watches single files and reports `(previous, current)` stats when
//! it sees something happen. It does not filter spurious notifications; that
//! is the registry's job.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::WatchError;

/// The parts of a file's metadata the watch layer compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub exists: bool,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileStat {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self::from_metadata(&meta),
            Err(_) => Self::missing(),
        }
    }

    pub async fn of_async(path: &Path) -> Self {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Self::from_metadata(&meta),
            Err(_) => Self::missing(),
        }
    }

    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            exists: true,
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }

    /// Whether the modification time (or existence) differs.
    pub fn modification_differs(&self, other: &FileStat) -> bool {
        self.exists != other.exists || self.modified != other.modified
    }
}

/// Callback invoked with `(previous, current)` stats.
pub type StatCallback = Arc<dyn Fn(FileStat, FileStat) + Send + Sync>;

/// Low-level per-file watch backend.
pub trait FileNotifier: Send + Sync {
    fn watch_file(
        &self,
        path: &Path,
        interval: Duration,
        on_change: StatCallback,
    ) -> Result<(), WatchError>;

    fn unwatch_file(&self, path: &Path);

    fn name(&self) -> &'static str;
}

/// Polls file metadata on a tokio interval.
pub struct PollingNotifier {
    runtime: tokio::runtime::Handle,
    tasks: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
}

impl PollingNotifier {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self, WatchError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl FileNotifier for PollingNotifier {
    fn watch_file(
        &self,
        path: &Path,
        interval: Duration,
        on_change: StatCallback,
    ) -> Result<(), WatchError> {
        let watched = path.to_path_buf();
        let initial = FileStat::of(path);
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut previous = initial;
            loop {
                ticker.tick().await;
                let current = FileStat::of_async(&watched).await;
                if current != previous {
                    on_change(previous, current);
                    previous = current;
                }
            }
        });
        if let Some(old) = self.tasks.lock().insert(path.to_path_buf(), task) {
            old.abort();
        }
        debug!(path = %path.display(), interval_ms = interval.as_millis() as u64, "Polling file");
        Ok(())
    }

    fn unwatch_file(&self, path: &Path) {
        if let Some(task) = self.tasks.lock().remove(path) {
            task.abort();
            debug!(path = %path.display(), "Stopped polling file");
        }
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}

impl Drop for PollingNotifier {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

struct NotifyState {
    files: HashMap<PathBuf, (FileStat, StatCallback)>,
    /// Watched parent directories and how many files rely on each.
    dirs: HashMap<PathBuf, usize>,
}

/// Event-driven backend built on `notify`.
///
/// Watches each file's parent directory non-recursively so that editors which
/// save by rename-over are still observed.
pub struct NotifyNotifier {
    watcher: Mutex<RecommendedWatcher>,
    state: Arc<Mutex<NotifyState>>,
}

impl NotifyNotifier {
    pub fn new() -> Result<Self, WatchError> {
        let state = Arc::new(Mutex::new(NotifyState {
            files: HashMap::new(),
            dirs: HashMap::new(),
        }));
        let events = Arc::clone(&state);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in event.paths {
                    Self::dispatch(&events, &path);
                }
            }
            Err(e) => error!("File watch error: {}", e),
        })?;
        Ok(Self {
            watcher: Mutex::new(watcher),
            state,
        })
    }

    fn dispatch(state: &Mutex<NotifyState>, path: &Path) {
        let fired = {
            let mut state = state.lock();
            match state.files.get_mut(path) {
                Some((previous, callback)) => {
                    let current = FileStat::of(path);
                    let prev = std::mem::replace(previous, current);
                    Some((prev, current, Arc::clone(callback)))
                }
                None => None,
            }
        };
        if let Some((prev, current, callback)) = fired {
            callback(prev, current);
        }
    }

    fn parent_of(path: &Path) -> PathBuf {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

impl FileNotifier for NotifyNotifier {
    // The watcher lock is taken first and held across `watch`/`unwatch`. The
    // state lock is never held while calling into `notify`, because its event
    // thread takes the state lock in `dispatch`.
    fn watch_file(
        &self,
        path: &Path,
        _interval: Duration,
        on_change: StatCallback,
    ) -> Result<(), WatchError> {
        let dir = Self::parent_of(path);
        let mut watcher = self.watcher.lock();
        let needs_dir = !self.state.lock().dirs.contains_key(&dir);
        if needs_dir {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            debug!(dir = %dir.display(), "Watching directory");
        }

        let mut state = self.state.lock();
        if state
            .files
            .insert(path.to_path_buf(), (FileStat::of(path), on_change))
            .is_none()
        {
            *state.dirs.entry(dir).or_insert(0) += 1;
        }
        Ok(())
    }

    fn unwatch_file(&self, path: &Path) {
        let dir = Self::parent_of(path);
        let mut watcher = self.watcher.lock();
        let release_dir = {
            let mut state = self.state.lock();
            if state.files.remove(path).is_none() {
                return;
            }
            match state.dirs.get_mut(&dir) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    state.dirs.remove(&dir);
                    true
                }
                None => false,
            }
        };
        if release_dir {
            if let Err(e) = watcher.unwatch(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to unwatch directory");
            }
        }
    }

    fn name(&self) -> &'static str {
        "notify"
    }
}

/// Backend driven by explicit calls instead of the filesystem.
///
/// Useful when change events come from somewhere other than the OS (an
/// editor integration, a build server) and for deterministic tests.
#[derive(Default)]
pub struct ManualNotifier {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    watched: HashMap<PathBuf, (FileStat, StatCallback)>,
    installs: usize,
    clock: u64,
}

impl ManualNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a modification of `path`. Returns false if it is not watched.
    pub fn touch(&self, path: &Path) -> bool {
        self.fire(path, |state| {
            state.clock += 1;
            FileStat {
                exists: true,
                modified: Some(UNIX_EPOCH + Duration::from_secs(state.clock)),
                len: 0,
            }
        })
    }

    /// Report that `path` was deleted.
    pub fn remove(&self, path: &Path) -> bool {
        self.fire(path, |_| FileStat::missing())
    }

    /// Report a notification whose stats did not change.
    pub fn spurious(&self, path: &Path) -> bool {
        let fired = {
            let state = self.state.lock();
            state
                .watched
                .get(path)
                .map(|(stat, callback)| (*stat, Arc::clone(callback)))
        };
        match fired {
            Some((stat, callback)) => {
                callback(stat, stat);
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.state.lock().watched.contains_key(path)
    }

    /// Currently installed watches.
    pub fn watch_count(&self) -> usize {
        self.state.lock().watched.len()
    }

    /// Total `watch_file` calls ever made.
    pub fn installs(&self) -> usize {
        self.state.lock().installs
    }

    fn fire(&self, path: &Path, next: impl FnOnce(&mut ManualState) -> FileStat) -> bool {
        let fired = {
            let mut state = self.state.lock();
            if !state.watched.contains_key(path) {
                return false;
            }
            let current = next(&mut *state);
            state.watched.get_mut(path).map(|(previous, callback)| {
                let prev = std::mem::replace(previous, current);
                (prev, current, Arc::clone(callback))
            })
        };
        match fired {
            Some((prev, current, callback)) => {
                callback(prev, current);
                true
            }
            None => false,
        }
    }
}

impl FileNotifier for ManualNotifier {
    fn watch_file(
        &self,
        path: &Path,
        _interval: Duration,
        on_change: StatCallback,
    ) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        state.installs += 1;
        let initial = FileStat {
            exists: true,
            modified: Some(UNIX_EPOCH),
            len: 0,
        };
        state.watched.insert(path.to_path_buf(), (initial, on_change));
        Ok(())
    }

    fn unwatch_file(&self, path: &Path) {
        self.state.lock().watched.remove(path);
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}
