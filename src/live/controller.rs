//! Live Rebuild Controller
//!
//! Owns the watch lifecycle of each (root, subscriber) pair. Every change to
//! a file in the active tree re-resolves the whole root, swaps in the new
//! snapshot, moves the subscriber's file listeners over to the new tree, and
//! notifies the subscriber.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::tree::{GraphBuilder, Node, TreeSnapshot};
use crate::types::Descriptor;
use crate::watch::{Listener, ListenerId, WatchRegistry};

/// Callback receiving each new snapshot and the node whose change caused it
/// (`None` for the initial build).
pub type SubscriberFn = Arc<dyn Fn(Arc<TreeSnapshot>, Option<Arc<Node>>) + Send + Sync>;

/// Identifies one `watch` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Top-level change name of a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootKey {
    Path(PathBuf),
    Inline(String),
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKey::Path(path) => write!(f, "{}", path.display()),
            RootKey::Inline(name) => write!(f, "<inline {name}>"),
        }
    }
}

/// Where a root currently is in its rebuild cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPhase {
    Idle,
    Resolving,
    Reconciling,
}

struct Subscription {
    root: Descriptor,
    callback: SubscriberFn,
    /// Held for a whole reconciliation so two rebuilds of this subscriber
    /// never move its listeners at the same time.
    reconcile: Mutex<()>,
}

#[derive(Default)]
struct RootState {
    subscribers: BTreeMap<SubscriberId, Arc<Subscription>>,
    snapshot: Option<Arc<TreeSnapshot>>,
    /// Generation last installed per subscriber; older results are dropped.
    installed: HashMap<SubscriberId, u64>,
    resolving: usize,
    reconciling: bool,
}

impl RootState {
    fn is_abandoned(&self) -> bool {
        self.subscribers.is_empty() && self.resolving == 0
    }
}

#[derive(Default)]
struct ControllerState {
    roots: HashMap<RootKey, RootState>,
    /// (subscriber, path) -> listener handle in the watch registry.
    node_listeners: HashMap<SubscriberId, HashMap<PathBuf, ListenerId>>,
    disposed: bool,
}

struct Inner {
    builder: Arc<GraphBuilder>,
    registry: Arc<WatchRegistry>,
    runtime: Handle,
    state: Mutex<ControllerState>,
    next_subscriber: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Keeps root snapshots current as their files change.
#[derive(Clone)]
pub struct LiveRebuildController {
    inner: Arc<Inner>,
}

impl LiveRebuildController {
    /// Must be called from within a tokio runtime; rebuilds are spawned onto it.
    pub fn new(builder: Arc<GraphBuilder>, registry: Arc<WatchRegistry>) -> Result<Self, ApiError> {
        let runtime = Handle::try_current().map_err(|e| ApiError::NoRuntime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                builder,
                registry,
                runtime,
                state: Mutex::new(ControllerState::default()),
                next_subscriber: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        })
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.inner.registry
    }

    pub fn builder(&self) -> &Arc<GraphBuilder> {
        &self.inner.builder
    }

    /// Top-level change name for `root`.
    pub fn root_key(&self, root: &Descriptor) -> RootKey {
        match self.inner.builder.resolver().root_path(root) {
            Some(path) => RootKey::Path(path),
            None => RootKey::Inline(root.name.clone()),
        }
    }

    /// Subscribe to `root` and start its initial build.
    ///
    /// The initial build runs like any change-triggered rebuild with no
    /// previous tree; `subscriber` is called once it completes.
    pub fn watch<F>(&self, root: Descriptor, subscriber: F) -> Result<SubscriberId, ApiError>
    where
        F: Fn(Arc<TreeSnapshot>, Option<Arc<Node>>) + Send + Sync + 'static,
    {
        let key = self.root_key(&root);
        let id = SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst));
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(ApiError::Disposed);
            }
            state.roots.entry(key.clone()).or_default().subscribers.insert(
                id,
                Arc::new(Subscription {
                    root,
                    callback: Arc::new(subscriber),
                    reconcile: Mutex::new(()),
                }),
            );
        }
        info!(root = %key, subscriber = %id, "Watching root");
        Self::schedule(&self.inner, key, id, None, None);
        Ok(id)
    }

    /// Stop notifying `id` about `root` and drop its file listeners.
    ///
    /// A rebuild already in flight still runs to completion, but its result
    /// is discarded.
    pub fn unwatch(&self, root: &Descriptor, id: SubscriberId) -> bool {
        let key = self.root_key(root);
        let (removed, handles) = {
            let mut state = self.inner.state.lock();
            let Some(root_state) = state.roots.get_mut(&key) else {
                return false;
            };
            let removed = root_state.subscribers.remove(&id).is_some();
            root_state.installed.remove(&id);
            let cached = root_state.snapshot.clone();
            if root_state.subscribers.is_empty() {
                root_state.snapshot = None;
            }
            if root_state.is_abandoned() {
                state.roots.remove(&key);
            }

            let mut handles = Vec::new();
            if let Some(mut listeners) = state.node_listeners.remove(&id) {
                if let Some(snapshot) = cached {
                    for path in snapshot.watch_paths() {
                        if let Some(handle) = listeners.remove(&path) {
                            handles.push((path, handle));
                        }
                    }
                }
                // Anything installed by a reconciliation that raced this call.
                handles.extend(listeners);
            }
            (removed, handles)
        };

        for (path, handle) in &handles {
            self.inner.registry.unwatch(path, *handle);
        }
        if removed {
            info!(root = %key, subscriber = %id, listeners = handles.len(), "Stopped watching root");
        }
        removed
    }

    /// Active snapshot for `root`, if one has been installed.
    pub fn snapshot(&self, root: &Descriptor) -> Option<Arc<TreeSnapshot>> {
        let key = self.root_key(root);
        self.inner
            .state
            .lock()
            .roots
            .get(&key)
            .and_then(|r| r.snapshot.clone())
    }

    pub fn phase(&self, root: &Descriptor) -> RootPhase {
        let key = self.root_key(root);
        match self.inner.state.lock().roots.get(&key) {
            Some(r) if r.reconciling => RootPhase::Reconciling,
            Some(r) if r.resolving > 0 => RootPhase::Resolving,
            _ => RootPhase::Idle,
        }
    }

    pub fn subscriber_count(&self, root: &Descriptor) -> usize {
        let key = self.root_key(root);
        self.inner
            .state
            .lock()
            .roots
            .get(&key)
            .map_or(0, |r| r.subscribers.len())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Wait until no rebuild is in flight.
    pub async fn settle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Tear down every subscription and listener. Terminal.
    pub fn dispose(&self) {
        let handles: Vec<(PathBuf, ListenerId)> = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.roots.clear();
            state
                .node_listeners
                .drain()
                .flat_map(|(_, listeners)| listeners)
                .collect()
        };
        for (path, handle) in &handles {
            self.inner.registry.unwatch(path, *handle);
        }
        info!(listeners = handles.len(), "Disposed live rebuild controller");
    }

    fn schedule(
        inner: &Arc<Inner>,
        key: RootKey,
        id: SubscriberId,
        old: Option<Arc<TreeSnapshot>>,
        changed: Option<PathBuf>,
    ) {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let task_inner = Arc::clone(inner);
        inner.runtime.spawn(async move {
            Self::rebuild(&task_inner, key, id, old, changed).await;
            if task_inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                task_inner.idle.notify_waiters();
            }
        });
    }

    async fn rebuild(
        inner: &Arc<Inner>,
        key: RootKey,
        id: SubscriberId,
        old: Option<Arc<TreeSnapshot>>,
        changed: Option<PathBuf>,
    ) {
        let root = {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            let Some(root_state) = state.roots.get_mut(&key) else {
                return;
            };
            let Some(subscription) = root_state.subscribers.get(&id) else {
                debug!(root = %key, subscriber = %id, "Subscriber gone before rebuild started");
                return;
            };
            let root = subscription.root.clone();
            root_state.resolving += 1;
            root
        };

        info!(
            root = %key,
            subscriber = %id,
            changed = ?changed,
            "Rebuilding root"
        );
        let snapshot = inner.builder.resolve_root(&root).await;
        Self::reconcile(inner, &key, id, old, snapshot, changed);
    }

    fn reconcile(
        inner: &Arc<Inner>,
        key: &RootKey,
        id: SubscriberId,
        old: Option<Arc<TreeSnapshot>>,
        snapshot: Arc<TreeSnapshot>,
        changed: Option<PathBuf>,
    ) {
        let gate = inner
            .state
            .lock()
            .roots
            .get(key)
            .and_then(|r| r.subscribers.get(&id).cloned());
        let _turn = gate.as_ref().map(|subscription| subscription.reconcile.lock());

        let mut stale: Vec<(PathBuf, ListenerId)> = Vec::new();
        let subscription = {
            let mut state = inner.state.lock();
            let disposed = state.disposed;
            let ControllerState {
                roots,
                node_listeners,
                ..
            } = &mut *state;
            let Some(root_state) = roots.get_mut(key) else {
                return;
            };
            root_state.resolving = root_state.resolving.saturating_sub(1);

            let superseded = root_state
                .installed
                .get(&id)
                .map_or(false, |generation| *generation > snapshot.generation());
            if disposed || superseded {
                debug!(root = %key, subscriber = %id, "Dropping superseded rebuild");
                if root_state.is_abandoned() {
                    roots.remove(key);
                }
                return;
            }
            root_state.reconciling = true;

            // Release this subscriber's listeners on the old tree only.
            if let (Some(old), Some(listeners)) = (&old, node_listeners.get_mut(&id)) {
                for path in old.watch_paths() {
                    if let Some(handle) = listeners.remove(&path) {
                        stale.push((path, handle));
                    }
                }
            }

            if root_state.subscribers.is_empty() {
                root_state.snapshot = None;
            }

            match root_state.subscribers.get(&id).cloned() {
                Some(subscription) => {
                    root_state.snapshot = Some(Arc::clone(&snapshot));
                    root_state.installed.insert(id, snapshot.generation());
                    // Whatever is left belongs to neither tree any more.
                    if let Some(listeners) = node_listeners.get_mut(&id) {
                        stale.extend(listeners.drain());
                    }
                    Some(subscription)
                }
                None => {
                    root_state.reconciling = false;
                    if root_state.is_abandoned() {
                        roots.remove(key);
                    }
                    None
                }
            }
        };

        let Some(subscription) = subscription else {
            warn!(
                root = %key,
                subscriber = %id,
                "Subscriber left during rebuild, discarding result"
            );
            Self::release(inner, &stale);
            return;
        };

        // Install before releasing so shared paths keep their OS watch.
        let installed = Self::install(inner, key, id, &snapshot);
        let watched = installed.len();
        let accepted = {
            let mut state = inner.state.lock();
            let disposed = state.disposed;
            let ControllerState {
                roots,
                node_listeners,
                ..
            } = &mut *state;
            let current = roots.get_mut(key).map_or(false, |root_state| {
                root_state.reconciling = false;
                root_state.subscribers.contains_key(&id)
                    && root_state.installed.get(&id) == Some(&snapshot.generation())
            });
            let accepted = !disposed && current;
            if accepted {
                let listeners = node_listeners.entry(id).or_default();
                for (path, handle) in &installed {
                    if let Some(displaced) = listeners.insert(path.clone(), *handle) {
                        stale.push((path.clone(), displaced));
                    }
                }
            }
            accepted
        };
        if !accepted {
            stale.extend(installed);
        }
        Self::release(inner, &stale);

        if !accepted {
            warn!(root = %key, subscriber = %id, "Reconciliation no longer current, discarding result");
            return;
        }

        let changed_node = changed.as_deref().and_then(|path| {
            snapshot
                .find(path)
                .or_else(|| old.as_ref().and_then(|o| o.find(path)))
        });
        info!(
            root = %key,
            subscriber = %id,
            generation = snapshot.generation(),
            watched,
            "Root rebuilt"
        );
        (subscription.callback)(snapshot, changed_node);
    }

    fn install(
        inner: &Arc<Inner>,
        key: &RootKey,
        id: SubscriberId,
        snapshot: &Arc<TreeSnapshot>,
    ) -> Vec<(PathBuf, ListenerId)> {
        let weak: Weak<Inner> = Arc::downgrade(inner);
        let mut installed = Vec::new();
        for path in snapshot.watch_paths() {
            let weak = weak.clone();
            let key = key.clone();
            let context = Arc::clone(snapshot);
            let listener: Listener = Arc::new(move |changed: &Path| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                Self::schedule(
                    &inner,
                    key.clone(),
                    id,
                    Some(Arc::clone(&context)),
                    Some(changed.to_path_buf()),
                );
            });
            match inner.registry.watch(&path, listener) {
                Ok(handle) => installed.push((path, handle)),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to watch file"),
            }
        }
        installed
    }

    fn release(inner: &Arc<Inner>, handles: &[(PathBuf, ListenerId)]) {
        for (path, handle) in handles {
            inner.registry.unwatch(path, *handle);
        }
    }
}
