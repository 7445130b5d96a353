use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use stitch::handlers::builtin_registry;
use stitch::io::{FileReader, RetryPolicy};
use stitch::tree::{GraphBuilder, NodeResolver, ResolverOptions};
use stitch::watch::{FileNotifier, ManualNotifier, StatCallback, WatchRegistry};
use stitch::{LiveRebuildController, Node, WatchError};

/// A scratch directory of artifacts.
pub struct Site {
    dir: TempDir,
}

impl Site {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `name` as a markup file requiring each of `deps` (`"type name"`).
    pub fn markup(&self, name: &str, deps: &[&str]) -> &Self {
        let body: String = deps
            .iter()
            .map(|dep| format!("@require {}\n", dep))
            .collect();
        self.write(name, &body)
    }

    pub fn write(&self, name: &str, content: &str) -> &Self {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        self
    }
}

/// Reader with scripted failures and gates in front of real file reads.
#[derive(Default)]
pub struct ScriptedReader {
    failures: Mutex<HashMap<PathBuf, u32>>,
    reads: Mutex<HashMap<PathBuf, u32>>,
    gates: Mutex<HashMap<PathBuf, Arc<Semaphore>>>,
}

impl ScriptedReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` reads of `path`.
    pub fn fail_next(&self, path: &Path, times: u32) {
        self.failures.lock().insert(path.to_path_buf(), times);
    }

    /// Block reads of `path` until a permit is added to the returned semaphore.
    pub fn gate(&self, path: &Path) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&gate));
        gate
    }

    pub fn reads(&self, path: &Path) -> u32 {
        self.reads.lock().get(path).copied().unwrap_or(0)
    }

    pub async fn wait_for_read(&self, path: &Path) {
        while self.reads(path) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl FileReader for ScriptedReader {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        *self.reads.lock().entry(path.to_path_buf()).or_default() += 1;

        let gate = self.gates.lock().get(path).cloned();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        }

        let fail = match self.failures.lock().get_mut(path) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "file is locked",
            ));
        }
        tokio::fs::read(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

pub fn resolver(site: &Site, reader: Arc<dyn FileReader>) -> Arc<NodeResolver> {
    let handlers = builtin_registry(
        "@require",
        &["markup", "template", "script", "style"],
        &["text", "resource"],
    );
    let options = ResolverOptions::new(site.root()).with_retry(RetryPolicy {
        attempts: 2,
        delay: Duration::from_millis(10),
    });
    Arc::new(NodeResolver::new(Arc::new(handlers), reader, options))
}

pub fn builder(site: &Site, reader: Arc<dyn FileReader>) -> Arc<GraphBuilder> {
    Arc::new(GraphBuilder::new(resolver(site, reader)))
}

pub struct Live {
    pub notifier: Arc<ManualNotifier>,
    pub registry: Arc<WatchRegistry>,
    pub controller: LiveRebuildController,
}

/// Controller over a manual notifier. Call from within a runtime.
pub fn live(site: &Site, reader: Arc<dyn FileReader>) -> Live {
    live_with(site, reader, |notifier| notifier as Arc<dyn FileNotifier>)
}

/// Like [`live`], with the registry's backend wrapped around the manual notifier.
pub fn live_with(
    site: &Site,
    reader: Arc<dyn FileReader>,
    backend: impl FnOnce(Arc<ManualNotifier>) -> Arc<dyn FileNotifier>,
) -> Live {
    let notifier = Arc::new(ManualNotifier::new());
    let registry = Arc::new(WatchRegistry::new(
        backend(Arc::clone(&notifier)),
        Duration::from_millis(10),
    ));
    let controller =
        LiveRebuildController::new(builder(site, reader), Arc::clone(&registry)).unwrap();
    Live {
        notifier,
        registry,
        controller,
    }
}

/// Manual backend that blocks while installing the OS watch for one path.
pub struct SlowNotifier {
    inner: Arc<ManualNotifier>,
    slow_path: PathBuf,
    delay: Duration,
}

impl SlowNotifier {
    pub fn new(inner: Arc<ManualNotifier>, slow_path: PathBuf, delay: Duration) -> Self {
        Self {
            inner,
            slow_path,
            delay,
        }
    }
}

impl FileNotifier for SlowNotifier {
    fn watch_file(
        &self,
        path: &Path,
        interval: Duration,
        on_change: StatCallback,
    ) -> Result<(), WatchError> {
        if path == self.slow_path {
            std::thread::sleep(self.delay);
        }
        self.inner.watch_file(path, interval, on_change)
    }

    fn unwatch_file(&self, path: &Path) {
        self.inner.unwatch_file(path)
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// File names of the given nodes, in order.
pub fn file_names(nodes: &[Arc<Node>]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| match &node.path {
            Some(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            None => node.name.clone(),
        })
        .collect()
}
