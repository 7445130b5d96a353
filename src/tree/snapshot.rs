//! Immutable tree snapshots

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::tree::node::Node;

/// A fully resolved tree rooted at one root descriptor.
///
/// Snapshots are never mutated after construction. Rebuilds produce a new
/// snapshot with a higher `generation`.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    root: Arc<Node>,
    generation: u64,
    built_at: SystemTime,
}

impl TreeSnapshot {
    pub fn new(root: Arc<Node>, generation: u64) -> Self {
        Self {
            root,
            generation,
            built_at: SystemTime::now(),
        }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }

    /// Every node in pre-order, including repeats reached through different parents.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            stack.extend(node.children.iter().rev().cloned());
            out.push(node);
        }
        out
    }

    /// Distinct absolute paths in the tree, i.e. the set a watcher should observe.
    ///
    /// Nodes whose read failed are included so that creating the missing file
    /// triggers a rebuild.
    pub fn watch_paths(&self) -> BTreeSet<PathBuf> {
        self.nodes()
            .into_iter()
            .filter_map(|node| node.path.clone())
            .collect()
    }

    /// First node found at `path`.
    pub fn find(&self, path: &Path) -> Option<Arc<Node>> {
        self.root.find(path)
    }

    /// Nodes carrying an error.
    pub fn errors(&self) -> Vec<Arc<Node>> {
        self.nodes().into_iter().filter(|n| n.error.is_some()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }
}
