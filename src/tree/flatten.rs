//! Flattener
//!
//! Linearizes a snapshot dependency-first: every node is preceded by the
//! flattened output of its children, in declaration order, and the snapshot's
//! root is always the last element.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::tree::node::Node;
use crate::tree::snapshot::TreeSnapshot;

/// How repeated paths are handled within and across flatten calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Each path that reaches a node emits its own copy. The emitted set is
    /// consulted but only grows when the caller seeds it.
    #[default]
    PerPath,
    /// A path is emitted once, at its first dependency-first position; later
    /// occurrences in the same pass and in later passes are suppressed.
    Once,
}

/// Stateful flattener carrying the "already emitted" set between calls.
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    policy: DedupPolicy,
    emitted: HashSet<PathBuf>,
}

impl Flattener {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            emitted: HashSet::new(),
        }
    }

    /// Start with paths a previous pass already emitted.
    pub fn seeded(policy: DedupPolicy, emitted: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            policy,
            emitted: emitted.into_iter().collect(),
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub fn emitted(&self) -> &HashSet<PathBuf> {
        &self.emitted
    }

    pub fn flatten(&mut self, snapshot: &TreeSnapshot) -> Vec<Arc<Node>> {
        let root = snapshot.root();
        let mut out = Vec::new();
        for child in &root.children {
            self.visit(child, &mut out);
        }
        self.record(root);
        out.push(Arc::clone(root));
        out
    }

    fn visit(&mut self, node: &Arc<Node>, out: &mut Vec<Arc<Node>>) {
        if let Some(path) = &node.path {
            if self.emitted.contains(path) {
                return;
            }
        }
        for child in &node.children {
            self.visit(child, out);
        }
        self.record(node);
        out.push(Arc::clone(node));
    }

    // Cycle placeholders share their ancestor's path and must not suppress it.
    fn record(&mut self, node: &Node) {
        if self.policy != DedupPolicy::Once || is_cycle_placeholder(node) {
            return;
        }
        if let Some(path) = &node.path {
            self.emitted.insert(path.clone());
        }
    }
}

fn is_cycle_placeholder(node: &Node) -> bool {
    node.error.as_ref().map_or(false, |e| e.is_cycle())
}

/// Flatten with the default per-path policy and no seeded paths.
pub fn flatten(snapshot: &TreeSnapshot) -> Vec<Arc<Node>> {
    Flattener::default().flatten(snapshot)
}
