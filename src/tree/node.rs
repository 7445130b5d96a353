//! Resolved node representation

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::NodeError;
use crate::handler::Payload;
use crate::tree::hasher::ContentHash;
use crate::types::NodeKind;

/// One resolved artifact.
///
/// Nodes are immutable once built. A rebuild produces new nodes rather than
/// patching old ones, so `Arc<Node>` can be handed to any number of readers.
#[derive(Clone)]
pub struct Node {
    /// Name as declared by the parent (or the caller, for roots).
    pub name: String,
    pub kind: NodeKind,
    /// Absolute path; `None` for inline content. Doubles as the node's identity.
    pub path: Option<PathBuf>,
    pub raw: Option<Arc<[u8]>>,
    pub content_hash: Option<ContentHash>,
    pub payload: Option<Payload>,
    pub error: Option<NodeError>,
    pub is_root: bool,
    /// Resolved children in the order the handler declared them.
    pub children: Vec<Arc<Node>>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, path: Option<PathBuf>, is_root: bool) -> Self {
        Self {
            name,
            kind,
            path,
            raw: None,
            content_hash: None,
            payload: None,
            error: None,
            is_root,
            children: Vec::new(),
        }
    }

    /// Terminal node carrying an error.
    pub(crate) fn failed(mut self, error: NodeError) -> Self {
        self.error = Some(error);
        self.children.clear();
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Downcast the parsed payload.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Raw bytes as UTF-8, if they are valid.
    pub fn text(&self) -> Option<&str> {
        self.raw.as_deref().and_then(|r| std::str::from_utf8(r).ok())
    }

    /// Label used in logs: the path when there is one, otherwise the name.
    pub fn label(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => format!("<inline {}>", self.name),
        }
    }

    /// Depth-first search for the first node with `path`.
    pub fn find(self: &Arc<Self>, path: &Path) -> Option<Arc<Node>> {
        if self.path.as_deref() == Some(path) {
            return Some(Arc::clone(self));
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("error", &self.error)
            .field("is_root", &self.is_root)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
