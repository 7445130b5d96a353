//! Core types shared by the resolver, builder, and live controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Declared type of an artifact, used as the handler registry key.
pub type NodeKind = String;

/// Where a descriptor's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Resolve `name` against the parent's directory (or the base directory for roots).
    Named,
    /// Use this path verbatim (made absolute against the base directory if relative).
    Path(PathBuf),
    /// Virtual content with no filesystem identity.
    Inline(Arc<[u8]>),
}

/// A request to resolve one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub kind: NodeKind,
    pub source: Source,
}

impl Descriptor {
    /// Descriptor resolved by name relative to its parent.
    pub fn named(name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            source: Source::Named,
        }
    }

    /// Descriptor with an explicit path.
    pub fn at_path(path: impl Into<PathBuf>, kind: impl Into<NodeKind>) -> Self {
        let path = path.into();
        Self {
            name: path.to_string_lossy().into_owned(),
            kind: kind.into(),
            source: Source::Path(path),
        }
    }

    /// Identity-less descriptor carrying its own content.
    pub fn inline(
        name: impl Into<String>,
        kind: impl Into<NodeKind>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            source: Source::Inline(Arc::from(content.into())),
        }
    }

    /// Explicit path, if one was supplied.
    pub fn explicit_path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(p) => Some(p.as_path()),
            _ => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.source, Source::Inline(_))
    }
}
