//! Ancestor-only cycle guard.
//!
//! A `VisitedSet` is an immutable cons list of the paths on the current
//! root-to-node chain. Extending it returns a new set and leaves the original
//! untouched, so each sibling branch sees only its own ancestors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Link {
    path: PathBuf,
    parent: Option<Arc<Link>>,
}

/// Persistent set of ancestor paths.
#[derive(Clone, Default)]
pub struct VisitedSet {
    head: Option<Arc<Link>>,
    len: usize,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.iter().any(|p| p == path)
    }

    /// New set with `path` added; `self` is unchanged.
    pub fn extend(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            head: Some(Arc::new(Link {
                path: path.into(),
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Paths from the nearest ancestor outward.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        let mut cursor = self.head.as_deref();
        std::iter::from_fn(move || {
            let link = cursor?;
            cursor = link.parent.as_deref();
            Some(link.path.as_path())
        })
    }
}

impl std::fmt::Debug for VisitedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
