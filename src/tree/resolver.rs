//! Node Resolver
//!
//! Turns one descriptor into a populated node and, recursively, its children.
//! Children of a node are resolved concurrently and joined: a node completes
//! only after its last child does.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::handler::{HandlerOutput, HandlerRegistry, NodeContext};
use crate::io::{read_with_retry, FileReader, RetryPolicy};
use crate::tree::hasher::compute_content_hash;
use crate::tree::node::Node;
use crate::tree::path::{base_dir_of, resolve_against};
use crate::tree::visited::VisitedSet;
use crate::types::{Descriptor, Source};

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub retry: RetryPolicy,
    /// Directory root descriptors resolve against.
    pub base_dir: PathBuf,
}

impl ResolverOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            retry: RetryPolicy::default(),
            base_dir: base_dir.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-branch resolution state, cloned into each child.
#[derive(Debug, Clone)]
struct Scope {
    base_dir: PathBuf,
    visited: VisitedSet,
    depth: usize,
}

enum Origin {
    File(PathBuf),
    Inline(Arc<[u8]>),
}

/// Recursive, concurrent descriptor resolver.
pub struct NodeResolver {
    handlers: Arc<HandlerRegistry>,
    reader: Arc<dyn FileReader>,
    options: ResolverOptions,
}

impl NodeResolver {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        reader: Arc<dyn FileReader>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            handlers,
            reader,
            options,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Absolute path a root descriptor will resolve to, or `None` for inline content.
    pub fn root_path(&self, descriptor: &Descriptor) -> Option<PathBuf> {
        Self::path_for(descriptor, &self.options.base_dir)
    }

    /// Resolve `descriptor` with the given ancestor chain.
    ///
    /// An empty `visited` set means `descriptor` is a root: it is resolved
    /// against the configured base directory and marked `is_root`.
    pub async fn resolve(&self, descriptor: &Descriptor, visited: &VisitedSet) -> Arc<Node> {
        let scope = Scope {
            base_dir: self.options.base_dir.clone(),
            visited: visited.clone(),
            depth: visited.len(),
        };
        self.resolve_in(descriptor.clone(), scope).await
    }

    /// Resolve a root descriptor.
    pub async fn resolve_root(&self, descriptor: &Descriptor) -> Arc<Node> {
        self.resolve(descriptor, &VisitedSet::new()).await
    }

    fn resolve_in(&self, descriptor: Descriptor, scope: Scope) -> BoxFuture<'_, Arc<Node>> {
        async move { Arc::new(self.resolve_node(descriptor, scope).await) }.boxed()
    }

    fn path_for(descriptor: &Descriptor, base_dir: &Path) -> Option<PathBuf> {
        if descriptor.is_inline() {
            return None;
        }
        let target = descriptor
            .explicit_path()
            .unwrap_or_else(|| Path::new(&descriptor.name));
        Some(resolve_against(base_dir, target))
    }

    async fn resolve_node(&self, descriptor: Descriptor, scope: Scope) -> Node {
        let is_root = scope.depth == 0;
        let origin = match &descriptor.source {
            Source::Inline(content) => Origin::Inline(Arc::clone(content)),
            Source::Path(path) => Origin::File(resolve_against(&scope.base_dir, path)),
            Source::Named => Origin::File(resolve_against(&scope.base_dir, &descriptor.name)),
        };
        let path = match &origin {
            Origin::File(path) => Some(path.clone()),
            Origin::Inline(_) => None,
        };
        let mut node = Node::new(descriptor.name, descriptor.kind, path, is_root);

        let Some(handler) = self.handlers.get(&node.kind) else {
            debug!(node = %node.label(), kind = %node.kind, "No handler registered for type");
            let kind = node.kind.clone();
            return node.failed(NodeError::UnhandledType { kind });
        };

        let child_visited = match &node.path {
            Some(path) if scope.visited.contains(path) => {
                debug!(path = %path.display(), depth = scope.depth, "Cyclic dependency detected");
                let path = path.clone();
                return node.failed(NodeError::CyclicDependency { path });
            }
            Some(path) => scope.visited.extend(path.clone()),
            None => scope.visited.clone(),
        };

        let raw: Arc<[u8]> = match origin {
            Origin::Inline(content) => content,
            Origin::File(path) => match read_with_retry(&self.reader, &path, self.options.retry).await
            {
                Ok(bytes) => Arc::from(bytes),
                Err(e) => return node.failed(e),
            },
        };
        node.content_hash = Some(compute_content_hash(&raw));
        node.raw = Some(Arc::clone(&raw));

        let outcome = {
            let ctx = NodeContext {
                name: &node.name,
                kind: &node.kind,
                path: node.path.as_deref(),
                is_root,
            };
            std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx, &raw)))
        };
        let output: HandlerOutput = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(node = %node.label(), error = %format!("{e:#}"), "Handler failed");
                let kind = node.kind.clone();
                return node.failed(NodeError::HandlerException {
                    kind,
                    reason: format!("{e:#}"),
                });
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(node = %node.label(), reason = %reason, "Handler panicked");
                let kind = node.kind.clone();
                return node.failed(NodeError::HandlerException { kind, reason });
            }
        };

        let child_scope = Scope {
            base_dir: node
                .path
                .as_deref()
                .map(base_dir_of)
                .unwrap_or(scope.base_dir),
            visited: child_visited,
            depth: scope.depth + 1,
        };
        let pending = output
            .children
            .into_iter()
            .map(|child| self.resolve_in(child, child_scope.clone()));
        node.children = join_all(pending).await;
        node.payload = output.payload;

        debug!(
            node = %node.label(),
            children = node.children.len(),
            depth = scope.depth,
            "Resolved node"
        );
        node
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
