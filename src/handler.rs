//! Type Handler Registry
//!
//! Maps a declared type string to the handler that parses that kind of
//! artifact. A handler sees the raw bytes of one node and reports two things:
//! an opaque parsed payload, and the descriptors of whatever the node
//! references. The resolver never looks inside the payload.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::types::Descriptor;

/// Opaque parsed content produced by a handler.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// What the handler is being asked to parse.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    /// `None` for inline content.
    pub path: Option<&'a Path>,
    pub is_root: bool,
}

/// Result of handling one node.
#[derive(Clone, Default)]
pub struct HandlerOutput {
    pub payload: Option<Payload>,
    /// Referenced children, in declaration order.
    pub children: Vec<Descriptor>,
}

impl HandlerOutput {
    pub fn leaf(payload: impl Any + Send + Sync) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            children: Vec::new(),
        }
    }

    pub fn with_children(payload: impl Any + Send + Sync, children: Vec<Descriptor>) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            children,
        }
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOutput")
            .field("payload", &self.payload.as_ref().map(|_| "<payload>"))
            .field("children", &self.children)
            .finish()
    }
}

/// Parser for one declared type.
pub trait TypeHandler: Send + Sync {
    fn handle(&self, node: &NodeContext<'_>, raw: &[u8]) -> anyhow::Result<HandlerOutput>;
}

/// Handlers keyed by declared type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl TypeHandler + 'static) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn register_arc(&mut self, kind: impl Into<String>, handler: Arc<dyn TypeHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn with(mut self, kind: impl Into<String>, handler: impl TypeHandler + 'static) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TypeHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
