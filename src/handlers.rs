//! Built-in type handlers.
//!
//! Only enough parsing to drive the binary: plain text, and a line-directive
//! format where lines such as `@require script lib/util.js` declare children.

use anyhow::Context;

use crate::handler::{HandlerOutput, HandlerRegistry, NodeContext, TypeHandler};
use crate::types::Descriptor;

/// Default directive prefix.
pub const DEFAULT_DIRECTIVE_PREFIX: &str = "@require";

/// UTF-8 text with no references.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextHandler;

impl TypeHandler for TextHandler {
    fn handle(&self, node: &NodeContext<'_>, raw: &[u8]) -> anyhow::Result<HandlerOutput> {
        let text = std::str::from_utf8(raw)
            .with_context(|| format!("{} is not valid UTF-8", node.name))?;
        Ok(HandlerOutput::leaf(text.to_string()))
    }
}

/// Body text left after directive lines are stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveBody(pub String);

/// Extracts `<prefix> <type> <name>` lines as child references.
#[derive(Debug, Clone)]
pub struct DirectiveHandler {
    prefix: String,
}

impl DirectiveHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for DirectiveHandler {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIVE_PREFIX)
    }
}

impl TypeHandler for DirectiveHandler {
    fn handle(&self, node: &NodeContext<'_>, raw: &[u8]) -> anyhow::Result<HandlerOutput> {
        let text = std::str::from_utf8(raw)
            .with_context(|| format!("{} is not valid UTF-8", node.name))?;

        let mut children = Vec::new();
        let mut body = String::with_capacity(text.len());

        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            let Some(rest) = trimmed.strip_prefix(self.prefix.as_str()) else {
                body.push_str(line);
                body.push('\n');
                continue;
            };
            // `@required` is not `@require`
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                body.push_str(line);
                body.push('\n');
                continue;
            }

            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(kind), Some(name), None) => children.push(Descriptor::named(name, kind)),
                _ => anyhow::bail!(
                    "{}:{}: expected '{} <type> <name>'",
                    node.name,
                    index + 1,
                    self.prefix
                ),
            }
        }

        Ok(HandlerOutput::with_children(DirectiveBody(body), children))
    }
}

/// Registry wired with the built-in handlers.
pub fn builtin_registry<S: AsRef<str>>(
    prefix: &str,
    directive_types: &[S],
    text_types: &[S],
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for kind in text_types {
        registry.register(kind.as_ref(), TextHandler);
    }
    for kind in directive_types {
        registry.register(kind.as_ref(), DirectiveHandler::new(prefix));
    }
    registry
}
