//! Error types.
//!
//! `NodeError` values are recorded on nodes and never abort a resolution pass.
//! `WatchError` and `ApiError` are returned to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Local, non-fatal failure attached to a single node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("unhandled type '{kind}'")]
    UnhandledType { kind: String },

    #[error("cyclic dependency on {}", path.display())]
    CyclicDependency { path: PathBuf },

    #[error("failed to read {} after {attempts} attempt(s): {reason}", path.display())]
    ReadFailure {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("handler for '{kind}' failed: {reason}")]
    HandlerException { kind: String, reason: String },
}

impl NodeError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, NodeError::CyclicDependency { .. })
    }
}

/// Errors from the watch layer.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to initialize file notifier: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Controller has been disposed")]
    Disposed,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(e: config::ConfigError) -> Self {
        ApiError::ConfigError(e.to_string())
    }
}
