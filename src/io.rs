//! Raw File Access
//!
//! Reads artifact bytes by absolute path. Reads go through [`read_with_retry`],
//! which absorbs one transient failure (an editor holding a lock mid-save, a
//! file being replaced) before giving up.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::NodeError;

/// Default delay between the failed first read and the retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of raw file bytes.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    async fn exists(&self, path: &Path) -> bool;
}

/// Reader backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileReader;

#[async_trait]
impl FileReader for TokioFileReader {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Retry budget for a single read.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Read `path`, retrying after a fixed delay until the budget is spent.
pub async fn read_with_retry(
    reader: &Arc<dyn FileReader>,
    path: &Path,
    policy: RetryPolicy,
) -> Result<Vec<u8>, NodeError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match reader.read(path).await {
            Ok(bytes) => {
                if attempt > 1 {
                    debug!(path = %path.display(), attempt, "Read succeeded on retry");
                }
                return Ok(bytes);
            }
            Err(e) => {
                debug!(path = %path.display(), attempt, error = %e, "Read attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    warn!(path = %path.display(), attempts, reason = %reason, "Giving up on read");
    Err(NodeError::ReadFailure {
        path: path.to_path_buf(),
        attempts,
        reason,
    })
}
