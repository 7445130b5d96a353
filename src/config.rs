//! Configuration
//!
//! Layered settings: built-in defaults, the user's global file, the
//! workspace `stitch.toml`, then `STITCH_*` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::ApiError;
use crate::io::RetryPolicy;
use crate::logging::LoggingConfig;
use crate::tree::ResolverOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StitchConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        self.resolver.validate()?;
        self.watch.validate()
    }
}

/// Resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Total read attempts per file, including the first
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,

    /// Base directory for root names; the workspace root when unset
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Line prefix the directive handler recognizes
    #[serde(default = "default_directive_prefix")]
    pub directive_prefix: String,

    /// Types handled by the directive handler
    #[serde(default = "default_directive_types")]
    pub directive_types: Vec<String>,

    /// Types handled as plain text leaves
    #[serde(default = "default_text_types")]
    pub text_types: Vec<String>,
}

fn default_read_attempts() -> u32 {
    2
}

fn default_read_retry_delay_ms() -> u64 {
    100
}

fn default_directive_prefix() -> String {
    "@require".to_string()
}

fn default_directive_types() -> Vec<String> {
    ["markup", "template", "script", "style"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_text_types() -> Vec<String> {
    vec!["text".to_string(), "resource".to_string()]
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            read_attempts: default_read_attempts(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
            base_dir: None,
            directive_prefix: default_directive_prefix(),
            directive_types: default_directive_types(),
            text_types: default_text_types(),
        }
    }
}

impl ResolverConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.read_attempts,
            delay: Duration::from_millis(self.read_retry_delay_ms),
        }
    }

    /// Resolver options rooted at `base_dir`, or at `workspace` when unset.
    /// A relative `base_dir` is taken relative to `workspace`.
    pub fn options(&self, workspace: &Path) -> ResolverOptions {
        let base = match &self.base_dir {
            Some(dir) => workspace.join(dir),
            None => workspace.to_path_buf(),
        };
        ResolverOptions::new(base).with_retry(self.retry_policy())
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.read_attempts == 0 {
            return Err(ApiError::ConfigError(
                "resolver.read_attempts must be at least 1".to_string(),
            ));
        }
        if self.directive_prefix.trim().is_empty() {
            return Err(ApiError::ConfigError(
                "resolver.directive_prefix must not be empty".to_string(),
            ));
        }
        if let Some(kind) = self
            .directive_types
            .iter()
            .find(|kind| self.text_types.contains(kind))
        {
            return Err(ApiError::ConfigError(format!(
                "type '{}' is listed as both a directive and a text type",
                kind
            )));
        }
        Ok(())
    }
}

/// OS notification backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Stat polling on a fixed interval
    #[default]
    Poll,
    /// Native filesystem events via `notify`
    Notify,
}

/// Watch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(default)]
    pub backend: WatchBackend,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            backend: WatchBackend::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatchSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.poll_interval_ms == 0 {
            return Err(ApiError::ConfigError(
                "watch.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
