//! ConfigLoader facade delegating to the merge service.

use super::merge::service::MergeService;
use super::StitchConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root` from all layered sources.
    pub fn load(workspace_root: &Path) -> Result<StitchConfig, ApiError> {
        let config = MergeService::load(workspace_root)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, with the environment on top.
    pub fn load_from_file(path: &Path) -> Result<StitchConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default() -> StitchConfig {
        StitchConfig::default()
    }
}
