//! User-wide file: `$XDG_CONFIG_HOME/stitch/config.toml`

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::PathBuf;

pub fn path() -> Option<PathBuf> {
    xdg_root::config_home()
        .ok()
        .map(|home| home.join("stitch").join("config.toml"))
}

/// Add the global file when it exists; a missing file or HOME is not an error.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(match path() {
        Some(path) => builder.add_source(File::from(path).required(false)),
        None => builder,
    })
}
