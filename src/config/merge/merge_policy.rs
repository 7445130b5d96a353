//! Merge policy: built-in defaults form the lowest layer; later sources
//! override individual keys, never whole tables.

use crate::config::StitchConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder pre-seeded with every default value.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&StitchConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
