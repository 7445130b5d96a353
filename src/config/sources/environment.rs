//! Environment variable source: STITCH_* prefix with __ separator

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment};

/// Add environment variable overlay to builder.
///
/// `STITCH_WATCH__BACKEND=notify` sets `watch.backend`. The type lists take
/// comma-separated values.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("STITCH")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("resolver.directive_types")
            .with_list_parse_key("resolver.text_types"),
    );
    Ok(builder)
}
