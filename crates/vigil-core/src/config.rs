//! Configuration management for Vigil services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`VIGIL_<SECTION>__<KEY>`)
//! 2. Config file (`vigil.toml`, optional)
//! 3. Defaults

use ::config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;

/// Environment variable prefix shared by all Vigil sections.
pub const ENV_PREFIX: &str = "VIGIL";

/// Load one `[section]` of the layered configuration.
///
/// A section that is absent from every source yields `T::default()`.
/// A section that is present but malformed is an error.
pub fn load_section<T>(file_prefix: &str, section: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let cfg = Config::builder()
        .add_source(File::with_name(file_prefix).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section not found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}
