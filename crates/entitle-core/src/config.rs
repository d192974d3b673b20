//! Configuration management for Entitle services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`ENTITLE__` prefix, `__` separator)
//! 2. Config file (`entitle.toml` by default)
//! 3. Defaults

use serde::de::DeserializeOwned;

use crate::error::EntitleError;

/// Environment variable prefix shared by every section.
pub const ENV_PREFIX: &str = "ENTITLE";

/// Load one top-level section (e.g. `neo4j`) into `T`.
///
/// A missing file is fine. A missing section yields `T::default()`; a
/// present but malformed section is an error.
pub fn load_section<T>(file_prefix: &str, section: &str) -> Result<T, EntitleError>
where
    T: DeserializeOwned + Default,
{
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}
