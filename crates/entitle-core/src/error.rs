use thiserror::Error;

/// Top-level error type for the Entitle platform.
#[derive(Error, Debug)]
pub enum EntitleError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid {kind} id {value:?}: {source}")]
    InvalidId {
        kind: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },
}
