use thiserror::Error;

/// Top-level error type shared by the Gravity crates.
///
/// Subsystem crates define their own error enums and convert into this one
/// only where a failure crosses into configuration or I/O territory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GravityError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("API error: {0}")]
    Api(String),
}

impl From<toml::de::Error> for GravityError {
    fn from(err: toml::de::Error) -> Self {
        GravityError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for GravityError {
    fn from(err: toml::ser::Error) -> Self {
        GravityError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GravityError {
    fn from(err: serde_json::Error) -> Self {
        GravityError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Gravity operations.
pub type Result<T> = std::result::Result<T, GravityError>;
