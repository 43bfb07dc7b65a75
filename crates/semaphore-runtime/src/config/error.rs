//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The file extension has no enabled provider.
    #[error("unsupported configuration format '.{0}'")]
    UnsupportedFormat(String),

    /// figment could not merge or deserialize the sources.
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value deserialized but is unusable.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A value needed by the chosen settings is absent.
    #[error("{field} must be set")]
    MissingField { field: &'static str },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
