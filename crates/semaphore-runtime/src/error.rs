//! Runtime error types.

use thiserror::Error;

use semaphore_core::TransportError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connecting or writing to the daemon failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The daemon connection ended while the bot was running.
    #[error("Disconnected from daemon: {reason}")]
    Disconnected { reason: String },

    /// A handler pattern did not compile.
    #[error("Invalid handler pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
