//! Unified error types for the Semaphore core.
//!
//! Only two classes of error ever leave the core as values: a terminal
//! [`TransportError`] from the event stream, and a [`SubmitError`] when a job
//! request is malformed. Decode, handler and job failures are recovered where
//! they happen and reported to the observability sink instead.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection to the daemon could not be established.
    #[error("connection failed: {target} - {reason}")]
    ConnectionFailed {
        /// The socket path or address that failed to connect.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connection is closed. Terminal for the event stream.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// A line could not be written.
    #[error("failed to send line: {0}")]
    SendFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a connection-closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error means the connection is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. } | Self::Io(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors raised while turning a raw line into an [`Event`](crate::Event).
///
/// These never terminate the event stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The line is JSON but not an object.
    #[error("protocol record is not a JSON object")]
    NotAnObject,

    /// The record has no string `type` discriminant.
    #[error("protocol record has no type")]
    MissingType,

    /// The discriminant is unknown and the record carries no reply id.
    #[error("unsupported record type '{0}'")]
    UnknownType(String),

    /// A field required by the record type is missing or has the wrong shape.
    #[error("record '{record}' is missing field '{field}'")]
    MissingField {
        /// Record type being decoded.
        record: String,
        /// Dotted path of the missing field.
        field: &'static str,
    },

    /// The line exceeded the transport's length limit and was discarded.
    #[error("line longer than {max} bytes")]
    LineTooLong {
        /// Limit in bytes.
        max: usize,
    },
}

impl DecodeError {
    /// Creates a missing field error.
    pub fn missing(record: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            record: record.into(),
            field,
        }
    }
}

// =============================================================================
// Scheduler Errors
// =============================================================================

/// Errors returned when a job cannot be submitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Repeating jobs need a non-zero interval.
    #[error("repeat interval must be greater than zero")]
    ZeroInterval,

    /// Day of month outside `1..=31`.
    #[error("invalid day of month: {0}")]
    InvalidDayOfMonth(u8),

    /// The first or next due time is too far in the future to represent.
    #[error("due time is out of range")]
    DueOutOfRange,

    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShutDown,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for job submission.
pub type SubmitResult<T> = Result<T, SubmitError>;
