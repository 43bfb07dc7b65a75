//! Observability sink.
//!
//! Every recoverable failure in the core (undecodable lines, failing handlers,
//! failing jobs) is reported through one narrow interface, [`ObservabilitySink`].
//! The default [`TracingSink`] forwards to `tracing`; [`MemorySink`] keeps the
//! reports in memory so hosts and tests can inspect them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recovered problem.
    Warning,
    /// Failure of host code or of the connection.
    Error,
}

impl Severity {
    /// Returns the lowercase name of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured key/value pairs attached to a report.
pub type Fields<'a> = &'a [(&'static str, String)];

/// Receives reports about recovered failures.
pub trait ObservabilitySink: Send + Sync {
    /// Records one report.
    fn report(&self, severity: Severity, message: &str, fields: Fields<'_>);
}

/// Shared sink handle.
pub type BoxedSink = Arc<dyn ObservabilitySink>;

/// Returns the sink used when the host does not provide one.
pub fn default_sink() -> BoxedSink {
    Arc::new(TracingSink)
}

fn render_fields(fields: Fields<'_>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Forwards reports to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn report(&self, severity: Severity, message: &str, fields: Fields<'_>) {
        let fields = render_fields(fields);
        match severity {
            Severity::Debug => debug!(fields = %fields, "{message}"),
            Severity::Info => info!(fields = %fields, "{message}"),
            Severity::Warning => warn!(fields = %fields, "{message}"),
            Severity::Error => error!(fields = %fields, "{message}"),
        }
    }
}

/// A single report captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Severity of the report.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
    /// Structured fields.
    pub fields: Vec<(&'static str, String)>,
}

impl Report {
    /// Looks up a field by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that stores every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all reports so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Counts the reports of the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }

    /// Total number of reports.
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Returns `true` if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ObservabilitySink for MemorySink {
    fn report(&self, severity: Severity, message: &str, fields: Fields<'_>) {
        self.reports.lock().push(Report {
            severity,
            message: message.to_string(),
            fields: fields.to_vec(),
        });
    }
}
