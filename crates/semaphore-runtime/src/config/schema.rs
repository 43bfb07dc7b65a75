//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use time::macros::format_description;

use semaphore_transport::DEFAULT_SOCKET_PATH;

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SemaphoreConfig {
    /// Connection to the signald daemon.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Job scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SemaphoreConfig {
    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.daemon.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::missing_field("daemon.socket_path"));
        }
        if matches!(self.logging.output, LogOutput::File) && self.logging.file_path.is_none() {
            return Err(ConfigError::missing_field("logging.file_path"));
        }
        self.scheduler.offset()?;
        Ok(())
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path of the daemon's Unix socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// The bot's own account number, e.g. `+12025550123`.
    #[serde(default)]
    pub username: Option<String>,

    /// Send a `subscribe` command for `username` after connecting.
    #[serde(default = "default_true")]
    pub subscribe: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            username: None,
            subscribe: true,
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Scheduler
// =============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed offset for daily and monthly jobs, as `+HH:MM`, `-HH:MM` or `Z`.
    /// Unset means the host's local offset at startup.
    #[serde(default)]
    pub utc_offset: Option<String>,
}

impl SchedulerConfig {
    /// Parses [`utc_offset`](Self::utc_offset).
    pub fn offset(&self) -> ConfigResult<Option<UtcOffset>> {
        self.utc_offset.as_deref().map(parse_utc_offset).transpose()
    }
}

/// Parses `+HH:MM`, `-HH:MM`, `Z` or `UTC`.
pub fn parse_utc_offset(text: &str) -> ConfigResult<UtcOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(
        text,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|e| ConfigError::invalid("scheduler.utc_offset", format!("'{text}': {e}")))
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level. `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file name and line number.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `semaphore_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SemaphoreConfig::default();
        assert_eq!(config.daemon.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert!(config.daemon.subscribe);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+02:00").unwrap(), UtcOffset::from_hms(2, 0, 0).unwrap());
        assert_eq!(parse_utc_offset("-05:30").unwrap(), UtcOffset::from_hms(-5, -30, 0).unwrap());
        assert_eq!(parse_utc_offset("Z").unwrap(), UtcOffset::UTC);
        assert!(parse_utc_offset("two hours").is_err());
        assert!(parse_utc_offset("02:00").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SemaphoreConfig::default();
        config.scheduler.utc_offset = Some("noon".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = SemaphoreConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(config.validate(), Err(ConfigError::MissingField { .. })));
    }
}
