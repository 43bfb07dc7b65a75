//! Configuration module for the Semaphore runtime.
//!
//! Settings come from built-in defaults, an optional `semaphore.toml` and
//! `SEMAPHORE_*` environment variables, layered by [`ConfigLoader`].

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    DaemonConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SchedulerConfig,
    SemaphoreConfig, SpanEventConfig, parse_utc_offset,
};
