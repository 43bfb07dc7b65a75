//! Semaphore Runtime - Orchestration layer for the Semaphore bot framework.
//!
//! This crate provides:
//! - Configuration loading (`semaphore.toml`, `SEMAPHORE_*` environment variables)
//! - Logging setup on `tracing-subscriber`
//! - The [`BotRuntime`], which connects to signald and drives the core engine
//!
//! ```ignore
//! use semaphore_runtime::BotRuntime;
//! use semaphore_core::ChatContext;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::new();
//!     runtime.register("(?i)^hello", |ctx: ChatContext| async move {
//!         ctx.reply("hi!").await
//!     })?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DaemonConfig, LoggingConfig, SchedulerConfig,
    SemaphoreConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BotRuntime, RuntimeBuilder};

// Re-export tracing for use by bot crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
