//! # Semaphore
//!
//! An event-dispatch and job-scheduling bot framework for the signald daemon.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌─────────────┐     ┌────────────┐     ┌──────────────────────┐
//! │ Transport │────▶│ EventStream │────▶│ Dispatcher │────▶│ Handler 1, 2, ... n  │
//! │  (socket) │     │  (decoder)  │     │ (in order) │     │ (may stop the chain) │
//! └───────────┘     └─────────────┘     └────────────┘     └──────────┬───────────┘
//!       ▲                                                             │
//!       └──────────── MessageSender ◀──────┬──────────────────────────┤
//!                                          │                          ▼
//!                                          └─────────────────── JobScheduler
//! ```
//!
//! - **Transport**: newline-delimited JSON over the daemon's Unix socket
//! - **EventStream**: decodes lines into events, skipping and reporting bad ones
//! - **Dispatcher**: offers each event to the registered handlers in order
//! - **JobScheduler**: one-shot, interval, daily and monthly jobs
//! - **Runtime**: configuration, logging and the connection loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use semaphore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::new();
//!
//!     runtime.register("^!ping$", |ctx: ChatContext| async move {
//!         ctx.reply("pong").await?;
//!         Ok::<_, anyhow::Error>(Outcome::Stop)
//!     })?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: load `semaphore.toml`
//! - `json-log`: JSON log output

pub use semaphore_core as core;
pub use semaphore_runtime as runtime;
pub use semaphore_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use semaphore::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use semaphore_runtime::{BotRuntime, RuntimeError, SemaphoreConfig};

    // Handlers
    pub use semaphore_core::{ChatContext, EventFilter, Outcome, Pattern};

    // Events
    pub use semaphore_core::{Address, Event, EventKind};

    // Outbound commands
    pub use semaphore_core::{Command, MessageSender, Recipient};

    // Scheduling
    pub use semaphore_core::{JobHandle, JobScheduler, Recurrence};
}
