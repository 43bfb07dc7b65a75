//! Echo Bot Example
//!
//! A simple demonstration of the Semaphore framework: every text message is
//! sent back to the chat it came from.
//!
//! # Handler Chain
//!
//! Handlers run in registration order for each event:
//!
//! ```text
//! 1. log_event    (no pattern)  logs every event, continues
//! 2. mark_read    (messages)    sends a read receipt, continues
//! 3. help / ping  (commands)    answer and stop the chain
//! 4. echo         (any text)    echoes the body
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --username +12025550123
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use semaphore::prelude::*;
use semaphore::runtime::ConfigLoader;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "echo-bot", about = "Echoes every Signal message back")]
struct Args {
    /// Configuration file (defaults to ./semaphore.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path of the signald socket
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Account number the bot runs as
    #[arg(short, long)]
    username: Option<String>,
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn log_event(ctx: ChatContext) {
    info!(event = %ctx.event().summary(), "Event");
}

async fn mark_read(ctx: ChatContext) -> Result<()> {
    ctx.mark_read().await?;
    Ok(())
}

async fn help(ctx: ChatContext) -> Result<Outcome> {
    let help_text = "Echo Bot - Commands\n\
        !ping  - Pong!\n\
        !help  - This help\n\
        anything else is echoed back";
    ctx.reply(help_text).await?;
    Ok(Outcome::Stop)
}

async fn ping(ctx: ChatContext) -> Result<Outcome> {
    ctx.reply_quoted("Pong! 🏓").await?;
    Ok(Outcome::Stop)
}

async fn echo(ctx: ChatContext) -> Result<()> {
    if let Some(text) = ctx.text() {
        ctx.reply(text.to_string()).await?;
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if let Some(socket) = args.socket {
        config.daemon.socket_path = socket;
    }
    if let Some(username) = args.username {
        config.daemon.username = Some(username);
    }

    let runtime = BotRuntime::from_config(&config)?;

    runtime.register(None::<&str>, log_event)?;
    runtime.register_for(EventFilter::Messages, None::<&str>, mark_read)?;
    runtime.register_for(EventFilter::Messages, r"^!help\s*$", help)?;
    runtime.register_for(EventFilter::Messages, r"^!ping\s*$", ping)?;
    runtime.register_for(EventFilter::Messages, ".", echo)?;

    runtime.on_error(|err, ctx| {
        error!(error = %err, event = %ctx.event().summary(), "Handler failed");
    });

    match runtime.run().await {
        Err(RuntimeError::Disconnected { reason }) => {
            error!(%reason, "Lost connection to signald");
            std::process::exit(1);
        }
        other => other?,
    }

    Ok(())
}
