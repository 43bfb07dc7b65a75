//! Timer Bot Example
//!
//! Shows handlers submitting jobs to the shared scheduler and keeping their
//! handles in the per-chat data store.
//!
//! # Commands
//!
//! ```text
//! !timer <secs>   one message after <secs> seconds
//! !every <secs>   a message every <secs> seconds
//! !daily <HH:MM>  a message every day at HH:MM
//! !stop           cancels every job started from this chat
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package timer-bot -- --username +12025550123
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use semaphore::prelude::*;
use semaphore::runtime::ConfigLoader;
use time::Time;
use time::macros::format_description;
use tracing::{error, info};

/// Chat data key holding the chat's job handles.
const JOBS_KEY: &str = "timer_bot.jobs";

#[derive(Parser, Debug)]
#[command(name = "timer-bot", about = "Sends timed Signal messages")]
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
// Helpers
// ============================================================================

/// Sender and chat for messages sent later by a job.
fn reply_target(ctx: &ChatContext) -> Result<(MessageSender, Recipient)> {
    let sender = ctx.sender().cloned().context("not connected to signald")?;
    let to = Recipient::for_event(ctx.event()).context("event has no chat to answer")?;
    Ok((sender, to))
}

fn remember(ctx: &ChatContext, job: JobHandle) {
    let mut jobs: Vec<JobHandle> = ctx.data().get(JOBS_KEY).unwrap_or_default();
    jobs.retain(|j| !j.is_cancelled());
    jobs.push(job);
    ctx.data().insert(JOBS_KEY, jobs);
}

fn seconds(ctx: &ChatContext) -> Result<u64> {
    let text = ctx.capture(1).context("missing number of seconds")?;
    let secs: u64 = text.parse().with_context(|| format!("'{text}' is not a number"))?;
    anyhow::ensure!(secs > 0, "the number of seconds must be positive");
    Ok(secs)
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn timer(ctx: ChatContext) -> Result<Outcome> {
    let secs = seconds(&ctx)?;
    let (sender, to) = reply_target(&ctx)?;

    let job = ctx
        .scheduler()
        .submit_after(Duration::from_secs(secs), move |_job: JobHandle| {
            let sender = sender.clone();
            let to = to.clone();
            async move { sender.send_message(&to, format!("⏰ {secs}s are up")).await }
        })?;
    info!(job = %job.id(), secs, "Timer set");
    remember(&ctx, job);

    ctx.reply(format!("Timer set for {secs}s")).await?;
    Ok(Outcome::Stop)
}

async fn every(ctx: ChatContext) -> Result<Outcome> {
    let secs = seconds(&ctx)?;
    let (sender, to) = reply_target(&ctx)?;

    let job = ctx.scheduler().submit_repeating(
        Duration::from_secs(secs),
        None,
        move |job: JobHandle| {
            let sender = sender.clone();
            let to = to.clone();
            async move {
                let text = format!("🔁 tick #{} (every {secs}s)", job.run_count() + 1);
                sender.send_message(&to, text).await
            }
        },
    )?;
    info!(job = %job.id(), secs, "Repeating job started");
    remember(&ctx, job);

    ctx.reply(format!("Ticking every {secs}s, send !stop to end")).await?;
    Ok(Outcome::Stop)
}

async fn daily(ctx: ChatContext) -> Result<Outcome> {
    let text = ctx.capture(1).context("missing time of day")?;
    let at = Time::parse(text, format_description!("[hour]:[minute]"))
        .with_context(|| format!("'{text}' is not a HH:MM time"))?;
    let (sender, to) = reply_target(&ctx)?;

    let job = ctx.scheduler().submit_daily(at, move |_job: JobHandle| {
        let sender = sender.clone();
        let to = to.clone();
        async move { sender.send_message(&to, format!("📅 It is {at}")).await }
    })?;
    info!(job = %job.id(), %at, "Daily job started");
    remember(&ctx, job);

    ctx.reply(format!(
        "Daily message at {at} (UTC{})",
        ctx.scheduler().utc_offset()
    ))
    .await?;
    Ok(Outcome::Stop)
}

async fn stop(ctx: ChatContext) -> Result<Outcome> {
    let jobs: Vec<JobHandle> = ctx.data().get(JOBS_KEY).unwrap_or_default();
    let active = jobs.iter().filter(|j| !j.is_cancelled()).count();
    for job in &jobs {
        ctx.scheduler().cancel(job);
    }
    ctx.data().remove(JOBS_KEY);

    ctx.reply(format!("Stopped {active} job(s)")).await?;
    Ok(Outcome::Stop)
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

    runtime.register_for(EventFilter::Messages, r"^!timer\s+(\S+)\s*$", timer)?;
    runtime.register_for(EventFilter::Messages, r"^!every\s+(\S+)\s*$", every)?;
    runtime.register_for(EventFilter::Messages, r"^!daily\s+(\S+)\s*$", daily)?;
    runtime.register_for(EventFilter::Messages, r"^!stop\s*$", stop)?;

    runtime.on_error(|err, ctx| {
        error!(error = %err, event = %ctx.event().summary(), "Command failed");
        let ctx = ctx.clone();
        let reason = err.to_string();
        tokio::spawn(async move {
            let _ = ctx.reply(format!("⚠️ {reason}")).await;
        });
    });

    runtime.run().await?;
    Ok(())
}
