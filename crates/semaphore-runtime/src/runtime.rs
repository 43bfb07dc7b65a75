//! Main runtime orchestration.
//!
//! [`BotRuntime`] owns one [`Dispatcher`] and one [`JobScheduler`]. Running it
//! connects to the daemon, subscribes the configured account, starts the
//! scheduler loop and feeds every decoded event to the dispatcher until the
//! connection drops or the host asks it to stop.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use semaphore_runtime::BotRuntime;
//!
//! let runtime = BotRuntime::builder().profile("production").build()?;
//! runtime.register("^!ping", |ctx: ChatContext| async move { ctx.reply("pong").await })?;
//! runtime.run().await?;
//! ```
//!
//! There is no reconnect: when the daemon goes away, [`BotRuntime::run`]
//! returns [`RuntimeError::Disconnected`] and the host decides what to do.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tracing::{debug, info, warn};

use semaphore_core::{
    Address, BoxedSink, ChatContext, ConnectionHandle, Dispatcher, EventFilter, EventStream, Handler,
    IntoPattern, JobScheduler, LineReader, MessageSender, default_sink,
};

use crate::config::{ConfigLoader, SemaphoreConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The bot runtime.
///
/// A runtime serves a single daemon session: once [`run`](Self::run)
/// returns, its scheduler is shut down.
pub struct BotRuntime {
    config: SemaphoreConfig,
    dispatcher: Dispatcher,
    sink: BoxedSink,
}

impl BotRuntime {
    /// Creates a runtime from `semaphore.toml` and the environment, falling
    /// back to defaults when loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .with_user_config_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SemaphoreConfig::default()
            });
        Self::assemble(config, default_sink())
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from already loaded configuration.
    ///
    /// Initializes logging from `config.logging` unless a subscriber is
    /// already installed.
    pub fn from_config(config: &SemaphoreConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config.clone(), default_sink()))
    }

    /// Callers validate `config` first.
    fn assemble(config: SemaphoreConfig, sink: BoxedSink) -> Self {
        logging::init_from_config(&config.logging);

        let mut scheduler = JobScheduler::builder().sink(Arc::clone(&sink));
        if let Ok(Some(offset)) = config.scheduler.offset() {
            scheduler = scheduler.utc_offset(offset);
        }
        let scheduler = scheduler.build();
        let dispatcher = Dispatcher::with_sink(scheduler, Arc::clone(&sink));

        info!(
            socket = %config.daemon.socket_path.display(),
            offset = %dispatcher.scheduler().utc_offset(),
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Self {
            config,
            dispatcher,
            sink,
        }
    }

    pub fn config(&self) -> &SemaphoreConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The scheduler shared with every handler context.
    pub fn scheduler(&self) -> &JobScheduler {
        self.dispatcher.scheduler()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a handler. See [`Dispatcher::register`].
    pub fn register<P, H>(&self, pattern: P, handler: H) -> RuntimeResult<usize>
    where
        P: IntoPattern,
        H: Handler,
    {
        Ok(self.dispatcher.register(pattern, handler)?)
    }

    /// Registers a handler for some event kinds. See [`Dispatcher::register_for`].
    pub fn register_for<P, H>(&self, filter: EventFilter, pattern: P, handler: H) -> RuntimeResult<usize>
    where
        P: IntoPattern,
        H: Handler,
    {
        Ok(self.dispatcher.register_for(filter, pattern, handler)?)
    }

    /// Installs the handler failure callback. See [`Dispatcher::on_error`].
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&anyhow::Error, &ChatContext) + Send + Sync + 'static,
    {
        self.dispatcher.on_error(hook);
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Runs until Ctrl+C, SIGTERM or disconnection.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Semaphore runtime is starting. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Connects to the configured socket and runs until `shutdown` completes
    /// or the connection ends.
    #[cfg(unix)]
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let connection = semaphore_transport::connect_unix(&self.config.daemon.socket_path).await?;
        let (reader, handle) = connection.into_parts();
        let reader = reader.with_sink(Arc::clone(&self.sink));
        self.serve(reader, handle, shutdown).await
    }

    #[cfg(not(unix))]
    pub async fn run_until<F>(&self, _shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        Err(RuntimeError::Transport(semaphore_core::TransportError::ConnectionFailed {
            target: self.config.daemon.socket_path.display().to_string(),
            reason: "unix sockets are not available on this platform".into(),
        }))
    }

    /// Runs a session over an established connection.
    ///
    /// Returns `Ok(())` when `shutdown` completes first and
    /// [`RuntimeError::Disconnected`] when the event stream ends.
    pub async fn serve<R, F>(&self, reader: R, handle: ConnectionHandle, shutdown: F) -> RuntimeResult<()>
    where
        R: LineReader,
        F: Future<Output = ()>,
    {
        let sender = MessageSender::new(Arc::new(handle.clone()), self.config.daemon.username.clone());
        if self.config.daemon.subscribe {
            match sender.username() {
                Some(username) => {
                    sender.subscribe().await?;
                    info!(account = %Address::number(username), "Subscribed to incoming messages");
                }
                None => warn!("No daemon.username configured, not subscribing"),
            }
        }

        self.dispatcher.set_sender(Some(sender));
        let scheduler_task = self.scheduler().spawn();
        let mut events = EventStream::with_sink(reader, Arc::clone(&self.sink));

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }

                event = events.next_event() => match event {
                    Ok(event) => {
                        debug!(event = %event.summary(), "Event received");
                        self.dispatcher.spawn_dispatch(Arc::new(event));
                    }
                    Err(error) => {
                        warn!(error = %error, "Event stream ended");
                        break Err(RuntimeError::Disconnected {
                            reason: error.to_string(),
                        });
                    }
                },
            }
        };

        events.close();
        handle.close();
        self.dispatcher.set_sender(None);
        self.scheduler().shutdown();
        let _ = scheduler_task.await;
        info!(
            decoded = events.decoded_count(),
            dropped = events.dropped_count(),
            "Runtime stopped"
        );

        result
    }
}

impl Default for BotRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("socket", &self.config.daemon.socket_path)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl+C only");
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`BotRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = BotRuntime::builder()
///     .config_file("config/semaphore.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    sink: Option<BoxedSink>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
            sink: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SemaphoreConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Routes decode, handler and job failure reports to `sink` instead of
    /// `tracing`.
    pub fn sink(mut self, sink: BoxedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> RuntimeResult<BotRuntime> {
        let config = self.config_loader.load()?;
        Ok(BotRuntime::assemble(config, self.sink.unwrap_or_else(default_sink)))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semaphore_core::{MemorySink, Outcome, Severity};
    use semaphore_transport::LineConnection;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    const PING: &str = r#"{"type":"IncomingMessage","data":{"source":{"number":"+15550001"},"timestamp":1700000000000,"account":"+15559999","data_message":{"body":"!ping","timestamp":1700000000000}}}"#;

    fn runtime(username: Option<&str>, sink: Arc<MemorySink>) -> BotRuntime {
        let mut config = SemaphoreConfig::default();
        config.daemon.username = username.map(str::to_string);
        BotRuntime::builder()
            .search_path(std::env::temp_dir().join("semaphore-no-such-dir"))
            .without_env()
            .merge(config)
            .sink(sink)
            .build()
            .unwrap()
    }

    async fn read_json<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_serve_subscribes_dispatches_and_reports_disconnect() {
        let sink = Arc::new(MemorySink::new());
        let runtime = runtime(Some("+15559999"), sink.clone());
        runtime
            .register("^!ping", |ctx: ChatContext| async move { ctx.reply("pong").await })
            .unwrap();

        let (local, remote) = tokio::io::duplex(8192);
        let (reader, handle) = LineConnection::from_io("duplex", local).into_parts();
        let (daemon_read, mut daemon_write) = tokio::io::split(remote);
        let mut daemon_read = BufReader::new(daemon_read);

        let daemon = async move {
            let subscribe = read_json(&mut daemon_read).await;
            daemon_write.write_all(b"not json\n").await.unwrap();
            daemon_write.write_all(PING.as_bytes()).await.unwrap();
            daemon_write.write_all(b"\n").await.unwrap();
            let reply = read_json(&mut daemon_read).await;
            drop(daemon_write);
            drop(daemon_read);
            (subscribe, reply)
        };

        let (result, (subscribe, reply)) =
            tokio::join!(runtime.serve(reader, handle, std::future::pending()), daemon);

        assert!(matches!(result, Err(RuntimeError::Disconnected { .. })));
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["username"], "+15559999");
        assert_eq!(reply["type"], "send");
        assert_eq!(reply["messageBody"], "pong");
        assert_eq!(reply["recipientAddress"]["number"], "+15550001");
        assert_eq!(sink.count(Severity::Warning), 1);
        assert!(runtime.scheduler().is_shut_down());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_without_subscribing() {
        let sink = Arc::new(MemorySink::new());
        let runtime = runtime(None, sink);
        runtime
            .register(None::<&str>, |_ctx: ChatContext| async { Outcome::Continue })
            .unwrap();

        let (local, _remote) = tokio::io::duplex(1024);
        let (reader, handle) = LineConnection::from_io("duplex", local).into_parts();
        let observed = handle.clone();

        let result = runtime
            .serve(reader, handle, tokio::time::sleep(Duration::from_millis(10)))
            .await;

        assert!(result.is_ok());
        assert_eq!(observed.state(), semaphore_core::ConnectionState::Closed);
        assert!(runtime.scheduler().is_shut_down());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_pattern() {
        let runtime = runtime(None, Arc::new(MemorySink::new()));
        let result = runtime.register("(unclosed", |_ctx: ChatContext| async {});
        assert!(matches!(result, Err(RuntimeError::Pattern(_))));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = SemaphoreConfig::default();
        config.scheduler.utc_offset = Some("+03:00".into());
        let runtime = BotRuntime::from_config(&config).unwrap();
        assert_eq!(runtime.scheduler().utc_offset().whole_hours(), 3);

        config.scheduler.utc_offset = Some("later".into());
        assert!(matches!(
            BotRuntime::from_config(&config),
            Err(RuntimeError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_until_connects_to_socket() {
        use tokio::net::UnixListener;

        let path = std::env::temp_dir().join(format!("semaphore-{}-runtime.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let mut config = SemaphoreConfig::default();
        config.daemon.socket_path = path.clone();
        config.daemon.username = Some("+15559999".into());
        let runtime = BotRuntime::from_config(&config).unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let daemon = async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(stream);
            let subscribe = read_json(&mut stream).await;
            let _ = stop_tx.send(());
            subscribe
        };

        let (result, subscribe) = tokio::join!(
            runtime.run_until(async {
                let _ = stop_rx.await;
            }),
            daemon
        );
        let _ = std::fs::remove_file(&path);

        assert!(result.is_ok());
        assert_eq!(subscribe["type"], "subscribe");
    }
}
