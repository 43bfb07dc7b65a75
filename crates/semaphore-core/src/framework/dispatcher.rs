//! Event dispatcher.
//!
//! The [`Dispatcher`] keeps an ordered list of registrations and offers each
//! event to them in registration order:
//!
//! 1. Registrations whose [`EventFilter`] rejects the event kind are skipped
//! 2. For data messages, the registration's pattern (if any) is searched in
//!    the body; messages with an empty body only reach pattern-less handlers
//! 3. Matching handlers run one after another; [`Outcome::Stop`] ends the
//!    dispatch
//! 4. A handler that fails or panics is reported and dispatch continues
//!
//! Registrations may be added at any time. A dispatch that is already running
//! works on the list as it was when the dispatch started.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(scheduler);
//! dispatcher.register("^!ping", |ctx: ChatContext| async move {
//!     ctx.reply("pong").await
//! })?;
//! dispatcher.register_for(EventFilter::Receipts, None::<&str>, log_receipt)?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, debug, span, trace};

use crate::foundation::event::Event;
use crate::foundation::observe::{BoxedSink, Severity, default_sink};
use crate::framework::context::{ChatContext, ChatData};
use crate::framework::handler::{BoxedHandler, Handler, Outcome, into_handler};
use crate::framework::pattern::{Captures, EventFilter, IntoPattern, Pattern};
use crate::integration::sender::MessageSender;
use crate::scheduler::JobScheduler;

/// Callback invoked with every handler failure.
pub type ErrorHook = Arc<dyn Fn(&anyhow::Error, &ChatContext) + Send + Sync>;

// =============================================================================
// Registration
// =============================================================================

/// A handler with the conditions under which it runs.
#[derive(Clone)]
struct Registration {
    name: String,
    filter: EventFilter,
    pattern: Option<Pattern>,
    handler: BoxedHandler,
}

enum Match {
    No,
    Yes(Option<Captures>),
}

impl Registration {
    fn check(&self, event: &Event) -> Match {
        if !self.filter.accepts(event.kind()) {
            return Match::No;
        }
        let Some(pattern) = &self.pattern else {
            return Match::Yes(None);
        };
        match event.text() {
            // Events without text are not subject to patterns.
            None => Match::Yes(None),
            Some("") => Match::No,
            Some(text) => match pattern.captures(text) {
                Some(captures) => Match::Yes(Some(captures)),
                None => Match::No,
            },
        }
    }
}

// =============================================================================
// Dispatch Report
// =============================================================================

/// Summary of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were invoked.
    pub invoked: usize,
    /// Invoked handlers that returned an error or panicked.
    pub failed: usize,
    /// Whether a handler stopped the dispatch.
    pub stopped: bool,
}

// =============================================================================
// Dispatcher
// =============================================================================

struct Inner {
    registrations: RwLock<Arc<Vec<Registration>>>,
    /// One entry per source ever seen. Nothing evicts entries on its own;
    /// long-running bots that talk to many chats call `forget_chat`.
    chats: Mutex<HashMap<String, ChatData>>,
    scheduler: JobScheduler,
    sender: RwLock<Option<MessageSender>>,
    error_hook: RwLock<Option<ErrorHook>>,
    sink: BoxedSink,
}

/// Routes events to registered handlers.
///
/// Cloning is cheap; clones share registrations and per-source data.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher reporting to the default tracing sink.
    pub fn new(scheduler: JobScheduler) -> Self {
        Self::with_sink(scheduler, default_sink())
    }

    /// Creates a dispatcher reporting to `sink`.
    pub fn with_sink(scheduler: JobScheduler, sink: BoxedSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                registrations: RwLock::new(Arc::new(Vec::new())),
                chats: Mutex::new(HashMap::new()),
                scheduler,
                sender: RwLock::new(None),
                error_hook: RwLock::new(None),
                sink,
            }),
        }
    }

    /// Registers a handler for every event kind.
    ///
    /// With a pattern, data messages only reach the handler when the pattern
    /// occurs in their body; other kinds are not subject to the pattern.
    /// Returns the registration's position.
    pub fn register<P, H>(&self, pattern: P, handler: H) -> Result<usize, regex::Error>
    where
        P: IntoPattern,
        H: Handler,
    {
        self.register_for(EventFilter::All, pattern, handler)
    }

    /// Registers a handler restricted to the kinds accepted by `filter`.
    pub fn register_for<P, H>(
        &self,
        filter: EventFilter,
        pattern: P,
        handler: H,
    ) -> Result<usize, regex::Error>
    where
        P: IntoPattern,
        H: Handler,
    {
        let pattern = pattern.into_pattern()?;
        let registration = Registration {
            name: short_type_name::<H>(),
            filter,
            pattern,
            handler: into_handler(handler),
        };

        let mut slot = self.inner.registrations.write();
        let mut next = Vec::clone(&slot);
        next.push(registration);
        let index = next.len() - 1;
        *slot = Arc::new(next);

        debug!(
            index,
            handler = %slot[index].name,
            pattern = slot[index].pattern.as_ref().map(Pattern::as_str).unwrap_or("<any>"),
            "Registered handler"
        );
        Ok(index)
    }

    /// Installs a callback invoked with every handler failure, in addition to
    /// the sink report. Replaces any previous callback.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&anyhow::Error, &ChatContext) + Send + Sync + 'static,
    {
        *self.inner.error_hook.write() = Some(Arc::new(hook));
    }

    /// Sets or clears the sender handed to handlers.
    pub fn set_sender(&self, sender: Option<MessageSender>) {
        *self.inner.sender.write() = sender;
    }

    /// The scheduler handed to handlers.
    pub fn scheduler(&self) -> &JobScheduler {
        &self.inner.scheduler
    }

    /// Returns the number of registrations.
    pub fn handler_count(&self) -> usize {
        self.inner.registrations.read().len()
    }

    /// Returns the data store of a source, creating it if needed.
    pub fn chat_data(&self, source_id: &str) -> ChatData {
        self.inner
            .chats
            .lock()
            .entry(source_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops a source's data store. Contexts still holding it keep their
    /// copy; the next event from the source starts empty.
    pub fn forget_chat(&self, source_id: &str) -> bool {
        self.inner.chats.lock().remove(source_id).is_some()
    }

    /// Number of sources with a data store.
    pub fn chat_count(&self) -> usize {
        self.inner.chats.lock().len()
    }

    fn data_for(&self, event: &Event) -> ChatData {
        match event.source() {
            Some(source) if !source.is_empty() => self.chat_data(source.id()),
            _ => ChatData::new(),
        }
    }

    /// Offers `event` to every matching registration in order.
    pub async fn dispatch(&self, event: Arc<Event>) -> DispatchReport {
        let span = span!(Level::DEBUG, "dispatch", kind = %event.kind());
        self.dispatch_inner(event).instrument(span).await
    }

    async fn dispatch_inner(&self, event: Arc<Event>) -> DispatchReport {
        let registrations = Arc::clone(&self.inner.registrations.read());
        let sender = self.inner.sender.read().clone();
        let data = self.data_for(&event);
        let mut report = DispatchReport::default();

        for registration in registrations.iter() {
            let Match::Yes(captures) = registration.check(&event) else {
                trace!(handler = %registration.name, "Skipped");
                continue;
            };
            report.invoked += 1;

            let ctx = ChatContext::new(
                Arc::clone(&event),
                captures,
                self.inner.scheduler.clone(),
                sender.clone(),
                data.clone(),
            );
            let handler = Arc::clone(&registration.handler);
            let call_ctx = ctx.clone();
            let result = AssertUnwindSafe(async move { handler.call(call_ctx).await })
                .catch_unwind()
                .await;

            let error = match result {
                Ok(Ok(Outcome::Continue)) => continue,
                Ok(Ok(Outcome::Stop)) => {
                    debug!(handler = %registration.name, "Handler stopped dispatch");
                    report.stopped = true;
                    break;
                }
                Ok(Err(error)) => error,
                Err(panic) => anyhow::anyhow!("handler panicked: {}", panic_message(&*panic)),
            };
            report.failed += 1;
            self.report_failure(&registration.name, &error, &ctx);
        }

        report
    }

    fn report_failure(&self, handler: &str, error: &anyhow::Error, ctx: &ChatContext) {
        self.inner.sink.report(
            Severity::Error,
            "handler failed",
            &[
                ("handler", handler.to_string()),
                ("error", format!("{error:#}")),
                ("event", ctx.event().summary()),
            ],
        );

        let hook = self.inner.error_hook.read().clone();
        if let Some(hook) = hook {
            let hook_call = AssertUnwindSafe(|| hook(error, ctx));
            if std::panic::catch_unwind(hook_call).is_err() {
                self.inner.sink.report(
                    Severity::Error,
                    "error hook panicked",
                    &[("handler", handler.to_string())],
                );
            }
        }
    }

    /// Dispatches on a new task so slow handlers do not hold up the caller.
    pub fn spawn_dispatch(&self, event: Arc<Event>) -> JoinHandle<DispatchReport> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(event).await })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.handler_count())
            .finish()
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
