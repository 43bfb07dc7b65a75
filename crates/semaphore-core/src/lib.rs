//! # Semaphore Core
//!
//! The engine of the Semaphore bot framework for the signald daemon.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Events**: decoded protocol records ([`Event`], [`EventKind`], [`Address`])
//! - **Errors**: [`TransportError`], [`DecodeError`], [`SubmitError`]
//! - **Observability**: the narrow reporting interface ([`ObservabilitySink`])
//!
//! ### Framework Layer
//!
//! - **Handlers**: async functions over a [`ChatContext`] ([`Handler`], [`Outcome`])
//! - **Patterns**: regular expressions and kind filters ([`Pattern`], [`EventFilter`])
//! - **Dispatcher**: ordered, stoppable routing ([`Dispatcher`])
//! - **Scheduler**: timed jobs ([`JobScheduler`], [`JobHandle`])
//!
//! ### Integration Layer
//!
//! - **Stream**: raw lines to events ([`EventStream`])
//! - **Transport**: the line abstraction and the write handle ([`LineReader`], [`ConnectionHandle`])
//! - **Commands**: outbound messages ([`MessageSender`], [`Command`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐    ┌─────────────┐    ┌────────────┐    ┌──────────┐
//! │ Transport │───▶│ EventStream │───▶│ Dispatcher │───▶│ Handlers │
//! └───────────┘    └─────────────┘    └────────────┘    └────┬─────┘
//!       ▲                                                    │
//!       │          ┌───────────────┐                         │
//!       └──────────│ MessageSender │◀────────────────────────┤
//!                  └───────────────┘    ┌──────────────┐     │
//!                                       │ JobScheduler │◀────┘
//!                                       └──────────────┘
//! ```

pub mod foundation;
pub mod framework;
pub mod integration;
pub mod scheduler;
pub mod stream;
pub mod transport;

// Foundation re-exports
pub use foundation::error::{
    DecodeError, DecodeResult, SubmitError, SubmitResult, TransportError, TransportResult,
};
pub use foundation::event::{
    Address, Event, EventKind, MessageEvent, ReceiptEvent, ReceiptKind, ReplyEvent, TypingAction,
    TypingEvent,
};
pub use foundation::observe::{
    BoxedSink, MemorySink, ObservabilitySink, Report, Severity, TracingSink, default_sink,
};

// Framework re-exports
pub use framework::{
    BoxFuture, BoxedHandler, Captures, ChatContext, ChatData, DispatchReport, Dispatcher,
    EventFilter, Handler, IntoOutcome, IntoPattern, Outcome, Pattern,
};
pub use scheduler::{JobCallback, JobHandle, JobId, JobScheduler, Recurrence, SchedulerBuilder};

// Integration re-exports
pub use integration::{Command, CommandSender, MessageSender, Recipient};
pub use stream::{EventStream, decode_line};
pub use transport::{ConnectionHandle, ConnectionState, LineReader, RawLine, StateCell};
