//! Framework layer: handlers, patterns and the dispatcher.

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod pattern;

pub use context::{ChatContext, ChatData};
pub use dispatcher::{DispatchReport, Dispatcher, ErrorHook};
pub use handler::{
    BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, IntoOutcome, Outcome, into_handler,
};
pub use pattern::{Captures, EventFilter, IntoPattern, Pattern};
