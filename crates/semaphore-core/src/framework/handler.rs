//! Handler system.
//!
//! A handler is any async function taking a [`ChatContext`]. Its return value
//! decides whether dispatch continues:
//!
//! | Return type               | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `()`                      | continue                                  |
//! | [`Outcome`]               | continue or stop                          |
//! | `Result<(), E>`           | continue, or fail with `E`                |
//! | `Result<Outcome, E>`      | continue, stop, or fail with `E`          |
//!
//! ```rust,ignore
//! async fn echo(ctx: ChatContext) -> anyhow::Result<()> {
//!     ctx.reply(ctx.text().unwrap_or_default()).await?;
//!     Ok(())
//! }
//!
//! async fn gate(ctx: ChatContext) -> Outcome {
//!     if ctx.source_id() == Some("+15550000000") { Outcome::Stop } else { Outcome::Continue }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::framework::context::ChatContext;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Outcome
// ============================================================================

/// What the dispatcher should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Offer the event to the next matching registration.
    #[default]
    Continue,
    /// Skip the remaining registrations for this event.
    Stop,
}

/// Converts a handler's return value into an [`Outcome`] or a failure.
pub trait IntoOutcome {
    fn into_outcome(self) -> anyhow::Result<Outcome>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> anyhow::Result<Outcome> {
        Ok(Outcome::Continue)
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> anyhow::Result<Outcome> {
        Ok(self)
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<Outcome> {
        self.map(|()| Outcome::Continue).map_err(Into::into)
    }
}

impl<E> IntoOutcome for Result<Outcome, E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<Outcome> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// An event handler.
///
/// Implemented for every `Fn(ChatContext) -> impl Future` whose output
/// implements [`IntoOutcome`].
pub trait Handler: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = anyhow::Result<Outcome>> + Send + 'static;

    /// Call the handler with the given context.
    fn call(self, ctx: ChatContext) -> Self::Future;
}

impl<F, Fut, R> Handler for F
where
    F: FnOnce(ChatContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome,
{
    type Future = BoxFuture<'static, anyhow::Result<Outcome>>;

    fn call(self, ctx: ChatContext) -> Self::Future {
        Box::pin(async move { (self)(ctx).await.into_outcome() })
    }
}

// ============================================================================
// Type Erasure
// ============================================================================

/// Wraps a handler so it can be stored behind [`ErasedHandler`].
#[derive(Clone)]
pub struct HandlerFn<H> {
    handler: H,
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Execute the handler with the given context.
    fn call(&self, ctx: ChatContext) -> BoxFuture<'static, anyhow::Result<Outcome>>;
}

impl<H: Handler> ErasedHandler for HandlerFn<H> {
    fn call(&self, ctx: ChatContext) -> BoxFuture<'static, anyhow::Result<Outcome>> {
        let handler = self.handler.clone();
        Box::pin(handler.call(ctx))
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(HandlerFn { handler })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_outcome() {
        assert_eq!(().into_outcome().unwrap(), Outcome::Continue);
        assert_eq!(Outcome::Stop.into_outcome().unwrap(), Outcome::Stop);
        assert_eq!(
            Ok::<_, std::io::Error>(Outcome::Stop).into_outcome().unwrap(),
            Outcome::Stop
        );

        let failed: Result<(), anyhow::Error> = Err(anyhow::anyhow!("boom"));
        assert_eq!(failed.into_outcome().unwrap_err().to_string(), "boom");
    }
}
