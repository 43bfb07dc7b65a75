//! Handler context.
//!
//! Each handler invocation receives a [`ChatContext`] carrying the event, the
//! captures of the registration's pattern, the job scheduler, the outbound
//! sender when a connection is up, and a [`ChatData`] store shared by every
//! event from the same source.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::foundation::error::{TransportError, TransportResult};
use crate::foundation::event::Event;
use crate::framework::pattern::Captures;
use crate::integration::sender::MessageSender;
use crate::scheduler::JobScheduler;

// =============================================================================
// Chat Data
// =============================================================================

type Slot = Arc<dyn Any + Send + Sync>;

/// Typed key/value storage kept per source address.
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct ChatData {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ChatData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.slots.lock().insert(key.into(), Arc::new(value));
    }

    /// Returns a clone of the value under `key` if it has type `T`.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        let slot = self.slots.lock().get(key).cloned()?;
        slot.downcast_ref::<T>().cloned()
    }

    /// Returns the shared value under `key` if it has type `T`.
    pub fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let slot = self.slots.lock().get(key).cloned()?;
        slot.downcast::<T>().ok()
    }

    /// Removes the value under `key`. Returns `true` if one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.slots.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl std::fmt::Debug for ChatData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.slots.lock().keys().cloned().collect();
        f.debug_struct("ChatData").field("keys", &keys).finish()
    }
}

// =============================================================================
// Chat Context
// =============================================================================

/// Everything a handler can reach while processing one event.
#[derive(Clone)]
pub struct ChatContext {
    event: Arc<Event>,
    captures: Option<Captures>,
    scheduler: JobScheduler,
    sender: Option<MessageSender>,
    data: ChatData,
}

impl ChatContext {
    /// Creates a context. Normally called by the dispatcher.
    pub fn new(
        event: Arc<Event>,
        captures: Option<Captures>,
        scheduler: JobScheduler,
        sender: Option<MessageSender>,
        data: ChatData,
    ) -> Self {
        Self {
            event,
            captures,
            scheduler,
            sender,
            data,
        }
    }

    /// The event being dispatched.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Shared handle to the event.
    pub fn event_arc(&self) -> Arc<Event> {
        Arc::clone(&self.event)
    }

    /// Message body, for data messages.
    pub fn text(&self) -> Option<&str> {
        self.event.text()
    }

    /// Identifier of the event's source address.
    pub fn source_id(&self) -> Option<&str> {
        self.event.source().map(|s| s.id())
    }

    /// Captures of the registration's pattern. `None` when it had no pattern.
    pub fn captures(&self) -> Option<&Captures> {
        self.captures.as_ref()
    }

    /// Capture group by index, shorthand for `captures()?.get(index)`.
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.as_ref()?.get(index)
    }

    /// The job scheduler.
    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Outbound sender, when connected.
    pub fn sender(&self) -> Option<&MessageSender> {
        self.sender.as_ref()
    }

    /// Per-source data store.
    pub fn data(&self) -> &ChatData {
        &self.data
    }

    fn require_sender(&self) -> TransportResult<&MessageSender> {
        self.sender
            .as_ref()
            .ok_or_else(|| TransportError::SendFailed("no connection to the daemon".into()))
    }

    /// Replies in the chat the event came from.
    pub async fn reply(&self, body: impl Into<String>) -> TransportResult<()> {
        self.require_sender()?.reply(&self.event, body).await
    }

    /// Replies quoting the original message.
    pub async fn reply_quoted(&self, body: impl Into<String>) -> TransportResult<()> {
        self.require_sender()?.reply_with(&self.event, body, true).await
    }

    /// Reacts to the event's message.
    pub async fn react(&self, emoji: impl Into<String>) -> TransportResult<()> {
        self.require_sender()?.react(&self.event, emoji).await
    }

    /// Marks the event's message as read.
    pub async fn mark_read(&self) -> TransportResult<()> {
        self.require_sender()?.mark_read(&self.event).await
    }
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("event", &self.event.kind())
            .field("captures", &self.captures)
            .field("connected", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_data_is_typed_and_shared() {
        let data = ChatData::new();
        let clone = data.clone();
        data.insert("count", 3u32);

        assert_eq!(clone.get::<u32>("count"), Some(3));
        assert_eq!(clone.get::<String>("count"), None);
        assert!(clone.get_arc::<u32>("count").is_some());
        assert!(clone.remove("count"));
        assert!(data.is_empty());
    }
}
