//! Message sender.
//!
//! [`MessageSender`] builds the outbound commands a bot commonly needs
//! (sending, reacting, receipts, typing indicators) on top of any
//! [`CommandSender`].

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::foundation::error::TransportResult;
use crate::foundation::event::{Address, Event};
use crate::integration::command::{Command, CommandSender};

/// Destination of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A single account.
    Address(Address),
    /// A group, by group id.
    Group(String),
}

impl Recipient {
    /// Where a response to `event` should go: its group if it came from one,
    /// otherwise its source.
    pub fn for_event(event: &Event) -> Option<Self> {
        if let Some(group_id) = event.group_id() {
            return Some(Self::Group(group_id.to_string()));
        }
        event.source().cloned().map(Self::Address)
    }

    fn apply(&self, command: Command) -> Command {
        match self {
            Self::Address(address) => command.field("recipientAddress", address_value(address)),
            Self::Group(group_id) => command.field("recipientGroupId", group_id.clone()),
        }
    }
}

fn address_value(address: &Address) -> Value {
    serde_json::to_value(address).unwrap_or(Value::Null)
}

/// Builds and sends commands on behalf of one account.
#[derive(Clone)]
pub struct MessageSender {
    transport: Arc<dyn CommandSender>,
    username: Option<String>,
}

impl MessageSender {
    /// Creates a sender. `username` is the bot's own account number, added to
    /// every command when known.
    pub fn new(transport: Arc<dyn CommandSender>, username: Option<String>) -> Self {
        Self {
            transport,
            username,
        }
    }

    /// The account commands are sent as.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn base(&self, command_type: &str) -> Command {
        Command::new(command_type).field_opt("username", self.username.clone())
    }

    /// Sends a prepared command, adding the username if the command has none.
    pub async fn command(&self, mut command: Command) -> TransportResult<()> {
        if let Some(username) = &self.username {
            command
                .fields
                .entry("username")
                .or_insert_with(|| Value::from(username.clone()));
        }
        debug!(command = %command.command_type, "Sending command");
        self.transport.send_command(command).await
    }

    /// Subscribes to incoming messages for the account.
    pub async fn subscribe(&self) -> TransportResult<()> {
        self.command(self.base("subscribe")).await
    }

    /// Sends a text message.
    pub async fn send_message(&self, to: &Recipient, body: impl Into<String>) -> TransportResult<()> {
        let command = to.apply(self.base("send")).field("messageBody", body.into());
        self.command(command).await
    }

    /// Responds to `event` in the chat it came from.
    pub async fn reply(&self, event: &Event, body: impl Into<String>) -> TransportResult<()> {
        self.reply_with(event, body, false).await
    }

    /// Responds to `event`, optionally quoting the original message.
    pub async fn reply_with(
        &self,
        event: &Event,
        body: impl Into<String>,
        quote: bool,
    ) -> TransportResult<()> {
        let Some(to) = Recipient::for_event(event) else {
            debug!(kind = %event.kind(), "Event has no recipient, reply dropped");
            return Ok(());
        };
        let mut command = to.apply(self.base("send")).field("messageBody", body.into());
        if quote && let Some(message) = event.as_message() {
            command = command.field(
                "quote",
                json!({
                    "id": message.timestamp,
                    "author": address_value(&message.source),
                    "text": message.body,
                }),
            );
        }
        self.command(command).await
    }

    /// Reacts to a message with an emoji.
    pub async fn react(&self, event: &Event, emoji: impl Into<String>) -> TransportResult<()> {
        let (Some(to), Some(source), Some(timestamp)) =
            (Recipient::for_event(event), event.source(), event.timestamp())
        else {
            return Ok(());
        };
        let command = to.apply(self.base("react")).field(
            "reaction",
            json!({
                "emoji": emoji.into(),
                "targetAuthor": address_value(source),
                "targetSentTimestamp": timestamp,
            }),
        );
        self.command(command).await
    }

    async fn receipt(&self, command_type: &str, event: &Event) -> TransportResult<()> {
        let (Some(source), Some(timestamp)) = (event.source(), event.timestamp()) else {
            return Ok(());
        };
        let command = self
            .base(command_type)
            .field("recipientAddress", address_value(source))
            .field("timestamps", json!([timestamp]));
        self.command(command).await
    }

    /// Marks the message as read.
    pub async fn mark_read(&self, event: &Event) -> TransportResult<()> {
        self.receipt("mark_read", event).await
    }

    /// Marks the message as delivered.
    pub async fn mark_delivered(&self, event: &Event) -> TransportResult<()> {
        self.receipt("mark_delivered", event).await
    }

    async fn typing(&self, command_type: &str, event: &Event) -> TransportResult<()> {
        let Some(to) = Recipient::for_event(event) else {
            return Ok(());
        };
        self.command(to.apply(self.base(command_type))).await
    }

    /// Shows the typing indicator in the event's chat.
    pub async fn typing_started(&self, event: &Event) -> TransportResult<()> {
        self.typing("typing_started", event).await
    }

    /// Hides the typing indicator in the event's chat.
    pub async fn typing_stopped(&self, event: &Event) -> TransportResult<()> {
        self.typing("typing_stopped", event).await
    }

    /// Sets the disappearing-message timer of a chat.
    pub async fn set_expiration(&self, to: &Recipient, seconds: u32) -> TransportResult<()> {
        let command = to.apply(self.base("set_expiration")).field("expiration", seconds);
        self.command(command).await
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::foundation::event::MessageEvent;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every command instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl CommandSender for RecordingSender {
        async fn send_command(&self, command: Command) -> TransportResult<()> {
            self.sent.lock().push(serde_json::to_value(&command).unwrap());
            Ok(())
        }
    }

    fn event(group: Option<&str>) -> Event {
        Event::Message(MessageEvent {
            source: Address::number("+15550001111"),
            timestamp: 99,
            account: None,
            body: "ping".into(),
            group_id: group.map(String::from),
            expires_in_seconds: 0,
        })
    }

    #[tokio::test]
    async fn test_reply_goes_to_source() {
        let recorder = Arc::new(RecordingSender::default());
        let sender = MessageSender::new(recorder.clone(), Some("+1bot".into()));

        sender.reply(&event(None), "pong").await.unwrap();

        let sent = recorder.sent.lock();
        assert_eq!(
            sent[0],
            json!({
                "type": "send",
                "username": "+1bot",
                "recipientAddress": {"number": "+15550001111"},
                "messageBody": "pong",
            })
        );
    }

    #[tokio::test]
    async fn test_reply_in_group_with_quote() {
        let recorder = Arc::new(RecordingSender::default());
        let sender = MessageSender::new(recorder.clone(), None);

        sender.reply_with(&event(Some("grp")), "pong", true).await.unwrap();

        let sent = recorder.sent.lock();
        assert_eq!(sent[0]["recipientGroupId"], "grp");
        assert_eq!(sent[0]["quote"]["id"], 99);
        assert!(sent[0].get("username").is_none());
    }

    #[tokio::test]
    async fn test_receipts_and_reactions() {
        let recorder = Arc::new(RecordingSender::default());
        let sender = MessageSender::new(recorder.clone(), Some("+1bot".into()));
        let event = event(None);

        sender.mark_read(&event).await.unwrap();
        sender.react(&event, "👍").await.unwrap();
        sender.typing_started(&event).await.unwrap();

        let sent = recorder.sent.lock();
        assert_eq!(sent[0]["type"], "mark_read");
        assert_eq!(sent[0]["timestamps"], json!([99]));
        assert_eq!(sent[1]["reaction"]["targetSentTimestamp"], 99);
        assert_eq!(sent[2]["type"], "typing_started");
    }
}
