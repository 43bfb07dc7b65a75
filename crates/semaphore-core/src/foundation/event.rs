//! Event model.
//!
//! An [`Event`] is the decoded form of one protocol record received from the
//! daemon. Events are immutable once constructed and are shared between
//! handlers as `Arc<Event>`.
//!
//! # Kinds
//!
//! | Kind      | Payload          | Matched against patterns |
//! |-----------|------------------|--------------------------|
//! | `message` | [`MessageEvent`] | yes, on the body         |
//! | `receipt` | [`ReceiptEvent`] | no                       |
//! | `typing`  | [`TypingEvent`]  | no                       |
//! | `reply`   | [`ReplyEvent`]   | no                       |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Event Kind
// =============================================================================

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An incoming data message.
    Message,
    /// A delivery or read receipt.
    Receipt,
    /// A typing notification.
    Typing,
    /// A response to a command, or a daemon control record.
    Reply,
}

impl EventKind {
    /// Returns the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Receipt => "receipt",
            Self::Typing => "typing",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "receipt" => Ok(Self::Receipt),
            "typing" => Ok(Self::Typing),
            "reply" => Ok(Self::Reply),
            other => Err(format!("unknown event kind '{other}'")),
        }
    }
}

// =============================================================================
// Address
// =============================================================================

/// A Signal account address. At least one of the two fields is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// E.164 phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Account UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl Address {
    /// Creates an address from a phone number.
    pub fn number(number: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
            uuid: None,
        }
    }

    /// Creates an address from a UUID.
    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self {
            number: None,
            uuid: Some(uuid.into()),
        }
    }

    /// Stable identifier of the address: the number if known, else the UUID.
    pub fn id(&self) -> &str {
        self.number
            .as_deref()
            .or(self.uuid.as_deref())
            .unwrap_or_default()
    }

    /// Returns `true` if neither field is set.
    pub fn is_empty(&self) -> bool {
        self.number.is_none() && self.uuid.is_none()
    }

    /// Form suitable for logs: phone numbers keep only their last three digits.
    pub fn redacted(&self) -> String {
        match (&self.number, &self.uuid) {
            (Some(number), _) => {
                let tail: String = {
                    let chars: Vec<char> = number.chars().collect();
                    chars[chars.len().saturating_sub(3)..].iter().collect()
                };
                format!("+********{tail}")
            }
            (None, Some(uuid)) => uuid.clone(),
            (None, None) => String::from("<unknown>"),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// An incoming data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Sender of the message.
    pub source: Address,
    /// Envelope timestamp in milliseconds.
    pub timestamp: i64,
    /// Account that received the message, if reported.
    pub account: Option<String>,
    /// Message text. Empty when the message carries no body.
    pub body: String,
    /// Group the message was sent to, if any.
    pub group_id: Option<String>,
    /// Disappearing-message timer in seconds; zero when disabled.
    pub expires_in_seconds: u32,
}

/// Kind of receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptKind {
    Delivery,
    Read,
    Viewed,
    Unknown,
}

impl ReceiptKind {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "DELIVERY" => Self::Delivery,
            "READ" => Self::Read,
            "VIEWED" => Self::Viewed,
            _ => Self::Unknown,
        }
    }
}

/// A delivery, read or viewed receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptEvent {
    pub source: Address,
    pub timestamp: i64,
    pub account: Option<String>,
    pub kind: ReceiptKind,
    /// Timestamps of the messages being acknowledged.
    pub timestamps: Vec<i64>,
}

/// Typing state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingAction {
    Started,
    Stopped,
}

/// A typing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub source: Address,
    pub timestamp: i64,
    pub account: Option<String>,
    pub action: TypingAction,
    pub group_id: Option<String>,
}

/// A correlated command response or a daemon control record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEvent {
    /// The record's `type` field.
    pub reply_type: String,
    /// Correlation id; `None` for control records.
    pub id: Option<String>,
    /// The record's `data` field, or `Null` when absent.
    pub data: Value,
    /// The record's `error` field, if any.
    pub error: Option<Value>,
}

impl ReplyEvent {
    /// Returns `true` if the daemon reported an error.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }
}

// =============================================================================
// Event
// =============================================================================

/// One decoded protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    Receipt(ReceiptEvent),
    Typing(TypingEvent),
    Reply(ReplyEvent),
}

impl Event {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Receipt(_) => EventKind::Receipt,
            Self::Typing(_) => EventKind::Typing,
            Self::Reply(_) => EventKind::Reply,
        }
    }

    /// Originating address, absent for replies.
    pub fn source(&self) -> Option<&Address> {
        match self {
            Self::Message(m) => Some(&m.source),
            Self::Receipt(r) => Some(&r.source),
            Self::Typing(t) => Some(&t.source),
            Self::Reply(_) => None,
        }
    }

    /// Envelope timestamp in milliseconds, absent for replies.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Self::Message(m) => Some(m.timestamp),
            Self::Receipt(r) => Some(r.timestamp),
            Self::Typing(t) => Some(t.timestamp),
            Self::Reply(_) => None,
        }
    }

    /// Text that patterns are matched against. Only data messages have one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message(m) => Some(&m.body),
            _ => None,
        }
    }

    /// Group the event belongs to, if any.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Message(m) => m.group_id.as_deref(),
            Self::Typing(t) => t.group_id.as_deref(),
            _ => None,
        }
    }

    /// Returns the message payload if this is a data message.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the reply payload if this is a reply.
    pub fn as_reply(&self) -> Option<&ReplyEvent> {
        match self {
            Self::Reply(r) => Some(r),
            _ => None,
        }
    }

    /// A one-line description for logs. Never contains a full phone number.
    pub fn summary(&self) -> String {
        match self {
            Self::Message(m) => format!("message from {} ({} chars)", m.source, m.body.len()),
            Self::Receipt(r) => format!("{:?} receipt from {}", r.kind, r.source),
            Self::Typing(t) => format!("typing {:?} from {}", t.action, t.source),
            Self::Reply(r) => match &r.id {
                Some(id) => format!("reply '{}' to {id}", r.reply_type),
                None => format!("control record '{}'", r.reply_type),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> Event {
        Event::Message(MessageEvent {
            source: Address::number("+15551234567"),
            timestamp: 1,
            account: None,
            body: body.into(),
            group_id: Some("g1".into()),
            expires_in_seconds: 0,
        })
    }

    #[test]
    fn test_redacted_number_keeps_last_three_digits() {
        assert_eq!(Address::number("+15551234567").redacted(), "+********567");
        assert_eq!(Address::number("12").redacted(), "+********12");
        assert_eq!(Address::uuid("abc").redacted(), "abc");
        assert_eq!(Address::default().redacted(), "<unknown>");
    }

    #[test]
    fn test_address_id_prefers_number() {
        let address = Address {
            number: Some("+1".into()),
            uuid: Some("u".into()),
        };
        assert_eq!(address.id(), "+1");
        assert_eq!(Address::uuid("u").id(), "u");
        assert!(Address::default().is_empty());
    }

    #[test]
    fn test_event_accessors() {
        let event = message("hi");
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.text(), Some("hi"));
        assert_eq!(event.group_id(), Some("g1"));
        assert_eq!(event.timestamp(), Some(1));
        assert!(!event.summary().contains("1234567"));

        let reply = Event::Reply(ReplyEvent {
            reply_type: "version".into(),
            id: None,
            data: Value::Null,
            error: None,
        });
        assert_eq!(reply.kind(), EventKind::Reply);
        assert!(reply.text().is_none());
        assert!(reply.source().is_none());
    }

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("typing".parse::<EventKind>(), Ok(EventKind::Typing));
        assert!("other".parse::<EventKind>().is_err());
    }
}
