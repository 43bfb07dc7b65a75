//! Protocol decoding.
//!
//! Turns one raw line into an [`Event`]. Supported records:
//!
//! - `IncomingMessage`: the daemon's v1 envelope, carrying exactly one of
//!   `data_message`, `receipt_message` or `typing_message`
//! - `message`: the legacy envelope
//! - any other type with an `id`: a correlated reply
//! - daemon control records (`version`, `subscribed`, ...): replies without id

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::foundation::error::{DecodeError, DecodeResult};
use crate::foundation::event::{
    Address, Event, MessageEvent, ReceiptEvent, ReceiptKind, ReplyEvent, TypingAction, TypingEvent,
};

const INCOMING_MESSAGE: &str = "IncomingMessage";
const LEGACY_MESSAGE: &str = "message";

/// Records the daemon emits without a correlation id.
const CONTROL_TYPES: &[&str] = &[
    "version",
    "subscribed",
    "unsubscribed",
    "listen_started",
    "listen_stopped",
    "ListenerState",
    "WebSocketConnectionState",
];

// =============================================================================
// Wire Shapes
// =============================================================================

#[derive(Deserialize)]
struct IncomingMessage {
    account: Option<String>,
    source: Option<Address>,
    timestamp: Option<i64>,
    data_message: Option<WireDataMessage>,
    receipt_message: Option<WireReceipt>,
    typing_message: Option<WireTyping>,
}

#[derive(Deserialize)]
struct WireDataMessage {
    #[serde(default)]
    body: Option<String>,
    #[serde(rename = "groupV2")]
    group_v2: Option<WireGroupV2>,
    group: Option<WireGroupV1>,
    #[serde(rename = "expiresInSeconds", default)]
    expires_in_seconds: u32,
}

#[derive(Deserialize)]
struct WireGroupV2 {
    id: String,
}

#[derive(Deserialize)]
struct WireGroupV1 {
    #[serde(rename = "groupId")]
    group_id: String,
}

#[derive(Deserialize)]
struct WireReceipt {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    timestamps: Vec<i64>,
}

#[derive(Deserialize)]
struct WireTyping {
    action: Option<String>,
    timestamp: Option<i64>,
    group_id: Option<String>,
}

// =============================================================================
// Entry Point
// =============================================================================

/// Decodes one line into an event.
pub fn decode_line(line: &[u8]) -> DecodeResult<Event> {
    let value: Value =
        serde_json::from_slice(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(mut record) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let record_type = match record.get("type") {
        Some(Value::String(t)) => t.clone(),
        _ => return Err(DecodeError::MissingType),
    };

    match record_type.as_str() {
        INCOMING_MESSAGE => decode_incoming(record),
        LEGACY_MESSAGE => decode_legacy(record),
        _ => {
            let id = match record.get("id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            if id.is_none() && !CONTROL_TYPES.contains(&record_type.as_str()) {
                return Err(DecodeError::UnknownType(record_type));
            }
            Ok(Event::Reply(ReplyEvent {
                reply_type: record_type,
                id,
                data: record.remove("data").unwrap_or(Value::Null),
                error: record.remove("error"),
            }))
        }
    }
}

// =============================================================================
// v1 Envelope
// =============================================================================

fn decode_incoming(mut record: Map<String, Value>) -> DecodeResult<Event> {
    let data = record
        .remove("data")
        .ok_or_else(|| DecodeError::missing(INCOMING_MESSAGE, "data"))?;
    let message: IncomingMessage = serde_json::from_value(data)
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let source = message
        .source
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DecodeError::missing(INCOMING_MESSAGE, "data.source"))?;
    let timestamp = message
        .timestamp
        .ok_or_else(|| DecodeError::missing(INCOMING_MESSAGE, "data.timestamp"))?;
    let account = message.account;

    if let Some(data_message) = message.data_message {
        let group_id = data_message
            .group_v2
            .map(|g| g.id)
            .or(data_message.group.map(|g| g.group_id));
        return Ok(Event::Message(MessageEvent {
            source,
            timestamp,
            account,
            body: data_message.body.unwrap_or_default(),
            group_id,
            expires_in_seconds: data_message.expires_in_seconds,
        }));
    }

    if let Some(receipt) = message.receipt_message {
        return Ok(Event::Receipt(ReceiptEvent {
            source,
            timestamp,
            account,
            kind: receipt
                .kind
                .as_deref()
                .map(ReceiptKind::parse)
                .unwrap_or(ReceiptKind::Unknown),
            timestamps: receipt.timestamps,
        }));
    }

    if let Some(typing) = message.typing_message {
        let action = match typing.action.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("STARTED") => TypingAction::Started,
            Some("STOPPED") => TypingAction::Stopped,
            _ => {
                return Err(DecodeError::missing(
                    INCOMING_MESSAGE,
                    "data.typing_message.action",
                ));
            }
        };
        return Ok(Event::Typing(TypingEvent {
            source,
            timestamp: typing.timestamp.unwrap_or(timestamp),
            account,
            action,
            group_id: typing.group_id,
        }));
    }

    Err(DecodeError::missing(INCOMING_MESSAGE, "data.data_message"))
}

// =============================================================================
// Legacy Envelope
// =============================================================================

fn legacy_source(value: Option<&Value>) -> Option<Address> {
    match value? {
        Value::String(number) if !number.is_empty() => Some(Address::number(number.clone())),
        Value::Object(_) => serde_json::from_value::<Address>(value?.clone())
            .ok()
            .filter(|a| !a.is_empty()),
        _ => None,
    }
}

fn decode_legacy(mut record: Map<String, Value>) -> DecodeResult<Event> {
    let Some(Value::Object(data)) = record.remove("data") else {
        return Err(DecodeError::missing(LEGACY_MESSAGE, "data"));
    };
    let source = legacy_source(data.get("source"))
        .ok_or_else(|| DecodeError::missing(LEGACY_MESSAGE, "data.source"))?;
    let timestamp = data
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| DecodeError::missing(LEGACY_MESSAGE, "data.timestamp"))?;
    let account = data
        .get("username")
        .and_then(Value::as_str)
        .map(String::from);

    if data.get("isReceipt").and_then(Value::as_bool) == Some(true) {
        return Ok(Event::Receipt(ReceiptEvent {
            source,
            timestamp,
            account,
            kind: ReceiptKind::Delivery,
            timestamps: vec![timestamp],
        }));
    }

    if let Some(typing) = data.get("typing").and_then(Value::as_object) {
        let action = match typing.get("action").and_then(Value::as_str) {
            Some(a) if a.eq_ignore_ascii_case("STARTED") => TypingAction::Started,
            Some(a) if a.eq_ignore_ascii_case("STOPPED") => TypingAction::Stopped,
            _ => return Err(DecodeError::missing(LEGACY_MESSAGE, "data.typing.action")),
        };
        return Ok(Event::Typing(TypingEvent {
            source,
            timestamp,
            account,
            action,
            group_id: typing
                .get("groupId")
                .and_then(Value::as_str)
                .map(String::from),
        }));
    }

    let message = data
        .get("dataMessage")
        .and_then(Value::as_object)
        .ok_or_else(|| DecodeError::missing(LEGACY_MESSAGE, "data.dataMessage"))?;
    Ok(Event::Message(MessageEvent {
        source,
        timestamp,
        account,
        body: message
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        group_id: message
            .get("groupInfo")
            .and_then(|g| g.get("groupId"))
            .and_then(Value::as_str)
            .map(String::from),
        expires_in_seconds: message
            .get("expiresInSeconds")
            .and_then(Value::as_u64)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::event::EventKind;

    #[test]
    fn test_incoming_data_message() {
        let line = br#"{"type":"IncomingMessage","data":{"account":"+1bot","source":{"number":"+15551234567","uuid":"u-1"},"timestamp":1700000000000,"data_message":{"body":"hello","timestamp":1700000000000,"groupV2":{"id":"grp=="},"expiresInSeconds":60}}}"#;
        let Event::Message(message) = decode_line(line).unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(message.body, "hello");
        assert_eq!(message.source.number.as_deref(), Some("+15551234567"));
        assert_eq!(message.group_id.as_deref(), Some("grp=="));
        assert_eq!(message.account.as_deref(), Some("+1bot"));
        assert_eq!(message.expires_in_seconds, 60);
    }

    #[test]
    fn test_incoming_message_without_body() {
        let line = br#"{"type":"IncomingMessage","data":{"source":{"uuid":"u-1"},"timestamp":5,"data_message":{"timestamp":5}}}"#;
        let event = decode_line(line).unwrap();
        assert_eq!(event.text(), Some(""));
    }

    #[test]
    fn test_incoming_receipt_and_typing() {
        let receipt = br#"{"type":"IncomingMessage","data":{"source":{"number":"+1"},"timestamp":7,"receipt_message":{"type":"READ","timestamps":[1,2]}}}"#;
        let Event::Receipt(receipt) = decode_line(receipt).unwrap() else {
            panic!("expected a receipt");
        };
        assert_eq!(receipt.kind, ReceiptKind::Read);
        assert_eq!(receipt.timestamps, vec![1, 2]);

        let typing = br#"{"type":"IncomingMessage","data":{"source":{"number":"+1"},"timestamp":7,"typing_message":{"action":"STARTED","timestamp":8}}}"#;
        let Event::Typing(typing) = decode_line(typing).unwrap() else {
            panic!("expected typing");
        };
        assert_eq!(typing.action, TypingAction::Started);
        assert_eq!(typing.timestamp, 8);
    }

    #[test]
    fn test_legacy_message() {
        let line = br#"{"type":"message","data":{"username":"+1bot","source":"+15550001111","timestamp":3,"dataMessage":{"body":"hi there"}}}"#;
        let event = decode_line(line).unwrap();
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.text(), Some("hi there"));
        assert_eq!(event.source().unwrap().id(), "+15550001111");

        let receipt = br#"{"type":"message","data":{"source":{"number":"+1"},"timestamp":3,"isReceipt":true}}"#;
        assert_eq!(decode_line(receipt).unwrap().kind(), EventKind::Receipt);
    }

    #[test]
    fn test_replies_and_control_records() {
        let reply = br#"{"type":"send","id":"abc","data":{"results":[]}}"#;
        let Event::Reply(reply) = decode_line(reply).unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.id.as_deref(), Some("abc"));
        assert!(!reply.is_error());

        let version = br#"{"type":"version","data":{"name":"signald"}}"#;
        let Event::Reply(version) = decode_line(version).unwrap() else {
            panic!("expected a control record");
        };
        assert_eq!(version.id, None);
        assert_eq!(version.data["name"], "signald");

        let failed = br#"{"type":"send","id":7,"error":{"message":"no"}}"#;
        assert!(decode_line(failed).unwrap().as_reply().unwrap().is_error());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_line(b"not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(decode_line(b"[1,2]"), Err(DecodeError::NotAnObject));
        assert_eq!(decode_line(br#"{"data":{}}"#), Err(DecodeError::MissingType));
        assert_eq!(
            decode_line(br#"{"type":"mystery"}"#),
            Err(DecodeError::UnknownType("mystery".into()))
        );
        assert_eq!(
            decode_line(br#"{"type":"IncomingMessage","data":{"timestamp":1,"data_message":{}}}"#),
            Err(DecodeError::missing(INCOMING_MESSAGE, "data.source"))
        );
        assert_eq!(
            decode_line(
                br#"{"type":"IncomingMessage","data":{"source":{"number":"+1"},"timestamp":1,"sync_message":{}}}"#
            ),
            Err(DecodeError::missing(INCOMING_MESSAGE, "data.data_message"))
        );
    }
}
