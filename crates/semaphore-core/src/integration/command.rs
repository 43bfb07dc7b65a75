//! Outbound commands.
//!
//! A [`Command`] is one JSON object written to the daemon as a single line.
//! Anything that can deliver such a line implements [`CommandSender`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::foundation::error::{TransportError, TransportResult};

/// A protocol command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    /// The command's `type` discriminant.
    #[serde(rename = "type")]
    pub command_type: String,
    /// Optional correlation id echoed back in the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Remaining fields, flattened into the object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Command {
    /// Creates a command with no fields.
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            id: None,
            fields: Map::new(),
        }
    }

    /// Sets a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets a field only when the value is present.
    pub fn field_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Sets the correlation id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Serializes the command into one line, without the trailing newline.
    pub fn to_line(&self) -> TransportResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// Delivers commands to the daemon.
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Sends one command.
    async fn send_command(&self, command: Command) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_serializes_flat() {
        let command = Command::new("subscribe")
            .field("username", "+1555")
            .field_opt("group", None::<String>)
            .with_id("42");
        let value: Value = serde_json::from_slice(&command.to_line().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe", "id": "42", "username": "+1555"})
        );
    }
}
