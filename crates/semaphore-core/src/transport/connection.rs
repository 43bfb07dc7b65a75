//! Connection state and the outbound connection handle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::foundation::error::{TransportError, TransportResult};
use crate::integration::command::{Command, CommandSender};

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a connection. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Shared, forward-only connection state.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    /// Creates a cell in the `Connecting` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Connecting);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Moves to `next` unless the state is already at or past it. Returns
    /// `true` if the state changed.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Waits until the state is `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Handle to the write side of a connection.
///
/// Lines queued through [`send_line`](Self::send_line) are written in order
/// by the transport's writer task, each followed by a newline.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Identifier for logs, usually the socket path.
    pub id: String,
    message_tx: mpsc::Sender<Vec<u8>>,
    state: StateCell,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a new connection handle.
    pub fn new(
        id: impl Into<String>,
        message_tx: mpsc::Sender<Vec<u8>>,
        state: StateCell,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            message_tx,
            state,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Queues one line (without its trailing newline).
    pub async fn send_line(&self, line: Vec<u8>) -> TransportResult<()> {
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::closed("connection is closed"));
        }
        self.message_tx
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Queues a JSON value as one line.
    pub async fn send_json(&self, value: &Value) -> TransportResult<()> {
        let data = serde_json::to_vec(value)
            .map_err(|e| TransportError::SendFailed(format!("JSON serialization failed: {e}")))?;
        self.send_line(data).await
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.state.advance(ConnectionState::Closed);
    }

    /// Waits until the connection is closed from either side.
    pub async fn closed(&self) {
        self.state.closed().await;
    }
}

#[async_trait]
impl CommandSender for ConnectionHandle {
    async fn send_command(&self, command: Command) -> TransportResult<()> {
        self.send_line(command.to_line()?).await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_only_moves_forward() {
        let state = StateCell::new();
        assert!(state.advance(ConnectionState::Open));
        assert!(!state.advance(ConnectionState::Connecting));
        assert!(state.advance(ConnectionState::Closed));
        assert!(!state.advance(ConnectionState::Open));
        assert_eq!(state.get(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new("test", tx, StateCell::new(), CancellationToken::new());

        handle
            .send_command(Command::new("version"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), br#"{"type":"version"}"#.to_vec());

        handle.close();
        handle.close();
        handle.closed().await;
        assert!(handle.send_line(b"x".to_vec()).await.unwrap_err().is_closed());
    }
}
