//! Unix domain socket transport.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::info;

use semaphore_core::{TransportError, TransportResult};

use crate::line::LineConnection;

/// Where the daemon listens unless configured otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/signald/signald.sock";

/// Connects to the daemon's Unix socket.
pub async fn connect_unix(path: impl AsRef<Path>) -> TransportResult<LineConnection<UnixStream>> {
    let path = path.as_ref();
    let target = path.display().to_string();

    info!(socket = %target, "Connecting to daemon");
    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| TransportError::ConnectionFailed {
            target: target.clone(),
            reason: e.to_string(),
        })?;
    info!(socket = %target, "Connected to daemon");

    Ok(LineConnection::from_io(target, stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semaphore_core::{CommandSender, EventStream, MessageSender};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    fn socket_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("semaphore-{}-{name}.sock", std::process::id()))
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let error = connect_unix(socket_path("missing")).await.err().unwrap();
        assert!(matches!(error, TransportError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_round_trip_over_unix_socket() {
        let path = socket_path("round-trip");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let daemon = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            let subscribe = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"{\"type\":\"subscribed\"}\n")
                .await
                .unwrap();
            subscribe
        });

        let (reader, handle) = connect_unix(&path).await.unwrap().into_parts();
        let transport: Arc<dyn CommandSender> = Arc::new(handle);
        MessageSender::new(transport, Some("+1bot".into()))
            .subscribe()
            .await
            .unwrap();

        let mut stream = EventStream::new(reader);
        let event = stream.next_event().await.unwrap();
        assert_eq!(event.as_reply().unwrap().reply_type, "subscribed");

        let subscribe: serde_json::Value =
            serde_json::from_str(&daemon.await.unwrap()).unwrap();
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["username"], "+1bot");

        let _ = std::fs::remove_file(&path);
    }
}
