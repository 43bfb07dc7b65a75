//! Newline-delimited transport over any async byte stream.
//!
//! The read half is framed with [`AnyDelimiterCodec`] so that invalid UTF-8
//! reaches the decoder (and its error reporting) instead of failing the
//! connection. The write half is owned by a writer task fed through the
//! [`ConnectionHandle`]'s queue.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use semaphore_core::{
    BoxedSink, ConnectionHandle, ConnectionState, DecodeError, LineReader, RawLine, Severity,
    StateCell, TransportError, TransportResult, default_sink,
};

/// Longest accepted line. Longer lines are reported and skipped.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Capacity of the outbound queue.
const OUTBOUND_QUEUE: usize = 256;

fn newline_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH)
}

// =============================================================================
// Connection
// =============================================================================

/// Both halves of a line connection.
pub struct LineConnection<T> {
    /// Read side, to be wrapped in an `EventStream`.
    pub reader: SocketLineReader<T>,
    /// Write side.
    pub handle: ConnectionHandle,
}

impl<T> LineConnection<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps an already connected byte stream and spawns its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_io(id: impl Into<String>, io: T) -> Self {
        let id = id.into();
        let (read_half, write_half) = tokio::io::split(io);
        let (message_tx, message_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE);
        let state = StateCell::new();
        let shutdown = CancellationToken::new();

        state.advance(ConnectionState::Open);
        tokio::spawn(run_writer(
            write_half,
            message_rx,
            state.clone(),
            shutdown.clone(),
            id.clone(),
        ));

        let handle = ConnectionHandle::new(id, message_tx, state.clone(), shutdown.clone());
        let reader = SocketLineReader {
            frames: FramedRead::new(read_half, newline_codec()),
            state,
            shutdown,
            sink: default_sink(),
            resume_after_error: false,
        };
        Self { reader, handle }
    }

    pub fn into_parts(self) -> (SocketLineReader<T>, ConnectionHandle) {
        (self.reader, self.handle)
    }
}

/// Drains the outbound queue into the socket until shutdown or a write error.
async fn run_writer<T: AsyncWrite>(
    mut writer: WriteHalf<T>,
    mut message_rx: mpsc::Receiver<Vec<u8>>,
    state: StateCell,
    shutdown: CancellationToken,
    id: String,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!(connection = %id, "Writer shutting down");
                break;
            }

            message = message_rx.recv() => {
                let Some(mut line) = message else { break };
                line.push(b'\n');
                let written = async {
                    writer.write_all(&line).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!(connection = %id, error = %e, "Failed to write line");
                    break;
                }
                trace!(connection = %id, len = line.len(), "Line written");
            }
        }
    }

    let _ = writer.shutdown().await;
    shutdown.cancel();
    if state.advance(ConnectionState::Closed) {
        info!(connection = %id, "Connection closed");
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read half of a [`LineConnection`].
pub struct SocketLineReader<T> {
    frames: FramedRead<ReadHalf<T>, AnyDelimiterCodec>,
    state: StateCell,
    shutdown: CancellationToken,
    sink: BoxedSink,
    /// `FramedRead` yields a single `None` after a codec error; the
    /// connection itself is still open.
    resume_after_error: bool,
}

impl<T> SocketLineReader<T> {
    /// Sink receiving reports about discarded lines. Defaults to the
    /// tracing sink.
    pub fn with_sink(mut self, sink: BoxedSink) -> Self {
        self.sink = sink;
        self
    }

    fn close(&self) {
        self.shutdown.cancel();
        self.state.advance(ConnectionState::Closed);
    }
}

#[async_trait]
impl<T> LineReader for SocketLineReader<T>
where
    T: AsyncRead + Send,
{
    async fn read_line(&mut self) -> TransportResult<Option<RawLine>> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(None),
                frame = self.frames.next() => frame,
            };

            match frame {
                Some(Ok(bytes)) => {
                    let mut line = bytes.to_vec();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(RawLine::from(line)));
                }
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    self.resume_after_error = true;
                    self.sink.report(
                        Severity::Warning,
                        "dropping undecodable line",
                        &[(
                            "error",
                            DecodeError::LineTooLong {
                                max: MAX_LINE_LENGTH,
                            }
                            .to_string(),
                        )],
                    );
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => {
                    self.close();
                    return Err(TransportError::from(e));
                }
                None => {
                    if std::mem::take(&mut self.resume_after_error) {
                        trace!("Resuming after oversized line");
                        continue;
                    }
                    self.close();
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semaphore_core::{Command, CommandSender, EventStream, MemorySink};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    const HELLO: &str = r#"{"type":"IncomingMessage","data":{"source":{"number":"+1"},"timestamp":1,"data_message":{"body":"hello"}}}"#;

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let (head, tail) = HELLO.split_at(20);
        let mock = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(tail.as_bytes())
            .read(b"\r\n\n")
            .read(b"not json\n")
            .build();
        let (reader, _handle) = LineConnection::from_io("mock", mock).into_parts();
        let mut stream = EventStream::new(reader);

        assert_eq!(stream.next_event().await.unwrap().text(), Some("hello"));
        assert!(stream.next_event().await.unwrap_err().is_closed());
        assert_eq!(stream.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_commands_are_written_as_lines() {
        let (local, remote) = tokio::io::duplex(4096);
        let (_reader, handle) = LineConnection::from_io("duplex", local).into_parts();
        let mut daemon = BufReader::new(remote);

        handle
            .send_command(Command::new("subscribe").field("username", "+1bot"))
            .await
            .unwrap();
        handle.send_line(b"{\"type\":\"version\"}".to_vec()).await.unwrap();

        let mut first = String::new();
        daemon.read_line(&mut first).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["username"], "+1bot");

        let mut second = String::new();
        daemon.read_line(&mut second).await.unwrap();
        assert_eq!(second, "{\"type\":\"version\"}\n");
    }

    #[tokio::test]
    async fn test_peer_close_ends_stream_and_state() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let (reader, handle) = LineConnection::from_io("duplex", local).into_parts();
        let mut stream = EventStream::new(reader);

        remote.write_all(HELLO.as_bytes()).await.unwrap();
        remote.write_all(b"\n").await.unwrap();
        drop(remote);

        assert!(stream.next_event().await.is_ok());
        assert!(stream.next_event().await.unwrap_err().is_closed());
        handle.closed().await;
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.send_line(b"x".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_line_is_reported_and_skipped() {
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let sink = Arc::new(MemorySink::new());
        let (reader, _handle) = LineConnection::from_io("duplex", local).into_parts();
        let mut stream = EventStream::new(reader.with_sink(sink.clone()));

        let daemon = tokio::spawn(async move {
            remote.write_all(&vec![b'x'; MAX_LINE_LENGTH + 10]).await.unwrap();
            remote.write_all(b"\n").await.unwrap();
            remote.write_all(HELLO.as_bytes()).await.unwrap();
            remote.write_all(b"\n").await.unwrap();
            remote
        });

        assert_eq!(stream.next_event().await.unwrap().text(), Some("hello"));
        assert_eq!(sink.count(Severity::Warning), 1);
        assert!(sink.reports()[0].field("error").unwrap().contains("longer than"));

        // Peer still open: the stream is waiting, not closed.
        let _remote = daemon.await.unwrap();
        assert!(!stream.is_closed());
    }

    #[tokio::test]
    async fn test_handle_close_ends_reader() {
        let (local, _remote) = tokio::io::duplex(4096);
        let (reader, handle) = LineConnection::from_io("duplex", local).into_parts();
        let mut stream = EventStream::new(reader);

        handle.close();
        assert!(stream.next_event().await.unwrap_err().is_closed());
    }
}
