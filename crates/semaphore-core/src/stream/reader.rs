//! Event stream reader.
//!
//! [`EventStream`] pulls lines from a [`LineReader`], decodes them and yields
//! events in arrival order. Lines that fail to decode are reported to the
//! observability sink and skipped. When the transport ends or fails, the
//! stream yields a connection-closed error once and stays closed.

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::foundation::error::TransportError;
use crate::foundation::event::Event;
use crate::foundation::observe::{BoxedSink, Severity, default_sink};
use crate::stream::decode::decode_line;
use crate::transport::LineReader;

/// Characters of an undecodable line kept in its report.
const PREVIEW_CHARS: usize = 200;

/// Lazy sequence of events read from a transport.
pub struct EventStream<R> {
    reader: Option<R>,
    sink: BoxedSink,
    cancel: CancellationToken,
    closed_reason: Option<String>,
    decoded: u64,
    dropped: u64,
}

impl<R: LineReader> EventStream<R> {
    /// Creates a stream reporting to the default tracing sink.
    pub fn new(reader: R) -> Self {
        Self::with_sink(reader, default_sink())
    }

    /// Creates a stream reporting to `sink`.
    pub fn with_sink(reader: R, sink: BoxedSink) -> Self {
        Self {
            reader: Some(reader),
            sink,
            cancel: CancellationToken::new(),
            closed_reason: None,
            decoded: 0,
            dropped: 0,
        }
    }

    /// Token that closes the stream from elsewhere when cancelled. A pending
    /// [`next_event`](Self::next_event) returns promptly.
    pub fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of events decoded so far.
    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    /// Number of lines dropped because they could not be decoded.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Releases the transport. Later reads fail with connection-closed.
    /// Idempotent.
    pub fn close(&mut self) {
        self.finish("stream closed by host");
    }

    fn finish(&mut self, reason: &str) {
        if self.reader.take().is_some() {
            debug!(reason, decoded = self.decoded, dropped = self.dropped, "Event stream closed");
            self.closed_reason = Some(reason.to_string());
        }
    }

    fn closed_error(&self) -> TransportError {
        TransportError::closed(
            self.closed_reason
                .as_deref()
                .unwrap_or("stream closed by host"),
        )
    }

    /// Waits for the next decodable event.
    ///
    /// Returns `Err` with a connection-closed error once the transport has
    /// ended, failed or the stream was closed; every later call returns the
    /// same kind of error.
    pub async fn next_event(&mut self) -> Result<Event, TransportError> {
        let cancel = self.cancel.clone();
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Err(self.closed_error());
            };

            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.finish("stream closed by host");
                    return Err(self.closed_error());
                }
                line = reader.read_line() => line,
            };

            let raw = match line {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.finish("daemon closed the connection");
                    return Err(self.closed_error());
                }
                Err(error) => {
                    self.finish(&error.to_string());
                    return Err(self.closed_error());
                }
            };

            match decode_line(raw.as_bytes()) {
                Ok(event) => {
                    self.decoded += 1;
                    trace!(kind = %event.kind(), "Decoded event");
                    return Ok(event);
                }
                Err(error) => {
                    self.dropped += 1;
                    self.sink.report(
                        Severity::Warning,
                        "dropping undecodable line",
                        &[
                            ("error", error.to_string()),
                            ("line", raw.preview(PREVIEW_CHARS)),
                        ],
                    );
                }
            }
        }
    }

    /// Adapts the reader into a [`Stream`]. Yields events, then the terminal
    /// error once, then ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<Event, TransportError>> + Send
    where
        R: 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_event().await {
                Ok(event) => Some((Ok(event), Some(stream))),
                Err(error) => Some((Err(error), None)),
            }
        })
    }
}

impl<R> std::fmt::Debug for EventStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("open", &self.reader.is_some())
            .field("decoded", &self.decoded)
            .field("dropped", &self.dropped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::TransportResult;
    use crate::foundation::event::EventKind;
    use crate::foundation::observe::MemorySink;
    use crate::transport::RawLine;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays scripted reads, then reports end of input.
    struct Scripted {
        reads: VecDeque<TransportResult<Option<RawLine>>>,
        pending_at_end: bool,
    }

    impl Scripted {
        fn lines(lines: &[&str]) -> Self {
            Self {
                reads: lines.iter().map(|l| Ok(Some(RawLine::from(*l)))).collect(),
                pending_at_end: false,
            }
        }
    }

    #[async_trait]
    impl LineReader for Scripted {
        async fn read_line(&mut self) -> TransportResult<Option<RawLine>> {
            match self.reads.pop_front() {
                Some(read) => read,
                None if self.pending_at_end => std::future::pending().await,
                None => Ok(None),
            }
        }
    }

    fn message_line(body: &str) -> String {
        format!(
            r#"{{"type":"IncomingMessage","data":{{"source":{{"number":"+1"}},"timestamp":1,"data_message":{{"body":"{body}"}}}}}}"#
        )
    }

    #[tokio::test]
    async fn test_valid_and_malformed_lines() {
        let good: Vec<String> = (0..5).map(|i| message_line(&format!("m{i}"))).collect();
        let lines = [
            good[0].as_str(),
            "garbage",
            good[1].as_str(),
            good[2].as_str(),
            r#"{"type":"mystery"}"#,
            "[]",
            good[3].as_str(),
            good[4].as_str(),
        ];
        let sink = Arc::new(MemorySink::new());
        let mut stream = EventStream::with_sink(Scripted::lines(&lines), sink.clone());

        let mut bodies = Vec::new();
        let error = loop {
            match stream.next_event().await {
                Ok(event) => bodies.push(event.text().unwrap().to_string()),
                Err(error) => break error,
            }
        };

        assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(error.is_closed());
        assert_eq!(stream.decoded_count(), 5);
        assert_eq!(stream.dropped_count(), 3);
        assert_eq!(sink.count(Severity::Warning), 3);
        assert_eq!(sink.reports()[0].field("line"), Some("garbage"));
    }

    #[tokio::test]
    async fn test_closed_is_sticky() {
        let mut stream = EventStream::new(Scripted::lines(&[]));
        assert!(stream.next_event().await.unwrap_err().is_closed());
        assert!(stream.next_event().await.unwrap_err().is_closed());
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let mut reader = Scripted::lines(&[message_line("a").as_str()]);
        reader
            .reads
            .push_back(Err(TransportError::Io("connection reset".into())));
        reader.reads.push_back(Ok(Some(RawLine::from(message_line("b").as_str()))));
        let mut stream = EventStream::new(reader);

        assert_eq!(stream.next_event().await.unwrap().kind(), EventKind::Message);
        let error = stream.next_event().await.unwrap_err();
        assert!(error.is_closed());
        assert!(error.to_string().contains("connection reset"));
        assert!(stream.next_event().await.is_err());
    }

    #[tokio::test]
    async fn test_close_token_interrupts_pending_read() {
        let mut reader = Scripted::lines(&[]);
        reader.pending_at_end = true;
        let mut stream = EventStream::new(reader);
        let token = stream.close_token();

        let pending = tokio::spawn(async move { stream.next_event().await });
        tokio::task::yield_now().await;
        token.cancel();

        assert!(pending.await.unwrap().unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_into_stream_yields_error_once() {
        let line = message_line("x");
        let stream = EventStream::new(Scripted::lines(&[line.as_str(), "bad"]));
        let items: Vec<_> = stream.into_stream().collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_close_releases_reader() {
        let mut stream = EventStream::new(Scripted::lines(&[message_line("x").as_str()]));
        stream.close();
        stream.close();
        assert!(stream.next_event().await.is_err());
    }
}
