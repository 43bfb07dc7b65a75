//! Transport abstraction.
//!
//! The core never touches sockets. It reads through a [`LineReader`] and writes
//! through a [`ConnectionHandle`]; the `semaphore-transport` crate provides
//! both for Unix sockets and arbitrary async IO.

use std::fmt;

use async_trait::async_trait;

use crate::foundation::error::TransportResult;

pub mod connection;

pub use connection::{ConnectionHandle, ConnectionState, StateCell};

/// One newline-delimited frame as received, without the delimiter.
#[derive(Clone, PartialEq, Eq)]
pub struct RawLine(Vec<u8>);

impl RawLine {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy text preview for logs, cut at `max` characters.
    pub fn preview(&self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.0);
        match text.char_indices().nth(max) {
            Some((cut, _)) => format!("{}…", &text[..cut]),
            None => text.into_owned(),
        }
    }
}

impl From<Vec<u8>> for RawLine {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RawLine {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawLine").field(&self.preview(64)).finish()
    }
}

/// Source of raw lines.
///
/// `Ok(None)` means the peer closed the connection cleanly. Any `Err` is
/// terminal as well.
#[async_trait]
pub trait LineReader: Send {
    async fn read_line(&mut self) -> TransportResult<Option<RawLine>>;
}

#[async_trait]
impl<R: LineReader + ?Sized> LineReader for Box<R> {
    async fn read_line(&mut self) -> TransportResult<Option<RawLine>> {
        (**self).read_line().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let line = RawLine::from("héllo world");
        assert_eq!(line.preview(5), "héllo…");
        assert_eq!(line.preview(100), "héllo world");
        assert_eq!(RawLine::from(vec![0xff, b'a']).preview(10), "\u{fffd}a");
    }
}
