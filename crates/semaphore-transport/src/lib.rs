//! # Semaphore Transport
//!
//! Line transport for the Semaphore bot framework. The daemon speaks
//! newline-delimited JSON over a Unix domain socket; this crate turns any
//! async byte stream into the core's [`LineReader`] plus a
//! [`ConnectionHandle`] for writing.
//!
//! ```rust,ignore
//! use semaphore_core::EventStream;
//! use semaphore_transport::connect_unix;
//!
//! let (reader, handle) = connect_unix("/var/run/signald/signald.sock").await?.into_parts();
//! let mut events = EventStream::new(reader);
//! while let Ok(event) = events.next_event().await {
//!     println!("{}", event.summary());
//! }
//! ```
//!
//! [`LineReader`]: semaphore_core::LineReader
//! [`ConnectionHandle`]: semaphore_core::ConnectionHandle

pub mod line;
#[cfg(unix)]
pub mod unix;

pub use line::{LineConnection, MAX_LINE_LENGTH, SocketLineReader};
#[cfg(unix)]
pub use unix::{DEFAULT_SOCKET_PATH, connect_unix};
