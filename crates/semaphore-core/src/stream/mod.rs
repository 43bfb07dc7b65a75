//! Event stream: decoding and the reader that turns transport lines into
//! events.

pub mod decode;
pub mod reader;

pub use decode::decode_line;
pub use reader::EventStream;
