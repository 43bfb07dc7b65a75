//! Foundation types shared by every layer: errors, events and the
//! observability sink.

pub mod error;
pub mod event;
pub mod observe;
