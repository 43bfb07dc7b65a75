//! Outbound side: commands written back to the daemon.

pub mod command;
pub mod sender;

pub use command::{Command, CommandSender};
pub use sender::{MessageSender, Recipient};
