//! # Session
//!
//! Bidirectional collaboration sessions.
//!
//! Each session is owned by one actor task that holds the participant set and
//! the chat history; participants talk to it over a command queue. Every
//! participant gets a bounded `Mailbox`: system notices and heartbeats never
//! block, chat messages are never dropped and push back on their sender.

mod actor;
mod error;
mod mailbox;
mod multiplexer;
mod registry;

pub use error::SessionError;
pub use mailbox::{Mailbox, MailboxClosed, PushOutcome};
pub use multiplexer::SessionMultiplexer;
