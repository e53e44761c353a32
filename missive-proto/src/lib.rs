//! The IMAP session engine: per-connection protocol state machine,
//! selected-mailbox view, and the listener that feeds them.

pub mod deflate;
pub mod imap;
pub mod proxy;
pub mod stream;
