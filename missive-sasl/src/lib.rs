//! Server-side SASL exchange for IMAP AUTHENTICATE.
//!
//! The wire framing (base64 lines, `*` abort, SASL-IR) belongs to the IMAP
//! layer; this crate owns the mechanism state machines and the PLAIN
//! message syntax (RFC 4616).

pub mod decode;
pub mod flow;
pub mod types;

pub use flow::{AuthRes, State};
pub use types::{Credentials, Mechanism};
