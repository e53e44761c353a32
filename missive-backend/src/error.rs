//! Typed backend errors, mapped to IMAP responses by the session engine.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Mailbox is read-only")]
    ReadOnly,

    #[error("Storage quota exceeded")]
    OverQuota,

    #[error("Invalid name: {0}")]
    BadName(String),

    #[error("Backend is closed")]
    Closed,

    /// A failure that did not change any state. `reproducible` means the
    /// same call will keep failing (a bug or bad data, not load or a
    /// network blip) and is surfaced as `[SERVERBUG]`.
    #[error("Transient backend failure: {reason}")]
    Transient { reason: String, reproducible: bool },
}

pub type StoreResult<T> = Result<T, StoreError>;
