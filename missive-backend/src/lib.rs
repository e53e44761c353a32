//! The mailbox backend contract and the in-memory reference backend.
//!
//! The session engine only ever talks to [`MailStore`] and
//! [`MailboxHandle`] trait objects; everything behind them (storage,
//! serialization, replication) is a backend concern.

pub mod error;
pub mod login;
pub mod memory;
pub mod uidindex;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

pub use crate::error::{StoreError, StoreResult};
pub use crate::uidindex::{Flag, ImapUid, ImapUidvalidity, UidIndex};

/// What a message load should bring back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    /// Index data only (flags live in the [`UidIndex`] snapshot).
    Index,
    /// Metadata and the header section.
    Partial,
    /// Everything, content included.
    Full,
}

/// A loaded message (or the requested part of it).
#[derive(Debug, Clone)]
pub struct MessageData {
    pub internaldate: DateTime<Utc>,
    pub rfc822_size: usize,
    pub headers: Vec<u8>,
    /// `None` unless [`QueryScope::Full`] was requested.
    pub content: Option<Vec<u8>>,
}

/// A state change committed to a mailbox, broadcast to every session
/// subscribed to it. Delivery is at-least-once and in commit order.
#[derive(Debug, Clone)]
pub enum MailboxEvent {
    /// A new message exists. `recent` is a hint that the message still
    /// carried `\Recent` when committed.
    Exists { uid: ImapUid, recent: bool },
    /// The message was expunged.
    Expunged { uid: ImapUid },
    /// The message's flags changed.
    Flags { uid: ImapUid, flags: Vec<Flag> },
}

/// One user's mail storage.
#[async_trait]
pub trait MailStore: Send + Sync {
    fn username(&self) -> &str;

    async fn list_mailboxes(&self) -> StoreResult<Vec<String>>;
    async fn has_mailbox(&self, name: &str) -> StoreResult<bool>;
    async fn create_mailbox(&self, name: &str) -> StoreResult<()>;
    async fn delete_mailbox(&self, name: &str) -> StoreResult<()>;
    async fn rename_mailbox(&self, from: &str, to: &str) -> StoreResult<()>;

    async fn subscribe(&self, name: &str) -> StoreResult<()>;
    async fn unsubscribe(&self, name: &str) -> StoreResult<()>;
    async fn subscriptions(&self) -> StoreResult<Vec<String>>;

    async fn open_mailbox(&self, name: &str) -> StoreResult<Option<Arc<dyn MailboxHandle>>>;

    /// Copy one message, allocating a fresh UID in the destination.
    async fn copy_message(
        &self,
        source: &str,
        uid: ImapUid,
        dest: &str,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)>;

    /// Move one message; the source copy is expunged.
    async fn move_message(
        &self,
        source: &str,
        uid: ImapUid,
        dest: &str,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)>;
}

/// One mailbox of one user, shared by every session that selected it.
#[async_trait]
pub trait MailboxHandle: Send + Sync {
    fn name(&self) -> String;

    /// Current committed index state, cheap to clone.
    async fn snapshot(&self) -> UidIndex;

    /// Subscribe to the mailbox's change stream.
    fn watch(&self) -> broadcast::Receiver<MailboxEvent>;

    /// Take the pending `\Recent` set. The caller becomes the one session
    /// that reports these messages as recent.
    async fn claim_recent(&self) -> Vec<ImapUid>;

    /// Peek at the pending `\Recent` set without claiming it (STATUS).
    async fn pending_recent(&self) -> u32;

    async fn append(
        &self,
        flags: Vec<Flag>,
        internaldate: Option<DateTime<Utc>>,
        body: Vec<u8>,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)>;

    async fn load(&self, uid: ImapUid, scope: QueryScope) -> StoreResult<Option<MessageData>>;

    /// Flag mutations return the resulting flag set, or `None` when the
    /// message was expunged meanwhile (the update is silently dropped).
    async fn add_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>>;
    async fn del_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>>;
    async fn set_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>>;

    /// Remove the given messages, returning the UIDs actually removed.
    async fn expunge(&self, uids: Vec<ImapUid>) -> StoreResult<Vec<ImapUid>>;
}

/// Hook applied to every appended or delivered message. The default is
/// the identity; a deployment can rewrite flags or redirect the target
/// mailbox here.
#[async_trait]
pub trait DeliverFilter: Send + Sync {
    async fn apply(
        &self,
        mailbox: String,
        flags: Vec<Flag>,
        body: &[u8],
    ) -> (String, Vec<Flag>);
}

pub struct IdentityFilter;

#[async_trait]
impl DeliverFilter for IdentityFilter {
    async fn apply(
        &self,
        mailbox: String,
        flags: Vec<Flag>,
        _body: &[u8],
    ) -> (String, Vec<Flag>) {
        (mailbox, flags)
    }
}

/// Credential verification, yielding the user's store.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// LOGIN and AUTH=PLAIN end up here.
    async fn login(&self, username: &str, password: &str) -> StoreResult<Arc<dyn MailStore>>;

    /// AUTH=EXTERNAL and pre-authenticated listeners: the identity was
    /// established out of band.
    async fn assume(&self, username: &str) -> StoreResult<Arc<dyn MailStore>>;
}

pub type ArcLoginProvider = Arc<dyn LoginProvider>;

/// The hierarchy separator every backend of this server uses.
pub const MAILBOX_HIERARCHY_DELIMITER: char = '/';
