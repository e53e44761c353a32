//! The in-memory backend: a dictionary of mailboxes per account.
//!
//! Useful on its own for development (`--dev`) and as the reference
//! implementation of the backend contract the tests run against.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use im::{OrdMap, OrdSet};
use tokio::sync::{broadcast, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::uidindex::{Flag, ImapUid, ImapUidvalidity, UidIndex};
use crate::{
    MailStore, MailboxEvent, MailboxHandle, MessageData, QueryScope,
    MAILBOX_HIERARCHY_DELIMITER,
};

const EVENT_BUFFER: usize = 128;

pub struct MemoryAccount {
    username: String,
    uidvalidity_gen: AtomicU32,
    inner: RwLock<AccountState>,
}

struct AccountState {
    mailboxes: HashMap<String, Arc<MemoryMailbox>>,
    subscriptions: BTreeSet<String>,
}

impl MemoryAccount {
    pub fn new(username: &str) -> Arc<Self> {
        let account = Arc::new(Self {
            username: username.to_string(),
            uidvalidity_gen: AtomicU32::new(1),
            inner: RwLock::new(AccountState {
                mailboxes: HashMap::new(),
                subscriptions: BTreeSet::from(["INBOX".to_string()]),
            }),
        });

        // INBOX always exists.
        let inbox = MemoryMailbox::new("INBOX", account.next_uidvalidity());
        account
            .inner
            .try_write()
            .expect("account is not shared yet")
            .mailboxes
            .insert("INBOX".to_string(), inbox);

        account
    }

    /// Monotone per account, so a deleted-then-recreated mailbox never
    /// reuses a UIDVALIDITY.
    fn next_uidvalidity(&self) -> ImapUidvalidity {
        let raw = self.uidvalidity_gen.fetch_add(1, Ordering::SeqCst);
        ImapUidvalidity::new(raw).expect("uidvalidity generator starts at 1")
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name.starts_with(MAILBOX_HIERARCHY_DELIMITER)
        || name.ends_with(MAILBOX_HIERARCHY_DELIMITER)
        || name.contains("//")
        || name.chars().any(|c| c.is_control())
    {
        return Err(StoreError::BadName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl MailStore for MemoryAccount {
    fn username(&self) -> &str {
        &self.username
    }

    async fn list_mailboxes(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.mailboxes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_mailbox(&self, name: &str) -> StoreResult<bool> {
        Ok(self.inner.read().await.mailboxes.contains_key(name))
    }

    async fn create_mailbox(&self, name: &str) -> StoreResult<()> {
        validate_name(name)?;
        if name.eq_ignore_ascii_case("INBOX") {
            return Err(StoreError::AlreadyExists("INBOX".to_string()));
        }

        let mut inner = self.inner.write().await;
        if inner.mailboxes.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let mailbox = MemoryMailbox::new(name, self.next_uidvalidity());
        inner.mailboxes.insert(name.to_string(), mailbox);
        tracing::debug!(user=%self.username, mailbox=%name, "mailbox.created");
        Ok(())
    }

    async fn delete_mailbox(&self, name: &str) -> StoreResult<()> {
        if name.eq_ignore_ascii_case("INBOX") {
            return Err(StoreError::BadName("INBOX".to_string()));
        }
        let mut inner = self.inner.write().await;
        match inner.mailboxes.remove(name) {
            Some(_) => {
                tracing::debug!(user=%self.username, mailbox=%name, "mailbox.deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn rename_mailbox(&self, from: &str, to: &str) -> StoreResult<()> {
        validate_name(to)?;
        if from.eq_ignore_ascii_case("INBOX") || to.eq_ignore_ascii_case("INBOX") {
            return Err(StoreError::BadName("INBOX".to_string()));
        }

        let mut inner = self.inner.write().await;
        if inner.mailboxes.contains_key(to) {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        if !inner.mailboxes.contains_key(from) {
            return Err(StoreError::NotFound(from.to_string()));
        }

        // The mailbox and its whole subtree move.
        let prefix = format!("{}{}", from, MAILBOX_HIERARCHY_DELIMITER);
        let renames: Vec<(String, String)> = inner
            .mailboxes
            .keys()
            .filter(|name| *name == from || name.starts_with(&prefix))
            .map(|name| {
                let renamed = format!("{}{}", to, &name[from.len()..]);
                (name.clone(), renamed)
            })
            .collect();

        for (old, new) in renames {
            if let Some(mailbox) = inner.mailboxes.remove(&old) {
                mailbox.set_name(&new);
                inner.mailboxes.insert(new.clone(), mailbox);
            }
            if inner.subscriptions.remove(&old) {
                inner.subscriptions.insert(new);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.subscriptions.insert(name.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.subscriptions.remove(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn subscriptions(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.read().await.subscriptions.iter().cloned().collect())
    }

    async fn open_mailbox(&self, name: &str) -> StoreResult<Option<Arc<dyn MailboxHandle>>> {
        let inner = self.inner.read().await;
        Ok(inner.mailboxes.get(name).map(|mailbox| {
            let handle: Arc<dyn MailboxHandle> = mailbox.clone();
            handle
        }))
    }

    async fn copy_message(
        &self,
        source: &str,
        uid: ImapUid,
        dest: &str,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)> {
        let (source_mbx, dest_mbx) = {
            let inner = self.inner.read().await;
            let source_mbx = inner
                .mailboxes
                .get(source)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
            let dest_mbx = inner
                .mailboxes
                .get(dest)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(dest.to_string()))?;
            (source_mbx, dest_mbx)
        };

        let (record, flags) = source_mbx
            .export(uid)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", source, uid)))?;

        dest_mbx
            .append(flags, Some(record.internaldate), record.body.clone())
            .await
    }

    async fn move_message(
        &self,
        source: &str,
        uid: ImapUid,
        dest: &str,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)> {
        let allocated = self.copy_message(source, uid, dest).await?;

        let inner = self.inner.read().await;
        if let Some(source_mbx) = inner.mailboxes.get(source) {
            source_mbx.expunge(vec![uid]).await?;
        }
        Ok(allocated)
    }
}

// ---- mailbox ----

struct MessageRecord {
    internaldate: DateTime<Utc>,
    body: Vec<u8>,
}

struct MailboxState {
    index: UidIndex,
    messages: OrdMap<ImapUid, Arc<MessageRecord>>,
    recent: OrdSet<ImapUid>,
}

pub struct MemoryMailbox {
    name: std::sync::RwLock<String>,
    state: RwLock<MailboxState>,
    events: broadcast::Sender<MailboxEvent>,
}

impl MemoryMailbox {
    fn new(name: &str, uidvalidity: ImapUidvalidity) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            name: std::sync::RwLock::new(name.to_string()),
            state: RwLock::new(MailboxState {
                index: UidIndex::new(uidvalidity),
                messages: OrdMap::new(),
                recent: OrdSet::new(),
            }),
            events,
        })
    }

    fn set_name(&self, name: &str) {
        *self.name.write().unwrap() = name.to_string();
    }

    async fn export(&self, uid: ImapUid) -> Option<(Arc<MessageRecord>, Vec<Flag>)> {
        let state = self.state.read().await;
        let record = state.messages.get(&uid)?.clone();
        let flags = state
            .index
            .flags(uid)
            .map(|flags| {
                flags
                    .iter()
                    .filter(|f| *f != "\\Recent")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Some((record, flags))
    }
}

/// RFC822.HEADER is everything up to and including the blank line.
fn header_section(body: &[u8]) -> &[u8] {
    match body.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => &body[..pos + 4],
        None => body,
    }
}

#[async_trait]
impl MailboxHandle for MemoryMailbox {
    fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    async fn snapshot(&self) -> UidIndex {
        self.state.read().await.index.clone()
    }

    fn watch(&self) -> broadcast::Receiver<MailboxEvent> {
        self.events.subscribe()
    }

    async fn claim_recent(&self) -> Vec<ImapUid> {
        let mut state = self.state.write().await;
        let claimed: Vec<ImapUid> = state.recent.iter().copied().collect();
        state.recent = OrdSet::new();
        claimed
    }

    async fn pending_recent(&self) -> u32 {
        self.state.read().await.recent.len() as u32
    }

    async fn append(
        &self,
        flags: Vec<Flag>,
        internaldate: Option<DateTime<Utc>>,
        body: Vec<u8>,
    ) -> StoreResult<(ImapUidvalidity, ImapUid)> {
        let mut state = self.state.write().await;

        // `\Recent` is server-assigned, duplicates are meaningless.
        let mut clean: Vec<Flag> = Vec::new();
        for flag in flags {
            if flag != "\\Recent" && !clean.contains(&flag) {
                clean.push(flag);
            }
        }

        let uid = state.index.register(&clean);
        state.messages.insert(
            uid,
            Arc::new(MessageRecord {
                internaldate: internaldate.unwrap_or_else(Utc::now),
                body,
            }),
        );
        state.recent.insert(uid);

        let _ = self.events.send(MailboxEvent::Exists { uid, recent: true });
        Ok((state.index.uidvalidity, uid))
    }

    async fn load(&self, uid: ImapUid, scope: QueryScope) -> StoreResult<Option<MessageData>> {
        let state = self.state.read().await;
        let record = match state.messages.get(&uid) {
            Some(record) => record,
            None => return Ok(None),
        };

        Ok(Some(MessageData {
            internaldate: record.internaldate,
            rfc822_size: record.body.len(),
            headers: header_section(&record.body).to_vec(),
            content: match scope {
                QueryScope::Full => Some(record.body.clone()),
                QueryScope::Index | QueryScope::Partial => None,
            },
        }))
    }

    async fn add_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>> {
        let mut state = self.state.write().await;
        match state.index.add_flags(uid, flags) {
            Some(new_flags) => {
                let _ = self.events.send(MailboxEvent::Flags {
                    uid,
                    flags: new_flags.clone(),
                });
                Ok(Some(new_flags))
            }
            None => Ok(None),
        }
    }

    async fn del_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>> {
        let mut state = self.state.write().await;
        match state.index.del_flags(uid, flags) {
            Some(new_flags) => {
                let _ = self.events.send(MailboxEvent::Flags {
                    uid,
                    flags: new_flags.clone(),
                });
                Ok(Some(new_flags))
            }
            None => Ok(None),
        }
    }

    async fn set_flags(&self, uid: ImapUid, flags: &[Flag]) -> StoreResult<Option<Vec<Flag>>> {
        let mut state = self.state.write().await;
        match state.index.set_flags(uid, flags) {
            Some(new_flags) => {
                let _ = self.events.send(MailboxEvent::Flags {
                    uid,
                    flags: new_flags.clone(),
                });
                Ok(Some(new_flags))
            }
            None => Ok(None),
        }
    }

    async fn expunge(&self, uids: Vec<ImapUid>) -> StoreResult<Vec<ImapUid>> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        for uid in uids {
            if state.messages.remove(&uid).is_some() {
                state.index.unregister(uid);
                state.recent.remove(&uid);
                removed.push(uid);
            }
        }
        for uid in &removed {
            let _ = self.events.send(MailboxEvent::Expunged { uid: *uid });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(value: u32) -> ImapUid {
        ImapUid::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_account_inbox_exists() {
        let account = MemoryAccount::new("alice");
        assert!(account.has_mailbox("INBOX").await.unwrap());
        assert!(account.open_mailbox("INBOX").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_delete_recreate_bumps_uidvalidity() {
        let account = MemoryAccount::new("alice");
        account.create_mailbox("Archive").await.unwrap();
        let first = account
            .open_mailbox("Archive")
            .await
            .unwrap()
            .unwrap()
            .snapshot()
            .await
            .uidvalidity;

        account.delete_mailbox("Archive").await.unwrap();
        account.create_mailbox("Archive").await.unwrap();
        let second = account
            .open_mailbox("Archive")
            .await
            .unwrap()
            .unwrap()
            .snapshot()
            .await
            .uidvalidity;

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_append_allocates_monotone_uids() {
        let account = MemoryAccount::new("alice");
        let inbox = account.open_mailbox("INBOX").await.unwrap().unwrap();

        let (_, first) = inbox
            .append(vec![], None, b"Subject: a\r\n\r\na".to_vec())
            .await
            .unwrap();
        let (_, second) = inbox
            .append(vec![], None, b"Subject: b\r\n\r\nb".to_vec())
            .await
            .unwrap();
        assert!(second > first);

        // Expunging the last message must not let its UID be reused.
        inbox.expunge(vec![second]).await.unwrap();
        let (_, third) = inbox
            .append(vec![], None, b"Subject: c\r\n\r\nc".to_vec())
            .await
            .unwrap();
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_recent_claimed_once() {
        let account = MemoryAccount::new("alice");
        let inbox = account.open_mailbox("INBOX").await.unwrap().unwrap();
        inbox
            .append(vec![], None, b"Subject: a\r\n\r\na".to_vec())
            .await
            .unwrap();

        assert_eq!(inbox.claim_recent().await, vec![uid(1)]);
        assert!(inbox.claim_recent().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_on_append_and_expunge() {
        let account = MemoryAccount::new("alice");
        let inbox = account.open_mailbox("INBOX").await.unwrap().unwrap();
        let mut events = inbox.watch();

        inbox
            .append(vec![], None, b"Subject: a\r\n\r\na".to_vec())
            .await
            .unwrap();
        inbox.expunge(vec![uid(1)]).await.unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            MailboxEvent::Exists { recent: true, .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            MailboxEvent::Expunged { .. }
        ));
    }

    #[tokio::test]
    async fn test_copy_preserves_flags_and_move_expunges() {
        let account = MemoryAccount::new("alice");
        account.create_mailbox("Archive").await.unwrap();
        let inbox = account.open_mailbox("INBOX").await.unwrap().unwrap();
        inbox
            .append(
                vec!["\\Seen".to_string()],
                None,
                b"Subject: a\r\n\r\na".to_vec(),
            )
            .await
            .unwrap();

        let (_, copied) = account.copy_message("INBOX", uid(1), "Archive").await.unwrap();
        let archive = account.open_mailbox("Archive").await.unwrap().unwrap();
        assert_eq!(
            archive.snapshot().await.flags(copied).unwrap(),
            &vec!["\\Seen".to_string()]
        );

        account.move_message("INBOX", uid(1), "Archive").await.unwrap();
        assert_eq!(inbox.snapshot().await.exists(), 0);
        assert_eq!(archive.snapshot().await.exists(), 2);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let account = MemoryAccount::new("alice");
        account.create_mailbox("Work").await.unwrap();
        account.create_mailbox("Work/2024").await.unwrap();

        account.rename_mailbox("Work", "Archive").await.unwrap();
        assert!(account.has_mailbox("Archive").await.unwrap());
        assert!(account.has_mailbox("Archive/2024").await.unwrap());
        assert!(!account.has_mailbox("Work").await.unwrap());
    }

    #[test]
    fn test_header_section() {
        let body = b"Subject: x\r\nFrom: a@b\r\n\r\nhello";
        assert_eq!(header_section(body), b"Subject: x\r\nFrom: a@b\r\n\r\n");
    }
}
