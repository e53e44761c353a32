//! The per-session view of a selected mailbox.
//!
//! The view freezes a snapshot of the mailbox (seqnum↔UID array plus a
//! flag cache) and subscribes to the backend's change stream. Changes
//! accumulate in the subscription queue; only the command handler drains
//! them, at flush points, so sequence numbers never move mid-command.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use missive_backend::uidindex::{ImapUid, ImapUidvalidity, UidIndex};
use missive_backend::{MailStore, MailboxEvent, MailboxHandle, QueryScope};
use missive_imap::flag::{Flag, FlagPerm, StoreResponse, StoreType};
use missive_imap::core::Vec1;
use missive_imap::fetch::MessageDataItem;
use missive_imap::response::{Code, Data, Status};
use missive_imap::search::SearchKey;
use missive_imap::sequence::SequenceSet;

use crate::imap::attributes::AttributesProxy;
use crate::imap::flags;
use crate::imap::index::Index;
use crate::imap::mail_view::{MailView, SeenFlag};
use crate::imap::response::Body;
use crate::imap::search::{Criteria, SearchContext};

const DEFAULT_FLAGS: [Flag; 5] = [
    Flag::Seen,
    Flag::Answered,
    Flag::Flagged,
    Flag::Deleted,
    Flag::Draft,
];

pub struct MailboxView {
    pub mailbox: Arc<dyn MailboxHandle>,
    /// What the client knows: flags as last reported.
    pub snapshot: UidIndex,
    /// seqnum → UID, 1-based.
    seq: Vec<ImapUid>,
    /// The pending-update queue; only `apply_events` drains it.
    events: broadcast::Receiver<MailboxEvent>,
    /// Messages this session (and only this session) reports `\Recent`.
    recent: BTreeSet<ImapUid>,
    /// Own STORE echoes to swallow at the next flush.
    silence: Vec<(ImapUid, Vec<String>)>,
    last_exists: u32,
    last_recent: u32,
}

impl MailboxView {
    /// Freeze a new view. Subscribing before the snapshot is taken means
    /// no committed change can fall between the two; duplicated events
    /// are absorbed by the at-least-once handling.
    pub async fn new(mailbox: Arc<dyn MailboxHandle>) -> Self {
        let events = mailbox.watch();
        let snapshot = mailbox.snapshot().await;
        let claimed = mailbox.claim_recent().await;

        let seq: Vec<ImapUid> = snapshot.table.keys().copied().collect();
        let recent: BTreeSet<ImapUid> = claimed
            .into_iter()
            .filter(|uid| snapshot.table.contains_key(uid))
            .collect();

        let last_exists = seq.len() as u32;
        let last_recent = recent.len() as u32;

        Self {
            mailbox,
            snapshot,
            seq,
            events,
            recent,
            silence: Vec::new(),
            last_exists,
            last_recent,
        }
    }

    // ----- client-facing state -----

    pub fn exists(&self) -> u32 {
        self.seq.len() as u32
    }

    pub fn recent_count(&self) -> u32 {
        self.recent.len() as u32
    }

    pub fn uidvalidity(&self) -> ImapUidvalidity {
        self.snapshot.uidvalidity
    }

    pub fn uidnext(&self) -> ImapUid {
        self.snapshot.uidnext
    }

    /// The SELECT/EXAMINE summary, in the order clients expect it.
    pub fn summary(&self) -> Result<Vec<Body>> {
        let mut data = Vec::<Body>::new();
        data.push(Body::Data(Data::Exists(self.exists())));
        data.push(Body::Data(Data::Recent(self.recent_count())));
        data.push(Body::Status(Status::ok(
            None,
            Some(Code::UidValidity(self.uidvalidity())),
            "UIDs valid",
        )?));
        data.push(Body::Status(Status::ok(
            None,
            Some(Code::UidNext(self.uidnext())),
            "Predicted next UID",
        )?));
        data.extend(self.flags_status()?);
        if let Some(unseen) = self.snapshot.first_unseen() {
            data.push(Body::Status(Status::ok(
                None,
                Some(Code::Unseen(unseen)),
                "First unseen",
            )?));
        }
        Ok(data)
    }

    fn flags_status(&self) -> Result<Vec<Body>> {
        let mut body = vec![];

        let mut known_flags: Vec<Flag> = self
            .snapshot
            .idx_by_flag
            .flags()
            .filter_map(|f| match flags::from_str(f) {
                Some(missive_imap::flag::FlagFetch::Flag(fl)) => Some(fl),
                _ => None,
            })
            .collect();
        for f in DEFAULT_FLAGS.iter() {
            if !known_flags.contains(f) {
                known_flags.push(f.clone());
            }
        }
        body.push(Body::Data(Data::Flags(known_flags)));

        let mut permanent = DEFAULT_FLAGS
            .iter()
            .map(|f| FlagPerm::Flag(f.clone()))
            .collect::<Vec<_>>();
        permanent.push(FlagPerm::Asterisk);
        body.push(Body::Status(Status::ok(
            None,
            Some(Code::PermanentFlags(permanent)),
            "Flags permitted",
        )?));

        Ok(body)
    }

    // ----- the pending-update queue -----

    /// Record an own write whose echo on the change stream must not be
    /// replayed to the client.
    fn silence_echo(&mut self, uid: ImapUid, flags: &[String]) {
        self.silence.push((uid, flags.to_vec()));
    }

    /// Drain queued updates into untagged responses. This is the only
    /// place sequence numbers move.
    pub async fn flush(&mut self) -> Result<Vec<Body>> {
        let mut queued = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => queued.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "change stream lagged, resynchronizing");
                    return self.resync().await;
                }
            }
        }
        self.apply_events(queued).await
    }

    /// Block until at least one update is pending, then flush. Used by
    /// IDLE; loops internally over updates that turn out to be echoes.
    pub async fn idle_sync(&mut self) -> Result<Vec<Body>> {
        loop {
            let first = match self.events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "change stream lagged, resynchronizing");
                    return self.resync().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    bail!("mailbox change stream closed")
                }
            };
            let mut queued = vec![first];
            loop {
                match self.events.try_recv() {
                    Ok(event) => queued.push(event),
                    Err(_) => break,
                }
            }
            let out = self.apply_events(queued).await?;
            if !out.is_empty() {
                return Ok(out);
            }
        }
    }

    async fn apply_events(&mut self, queued: Vec<MailboxEvent>) -> Result<Vec<Body>> {
        let mut out = Vec::<Body>::new();
        // FETCH updates deduplicate per UID (latest flags win); EXPUNGE
        // updates are never coalesced and renumber immediately.
        let mut flag_order: Vec<ImapUid> = Vec::new();
        let mut flag_values: HashMap<ImapUid, Vec<String>> = HashMap::new();
        let mut live: Option<UidIndex> = None;

        for event in queued {
            match event {
                MailboxEvent::Exists { uid, recent } => {
                    if self.snapshot.table.contains_key(&uid) {
                        continue;
                    }
                    // The event does not carry flags; one live snapshot
                    // per flush serves every Exists in the batch.
                    if live.is_none() {
                        live = Some(self.mailbox.snapshot().await);
                    }
                    let live = live.as_ref().unwrap();
                    let new_flags = live.flags(uid).cloned().unwrap_or_default();
                    self.snapshot.adopt(uid, &new_flags);
                    self.seq.push(uid);
                    if recent {
                        for claimed in self.mailbox.claim_recent().await {
                            if self.snapshot.table.contains_key(&claimed) {
                                self.recent.insert(claimed);
                            }
                        }
                    }
                }
                MailboxEvent::Expunged { uid } => {
                    if let Some(pos) = self.seq.iter().position(|known| *known == uid) {
                        // Safety: positions are 0-based over a non-empty array.
                        let seqnum = NonZeroU32::new(pos as u32 + 1).unwrap();
                        out.push(Body::Data(Data::Expunge(seqnum)));
                        self.seq.remove(pos);
                        self.snapshot.unregister(uid);
                        self.recent.remove(&uid);
                        // A flag update to an expunged message is dropped.
                        flag_order.retain(|known| *known != uid);
                        flag_values.remove(&uid);
                    }
                }
                MailboxEvent::Flags { uid, flags } => {
                    if let Some(pos) = self
                        .silence
                        .iter()
                        .position(|(s_uid, s_flags)| *s_uid == uid && *s_flags == flags)
                    {
                        self.silence.remove(pos);
                        self.snapshot.set_flags(uid, &flags);
                        continue;
                    }
                    if self.snapshot.set_flags(uid, &flags).is_none() {
                        continue;
                    }
                    flag_order.retain(|known| *known != uid);
                    flag_order.push(uid);
                    flag_values.insert(uid, flags);
                }
            }
        }

        self.push_counters(&mut out);
        for uid in flag_order {
            if let Some(flags) = flag_values.get(&uid) {
                self.push_flag_update(&mut out, uid, flags)?;
            }
        }

        Ok(out)
    }

    /// Rebuild against a fresh snapshot after the change stream lagged.
    async fn resync(&mut self) -> Result<Vec<Body>> {
        self.events = self.mailbox.watch();
        let live = self.mailbox.snapshot().await;

        let mut out = Vec::<Body>::new();

        // Expunges first, renumbering as they land.
        let old_seq = std::mem::take(&mut self.seq);
        let mut n_expunge = 0u32;
        let mut kept = Vec::with_capacity(old_seq.len());
        for (i, uid) in old_seq.into_iter().enumerate() {
            if live.table.contains_key(&uid) {
                kept.push(uid);
            } else {
                // Safety: i + 1 > n_expunge at all times.
                let seqnum = NonZeroU32::new(i as u32 + 1 - n_expunge).unwrap();
                out.push(Body::Data(Data::Expunge(seqnum)));
                n_expunge += 1;
                self.recent.remove(&uid);
            }
        }
        self.seq = kept;

        // New arrivals.
        for uid in live.table.keys() {
            if !self.snapshot.table.contains_key(uid) {
                self.seq.push(*uid);
            }
        }
        for claimed in self.mailbox.claim_recent().await {
            if live.table.contains_key(&claimed) {
                self.recent.insert(claimed);
            }
        }

        // Flag changes on survivors.
        let mut updates = Vec::new();
        for (uid, new_flags) in live.table.iter() {
            match self.snapshot.flags(*uid) {
                Some(old_flags) if old_flags != new_flags => {
                    updates.push((*uid, new_flags.clone()));
                }
                _ => (),
            }
        }

        self.snapshot = live;
        self.silence.clear();

        self.push_counters(&mut out);
        for (uid, new_flags) in updates {
            self.push_flag_update(&mut out, uid, &new_flags)?;
        }
        Ok(out)
    }

    fn push_counters(&mut self, out: &mut Vec<Body>) {
        let exists_now = self.exists();
        if exists_now != self.last_exists {
            out.push(Body::Data(Data::Exists(exists_now)));
            self.last_exists = exists_now;
        }
        let recent_now = self.recent_count();
        if recent_now != self.last_recent {
            out.push(Body::Data(Data::Recent(recent_now)));
            self.last_recent = recent_now;
        }
    }

    fn push_flag_update(&self, out: &mut Vec<Body>, uid: ImapUid, flags: &[String]) -> Result<()> {
        if let Some(pos) = self.seq.iter().position(|known| *known == uid) {
            // Safety: positions are 0-based over a non-empty array.
            let seqnum = NonZeroU32::new(pos as u32 + 1).unwrap();
            let items = vec![MessageDataItem::Flags(flags::fetch_flags(
                flags,
                self.recent.contains(&uid),
            ))];
            out.push(Body::Data(Data::Fetch {
                seq: seqnum,
                items: Vec1::try_from(items)?,
            }));
        }
        Ok(())
    }

    // ----- commands against the frozen view -----

    pub async fn fetch(
        &mut self,
        sequence_set: &SequenceSet,
        ap: &AttributesProxy,
        is_uid_fetch: bool,
    ) -> Result<Vec<Body>> {
        let scope = match ap.need_body() {
            true => QueryScope::Full,
            _ => QueryScope::Partial,
        };

        let mut out = Vec::new();
        let mut must_seen: Vec<ImapUid> = Vec::new();
        {
            let index = Index::new(&self.seq, &self.snapshot)?;
            for midx in index.fetch(sequence_set, is_uid_fetch) {
                let data = match self.mailbox.load(midx.uid, scope).await? {
                    Some(data) => data,
                    // Expunged under us; it stays visible as an empty
                    // shell until the expunge is flushed.
                    None => continue,
                };
                let view = MailView::new(&data, midx, self.recent.contains(&midx.uid))?;
                let (body, seen) = view.filter(ap)?;
                out.push(body);
                if matches!(seen, SeenFlag::MustAdd) {
                    must_seen.push(midx.uid);
                }
            }
        }

        // The flag change is reported through the change stream at the
        // next flush point, not inside this FETCH's response.
        for uid in must_seen {
            self.mailbox
                .add_flags(uid, &["\\Seen".to_string()])
                .await?;
        }

        Ok(out)
    }

    pub async fn store(
        &mut self,
        sequence_set: &SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: &[missive_imap::flag::Flag],
        is_uid_store: bool,
    ) -> Result<Vec<Body>> {
        let flags_str = flags::to_backend(flags);

        let targets: Vec<(NonZeroU32, ImapUid)> = {
            let index = Index::new(&self.seq, &self.snapshot)?;
            index
                .fetch(sequence_set, is_uid_store)
                .into_iter()
                .map(|midx| (midx.i, midx.uid))
                .collect()
        };

        let mut out = Vec::new();
        for (seqnum, uid) in targets {
            let result = match kind {
                StoreType::Add => self.mailbox.add_flags(uid, &flags_str).await?,
                StoreType::Remove => self.mailbox.del_flags(uid, &flags_str).await?,
                StoreType::Replace => self.mailbox.set_flags(uid, &flags_str).await?,
            };
            let new_flags = match result {
                Some(new_flags) => new_flags,
                // Expunged in another session: silently dropped.
                None => continue,
            };

            self.silence_echo(uid, &new_flags);
            self.snapshot.set_flags(uid, &new_flags);

            if matches!(response, StoreResponse::Answer) {
                let mut items = vec![MessageDataItem::Flags(flags::fetch_flags(
                    &new_flags,
                    self.recent.contains(&uid),
                ))];
                if is_uid_store {
                    items.push(MessageDataItem::Uid(uid));
                }
                out.push(Body::Data(Data::Fetch {
                    seq: seqnum,
                    items: Vec1::try_from(items)?,
                }));
            }
        }

        Ok(out)
    }

    /// EXPUNGE / UID EXPUNGE. The untagged EXPUNGE responses surface
    /// through the flush that precedes the tagged OK.
    pub async fn expunge(&mut self, uid_sequence_set: Option<&SequenceSet>) -> Result<()> {
        let candidates: Vec<ImapUid> = {
            let index = Index::new(&self.seq, &self.snapshot)?;
            let deleted = "\\Deleted";
            match uid_sequence_set {
                Some(set) => index
                    .fetch_on_uid(set)
                    .into_iter()
                    .filter(|midx| midx.is_flag_set(deleted))
                    .map(|midx| midx.uid)
                    .collect(),
                None => index
                    .imap_index
                    .iter()
                    .filter(|midx| midx.is_flag_set(deleted))
                    .map(|midx| midx.uid)
                    .collect(),
            }
        };

        if !candidates.is_empty() {
            self.mailbox.expunge(candidates).await?;
        }
        Ok(())
    }

    pub async fn copy(
        &self,
        sequence_set: &SequenceSet,
        store: &Arc<dyn MailStore>,
        dest: &str,
        is_uid_copy: bool,
    ) -> Result<Option<(ImapUidvalidity, Vec<(ImapUid, ImapUid)>)>> {
        let uids: Vec<ImapUid> = {
            let index = Index::new(&self.seq, &self.snapshot)?;
            index
                .fetch(sequence_set, is_uid_copy)
                .into_iter()
                .map(|midx| midx.uid)
                .collect()
        };

        let source = self.mailbox.name();
        let mut uid_map = Vec::new();
        let mut validity = None;
        for uid in uids {
            let (dest_validity, dest_uid) = store.copy_message(&source, uid, dest).await?;
            validity = Some(dest_validity);
            uid_map.push((uid, dest_uid));
        }

        Ok(validity.map(|validity| (validity, uid_map)))
    }

    pub async fn r#move(
        &self,
        sequence_set: &SequenceSet,
        store: &Arc<dyn MailStore>,
        dest: &str,
        is_uid_move: bool,
    ) -> Result<Option<(ImapUidvalidity, Vec<(ImapUid, ImapUid)>)>> {
        let uids: Vec<ImapUid> = {
            let index = Index::new(&self.seq, &self.snapshot)?;
            index
                .fetch(sequence_set, is_uid_move)
                .into_iter()
                .map(|midx| midx.uid)
                .collect()
        };

        let source = self.mailbox.name();
        let mut uid_map = Vec::new();
        let mut validity = None;
        for uid in uids {
            let (dest_validity, dest_uid) = store.move_message(&source, uid, dest).await?;
            validity = Some(dest_validity);
            uid_map.push((uid, dest_uid));
        }

        Ok(validity.map(|validity| (validity, uid_map)))
    }

    pub async fn search(
        &self,
        criteria: &SearchKey,
        is_uid_search: bool,
    ) -> Result<Vec<Body>> {
        let crit = Criteria(criteria);
        let scope = if crit.need_body() {
            Some(QueryScope::Full)
        } else if crit.need_meta() {
            Some(QueryScope::Partial)
        } else {
            None
        };

        let index = Index::new(&self.seq, &self.snapshot)?;
        let seq_max = NonZeroU32::new(self.seq.len() as u32).unwrap_or(NonZeroU32::MIN);
        let uid_max = self.seq.last().copied().unwrap_or(NonZeroU32::MIN);

        let mut hits = Vec::new();
        for midx in index.imap_index.iter() {
            let data = match scope {
                Some(scope) => match self.mailbox.load(midx.uid, scope).await? {
                    Some(data) => Some(data),
                    None => continue,
                },
                None => None,
            };
            let ctx = SearchContext {
                midx,
                seq_max,
                uid_max,
                is_recent: self.recent.contains(&midx.uid),
                data: data.as_ref(),
            };
            if crit.is_keep(&ctx) {
                hits.push(match is_uid_search {
                    true => midx.uid,
                    false => midx.i,
                });
            }
        }

        Ok(vec![Body::Data(Data::Search(hits))])
    }
}
