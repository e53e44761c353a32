//! The mutable index of a mailbox: UID allocation, flags, counters.
//!
//! Built on immutable maps so a session can hold a frozen snapshot while
//! the live index moves on; cloning is cheap and the snapshot never
//! observes a half-applied change.

use std::num::NonZeroU32;

use im::{HashMap, OrdMap, OrdSet};

pub type ImapUid = NonZeroU32;
pub type ImapUidvalidity = NonZeroU32;
pub type Flag = String;

#[derive(Clone)]
pub struct UidIndex {
    /// Source of trust: every live message and its flags.
    pub table: OrdMap<ImapUid, Vec<Flag>>,

    /// Index optimized for flag queries.
    pub idx_by_flag: FlagIndex,

    /// Public counters.
    pub uidvalidity: ImapUidvalidity,
    pub uidnext: ImapUid,
}

impl UidIndex {
    pub fn new(uidvalidity: ImapUidvalidity) -> Self {
        Self {
            table: OrdMap::new(),
            idx_by_flag: FlagIndex::new(),
            uidvalidity,
            uidnext: NonZeroU32::MIN,
        }
    }

    /// Allocate the next UID and register the message.
    pub fn register(&mut self, flags: &[Flag]) -> ImapUid {
        let uid = self.uidnext;
        self.table.insert(uid, flags.to_owned());
        self.idx_by_flag.insert(uid, flags);
        // UIDs are handed out strictly increasing; overflow would break
        // monotonicity, which only a UIDVALIDITY bump could repair.
        self.uidnext = NonZeroU32::new(uid.get() + 1).unwrap();
        uid
    }

    /// Import a message some other holder of the mailbox committed; used
    /// by view-side catch-up. UIDs already present are left alone.
    pub fn adopt(&mut self, uid: ImapUid, flags: &[Flag]) {
        if self.table.contains_key(&uid) {
            return;
        }
        self.table.insert(uid, flags.to_owned());
        self.idx_by_flag.insert(uid, flags);
        if uid >= self.uidnext {
            self.uidnext = NonZeroU32::new(uid.get() + 1).unwrap();
        }
    }

    /// Drop a message. Unknown UIDs are ignored.
    pub fn unregister(&mut self, uid: ImapUid) {
        if let Some(flags) = self.table.get(&uid).cloned() {
            self.idx_by_flag.remove(uid, &flags);
            self.table.remove(&uid);
        }
    }

    pub fn add_flags(&mut self, uid: ImapUid, new_flags: &[Flag]) -> Option<Vec<Flag>> {
        let existing = self.table.get_mut(&uid)?;
        let to_add: Vec<Flag> = new_flags
            .iter()
            .filter(|f| !existing.contains(f))
            .cloned()
            .collect();
        self.idx_by_flag.insert(uid, &to_add);
        existing.extend(to_add);
        Some(existing.clone())
    }

    pub fn del_flags(&mut self, uid: ImapUid, rm_flags: &[Flag]) -> Option<Vec<Flag>> {
        let existing = self.table.get_mut(&uid)?;
        existing.retain(|f| !rm_flags.contains(f));
        self.idx_by_flag.remove(uid, rm_flags);
        Some(existing.clone())
    }

    pub fn set_flags(&mut self, uid: ImapUid, flags: &[Flag]) -> Option<Vec<Flag>> {
        let existing = self.table.get_mut(&uid)?;
        let removed: Vec<Flag> = existing
            .iter()
            .filter(|f| !flags.contains(f))
            .cloned()
            .collect();
        let added: Vec<Flag> = flags
            .iter()
            .filter(|f| !existing.contains(f))
            .cloned()
            .collect();
        existing.retain(|f| flags.contains(f));
        existing.extend(added.iter().cloned());
        self.idx_by_flag.remove(uid, &removed);
        self.idx_by_flag.insert(uid, &added);
        Some(existing.clone())
    }

    pub fn flags(&self, uid: ImapUid) -> Option<&Vec<Flag>> {
        self.table.get(&uid)
    }

    pub fn exists(&self) -> usize {
        self.table.len()
    }

    pub fn seen_count(&self) -> usize {
        self.idx_by_flag
            .get("\\Seen")
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Sequence number (1-based) of the first message without `\Seen`.
    pub fn first_unseen(&self) -> Option<NonZeroU32> {
        self.table
            .iter()
            .enumerate()
            .find(|(_, (uid, _))| {
                !self
                    .idx_by_flag
                    .get("\\Seen")
                    .map(|set| set.contains(*uid))
                    .unwrap_or(false)
            })
            .map(|(i, _)| NonZeroU32::new(i as u32 + 1).unwrap())
    }
}

// ---- FlagIndex ----

#[derive(Clone)]
pub struct FlagIndex(HashMap<Flag, OrdSet<ImapUid>>);
pub type FlagIter<'a> = im::hashmap::Keys<'a, Flag, OrdSet<ImapUid>>;

impl FlagIndex {
    fn new() -> Self {
        Self(HashMap::new())
    }

    fn insert(&mut self, uid: ImapUid, flags: &[Flag]) {
        flags.iter().for_each(|flag| {
            self.0
                .entry(flag.clone())
                .or_insert(OrdSet::new())
                .insert(uid);
        });
    }

    fn remove(&mut self, uid: ImapUid, flags: &[Flag]) {
        for flag in flags.iter() {
            if let Some(set) = self.0.get_mut(flag) {
                set.remove(&uid);
                if set.is_empty() {
                    self.0.remove(flag);
                }
            }
        }
    }

    pub fn get(&self, flag: &str) -> Option<&OrdSet<ImapUid>> {
        self.0.get(flag)
    }

    pub fn flags(&self) -> FlagIter {
        self.0.keys()
    }
}

// ---- TESTS ----

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(value: u32) -> ImapUid {
        NonZeroU32::new(value).unwrap()
    }

    #[test]
    fn test_uidindex() {
        let mut state = UidIndex::new(uid(1));

        // Add message 1
        {
            let allocated = state.register(&["\\Recent".to_string(), "\\Archive".to_string()]);
            assert_eq!(allocated, uid(1));
            assert_eq!(state.table.len(), 1);
            assert_eq!(state.uidnext, uid(2));

            let recent = state.idx_by_flag.get("\\Recent").unwrap();
            assert_eq!(recent.len(), 1);
            assert_eq!(recent.iter().next().unwrap(), &uid(1));
        }

        // Add message 2
        {
            let allocated = state.register(&["\\Seen".to_string(), "\\Archive".to_string()]);
            assert_eq!(allocated, uid(2));

            let archive = state.idx_by_flag.get("\\Archive").unwrap();
            assert_eq!(archive.len(), 2);
        }

        // Add flags to message 1
        {
            let flags = state
                .add_flags(uid(1), &["Important".to_string(), "$cl_1".to_string()])
                .unwrap();
            assert_eq!(flags.len(), 4);
        }

        // Delete flags from message 1
        {
            state.del_flags(uid(1), &["\\Recent".to_string()]).unwrap();
            assert!(state.idx_by_flag.get("\\Recent").is_none());
        }

        // Delete message 2
        {
            state.unregister(uid(2));
            let archive = state.idx_by_flag.get("\\Archive").unwrap();
            assert_eq!(archive.len(), 1);
            // The UID is never reused.
            assert_eq!(state.uidnext, uid(3));
        }
    }

    #[test]
    fn test_add_flags_is_idempotent() {
        let mut state = UidIndex::new(uid(1));
        let m = state.register(&[]);

        let once = state.add_flags(m, &["\\Seen".to_string()]).unwrap();
        let twice = state.add_flags(m, &["\\Seen".to_string()]).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice, vec!["\\Seen".to_string()]);
    }

    #[test]
    fn test_set_flags_replaces() {
        let mut state = UidIndex::new(uid(1));
        let m = state.register(&["\\Seen".to_string()]);

        let flags = state
            .set_flags(m, &["\\Deleted".to_string(), "\\Flagged".to_string()])
            .unwrap();
        assert_eq!(flags, vec!["\\Deleted".to_string(), "\\Flagged".to_string()]);
        assert!(state.idx_by_flag.get("\\Seen").is_none());
    }

    #[test]
    fn test_first_unseen() {
        let mut state = UidIndex::new(uid(1));
        state.register(&["\\Seen".to_string()]);
        state.register(&[]);
        state.register(&[]);
        assert_eq!(state.first_unseen(), Some(uid(2)));
    }

    #[test]
    fn test_snapshot_isolation() {
        let mut state = UidIndex::new(uid(1));
        state.register(&[]);

        let snapshot = state.clone();
        state.register(&[]);
        state.add_flags(uid(1), &["\\Seen".to_string()]).unwrap();

        assert_eq!(snapshot.exists(), 1);
        assert!(snapshot.flags(uid(1)).unwrap().is_empty());
        assert_eq!(state.exists(), 2);
    }
}
