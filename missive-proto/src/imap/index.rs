//! Sequence-number / UID addressing over a frozen mailbox view.

use std::num::NonZeroU32;

use anyhow::{anyhow, Result};
use missive_backend::uidindex::{ImapUid, UidIndex};
use missive_imap::sequence::SequenceSet;

pub struct Index<'a> {
    pub imap_index: Vec<MailIndex<'a>>,
}

#[derive(Clone, Debug)]
pub struct MailIndex<'a> {
    /// Sequence number, 1-based.
    pub i: NonZeroU32,
    pub uid: ImapUid,
    pub flags: &'a Vec<String>,
}

impl<'a> MailIndex<'a> {
    pub fn is_flag_set(&self, flag: &str) -> bool {
        self.flags.iter().any(|candidate| candidate == flag)
    }
}

impl<'a> Index<'a> {
    /// `seq` is the session's seqnum→UID array; flags come from the
    /// frozen snapshot.
    pub fn new(seq: &[ImapUid], snapshot: &'a UidIndex) -> Result<Self> {
        let imap_index = seq
            .iter()
            .enumerate()
            .map(|(i_enum, &uid)| {
                let flags = snapshot
                    .flags(uid)
                    .ok_or(anyhow!("mail is missing from index"))?;
                let i_int: u32 = (i_enum + 1).try_into()?;
                let i: NonZeroU32 = i_int.try_into()?;

                Ok(MailIndex { i, uid, flags })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { imap_index })
    }

    pub fn last(&'a self) -> Option<&'a MailIndex<'a>> {
        self.imap_index.last()
    }

    /// Resolve a UID set. Nonexistent UIDs are silently dropped; the
    /// result is sorted and deduplicated.
    ///
    /// Both the unrolled set and the index are sorted by UID, so after a
    /// `partition_point` jump the window only ever slides forward.
    pub fn fetch_on_uid(&'a self, sequence_set: &SequenceSet) -> Vec<&'a MailIndex<'a>> {
        let largest = match self.last() {
            Some(mail_idx) => mail_idx.uid,
            None => return vec![],
        };
        let mut wanted = sequence_set.iter(largest).collect::<Vec<_>>();
        wanted.sort();
        wanted.dedup();

        let mut window = &self.imap_index[..];
        let mut acc = vec![];
        for uid in wanted {
            let start = window.partition_point(|mail_idx| mail_idx.uid < uid);
            window = &window[start..];
            match window.first() {
                Some(mail_idx) if mail_idx.uid == uid => acc.push(mail_idx),
                _ => continue,
            }
        }
        acc
    }

    /// Resolve a sequence-number set, same conventions as
    /// [`Self::fetch_on_uid`].
    pub fn fetch_on_id(&'a self, sequence_set: &SequenceSet) -> Vec<&'a MailIndex<'a>> {
        let largest = match NonZeroU32::new(self.imap_index.len() as u32) {
            Some(count) => count,
            None => return vec![],
        };
        let mut wanted = sequence_set.iter(largest).collect::<Vec<_>>();
        wanted.sort();
        wanted.dedup();

        wanted
            .into_iter()
            .filter_map(|id| self.imap_index.get(id.get() as usize - 1))
            .collect()
    }

    pub fn fetch(
        self: &'a Index<'a>,
        sequence_set: &SequenceSet,
        by_uid: bool,
    ) -> Vec<&'a MailIndex<'a>> {
        match by_uid {
            true => self.fetch_on_uid(sequence_set),
            _ => self.fetch_on_id(sequence_set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(value: u32) -> ImapUid {
        NonZeroU32::new(value).unwrap()
    }

    /// A mailbox holding UIDs {5, 7, 9} as seq 1..3.
    fn sample() -> (Vec<ImapUid>, UidIndex) {
        let mut index = UidIndex::new(uid(1));
        for _ in 0..9 {
            index.register(&[]);
        }
        for dead in [1u32, 2, 3, 4, 6, 8] {
            index.unregister(uid(dead));
        }
        (vec![uid(5), uid(7), uid(9)], index)
    }

    fn uids(spec: &str, by_uid: bool) -> Vec<u32> {
        let (seq, snapshot) = sample();
        let index = Index::new(&seq, &snapshot).unwrap();
        let set = SequenceSet::try_from(spec).unwrap();
        index
            .fetch(&set, by_uid)
            .into_iter()
            .map(|mail_idx| mail_idx.uid.get())
            .collect()
    }

    #[test]
    fn test_uid_range_filters_missing() {
        assert_eq!(uids("1:6", true), vec![5]);
    }

    #[test]
    fn test_uid_open_range() {
        assert_eq!(uids("8:*", true), vec![9]);
    }

    #[test]
    fn test_seq_open_range() {
        assert_eq!(uids("2:*", false), vec![7, 9]);
    }

    #[test]
    fn test_seq_out_of_range_is_silent() {
        assert_eq!(uids("7", false), Vec::<u32>::new());
    }

    #[test]
    fn test_empty_mailbox() {
        let snapshot = UidIndex::new(uid(1));
        let index = Index::new(&[], &snapshot).unwrap();
        let set = SequenceSet::try_from("1:*").unwrap();
        assert!(index.fetch(&set, true).is_empty());
        assert!(index.fetch(&set, false).is_empty());
    }
}
