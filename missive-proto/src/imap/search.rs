//! SEARCH criteria evaluation over the frozen view.

use std::num::NonZeroU32;

use missive_backend::{uidindex::ImapUid, MessageData};
use missive_imap::search::SearchKey;

use crate::imap::index::MailIndex;
use crate::imap::mail_view::filter_header_fields;

pub struct Criteria<'a>(pub &'a SearchKey);

impl<'a> Criteria<'a> {
    /// Whether evaluation needs message metadata (sizes, dates, headers).
    pub fn need_meta(&self) -> bool {
        use SearchKey::*;
        match self.0 {
            Bcc(_) | Cc(_) | From(_) | Header(..) | SentBefore(_) | SentOn(_) | SentSince(_)
            | Subject(_) | To(_) => true,
            Before(_) | On(_) | Since(_) => true,
            Larger(_) | Smaller(_) => true,
            And(and_list) => and_list.as_ref().iter().any(|sk| Criteria(sk).need_meta()),
            Not(inner) => Criteria(inner).need_meta(),
            Or(left, right) => Criteria(left).need_meta() || Criteria(right).need_meta(),
            _ => false,
        }
    }

    /// Whether evaluation needs the full content.
    pub fn need_body(&self) -> bool {
        use SearchKey::*;
        match self.0 {
            Text(_) | Body(_) => true,
            And(and_list) => and_list.as_ref().iter().any(|sk| Criteria(sk).need_body()),
            Not(inner) => Criteria(inner).need_body(),
            Or(left, right) => Criteria(left).need_body() || Criteria(right).need_body(),
            _ => false,
        }
    }

    pub fn is_keep(&self, ctx: &SearchContext) -> bool {
        use SearchKey::*;
        match self.0 {
            All => true,
            And(list) => list.as_ref().iter().all(|sk| Criteria(sk).is_keep(ctx)),
            Not(inner) => !Criteria(inner).is_keep(ctx),
            Or(left, right) => {
                Criteria(left).is_keep(ctx) || Criteria(right).is_keep(ctx)
            }

            SequenceSet(set) => set.contains(ctx.midx.i, ctx.seq_max),
            Uid(set) => set.contains(ctx.midx.uid, ctx.uid_max),

            Answered => ctx.midx.is_flag_set("\\Answered"),
            Deleted => ctx.midx.is_flag_set("\\Deleted"),
            Draft => ctx.midx.is_flag_set("\\Draft"),
            Flagged => ctx.midx.is_flag_set("\\Flagged"),
            Seen => ctx.midx.is_flag_set("\\Seen"),
            Unanswered => !ctx.midx.is_flag_set("\\Answered"),
            Undeleted => !ctx.midx.is_flag_set("\\Deleted"),
            Undraft => !ctx.midx.is_flag_set("\\Draft"),
            Unflagged => !ctx.midx.is_flag_set("\\Flagged"),
            Unseen => !ctx.midx.is_flag_set("\\Seen"),
            Keyword(kw) => ctx.midx.is_flag_set(kw.inner()),
            Unkeyword(kw) => !ctx.midx.is_flag_set(kw.inner()),
            Recent => ctx.is_recent,
            Old => !ctx.is_recent,
            New => ctx.is_recent && !ctx.midx.is_flag_set("\\Seen"),

            Larger(size) => match ctx.data {
                Some(data) => data.rfc822_size > *size as usize,
                None => false,
            },
            Smaller(size) => match ctx.data {
                Some(data) => data.rfc822_size < *size as usize,
                None => false,
            },

            Before(date) => ctx
                .internal_date()
                .map_or(false, |d| d < *date.inner()),
            On(date) => ctx
                .internal_date()
                .map_or(false, |d| d == *date.inner()),
            Since(date) => ctx
                .internal_date()
                .map_or(false, |d| d >= *date.inner()),
            SentBefore(date) => ctx.sent_date().map_or(false, |d| d < *date.inner()),
            SentOn(date) => ctx.sent_date().map_or(false, |d| d == *date.inner()),
            SentSince(date) => ctx.sent_date().map_or(false, |d| d >= *date.inner()),

            From(pat) => ctx.header_contains(b"from", pat.as_bytes()),
            To(pat) => ctx.header_contains(b"to", pat.as_bytes()),
            Cc(pat) => ctx.header_contains(b"cc", pat.as_bytes()),
            Bcc(pat) => ctx.header_contains(b"bcc", pat.as_bytes()),
            Subject(pat) => ctx.header_contains(b"subject", pat.as_bytes()),
            Header(name, pat) => {
                ctx.header_contains(&name.as_bytes().to_ascii_lowercase(), pat.as_bytes())
            }

            Text(pat) => match ctx.data.and_then(|d| d.content.as_deref()) {
                Some(content) => contains_ci(content, pat.as_bytes()),
                None => false,
            },
            Body(pat) => match ctx.data.and_then(|d| d.content.as_deref()) {
                Some(content) => {
                    let body_start = content
                        .windows(4)
                        .position(|w| w == b"\r\n\r\n")
                        .map(|pos| pos + 4)
                        .unwrap_or(0);
                    contains_ci(&content[body_start..], pat.as_bytes())
                }
                None => false,
            },
        }
    }
}

pub struct SearchContext<'a> {
    pub midx: &'a MailIndex<'a>,
    pub seq_max: NonZeroU32,
    pub uid_max: ImapUid,
    pub is_recent: bool,
    pub data: Option<&'a MessageData>,
}

impl<'a> SearchContext<'a> {
    fn internal_date(&self) -> Option<chrono::NaiveDate> {
        self.data.map(|d| d.internaldate.date_naive())
    }

    fn sent_date(&self) -> Option<chrono::NaiveDate> {
        let data = self.data?;
        let (_, parsed) = eml_codec::parse_imf(&data.headers).ok()?;
        parsed.date.map(|d| d.date_naive())
    }

    fn header_contains(&self, name: &[u8], pattern: &[u8]) -> bool {
        let data = match self.data {
            Some(data) => data,
            None => return false,
        };
        let selected = filter_header_fields(&data.headers, &[name.to_vec()], false);
        // An empty pattern asks for mere existence of the field.
        if pattern.is_empty() {
            return selected.len() > 2;
        }
        contains_ci(&selected, pattern)
    }
}

fn contains_ci(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    let needle = needle.to_ascii_lowercase();
    haystack
        .windows(needle.len())
        .any(|w| w.to_ascii_lowercase() == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use missive_backend::uidindex::UidIndex;

    fn key(spec: &str) -> SearchKey {
        SearchKey::try_from(spec).unwrap()
    }

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn sample_data() -> MessageData {
        let body = b"From: alice@example.com\r\nSubject: OoOoO rare\r\n\r\nhello world".to_vec();
        MessageData {
            internaldate: chrono::Utc::now(),
            rfc822_size: body.len(),
            headers: body[..body.len() - 11].to_vec(),
            content: Some(body),
        }
    }

    #[test]
    fn test_flag_and_text_keys() {
        let mut index = UidIndex::new(nz(1));
        index.register(&["\\Seen".to_string()]);
        let snapshot = index;
        let seq = vec![nz(1)];
        let idx = crate::imap::index::Index::new(&seq, &snapshot).unwrap();
        let midx = &idx.imap_index[0];

        let data = sample_data();
        let ctx = SearchContext {
            midx,
            seq_max: nz(1),
            uid_max: nz(1),
            is_recent: false,
            data: Some(&data),
        };

        assert!(Criteria(&key("SEEN")).is_keep(&ctx));
        assert!(!Criteria(&key("UNSEEN")).is_keep(&ctx));
        assert!(Criteria(&key("TEXT OoOoO")).is_keep(&ctx));
        assert!(Criteria(&key("BODY hello")).is_keep(&ctx));
        assert!(!Criteria(&key("BODY OoOoO")).is_keep(&ctx));
        assert!(Criteria(&key("FROM alice")).is_keep(&ctx));
        assert!(Criteria(&key("HEADER Subject rare")).is_keep(&ctx));
        assert!(Criteria(&key("NOT DRAFT")).is_keep(&ctx));
        assert!(Criteria(&key("OR DRAFT SEEN")).is_keep(&ctx));
    }

    #[test]
    fn test_need_meta_and_body() {
        assert!(!Criteria(&key("SEEN")).need_meta());
        assert!(Criteria(&key("SUBJECT x")).need_meta());
        assert!(Criteria(&key("LARGER 10")).need_meta());
        assert!(!Criteria(&key("SUBJECT x")).need_body());
        assert!(Criteria(&key("TEXT x")).need_body());
        assert!(Criteria(&key("OR TEXT x SEEN")).need_body());
    }
}
