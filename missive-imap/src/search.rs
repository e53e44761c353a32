//! SEARCH criteria (RFC 3501 §6.4.4).

use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, value},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
};

use crate::core::{astring, atom, number, sp, AString, Atom, Vec1};
use crate::datetime::{date, NaiveDate};
use crate::decode::{ImapErrorKind, ImapParseError, ImapResult};
use crate::sequence::{sequence_set, SequenceSet};

/// `search-key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// Parenthesized key list; the implicit top-level AND uses it too.
    And(Vec1<SearchKey>),
    SequenceSet(SequenceSet),
    All,
    Answered,
    Bcc(AString),
    Before(NaiveDate),
    Body(AString),
    Cc(AString),
    Deleted,
    Draft,
    Flagged,
    From(AString),
    Header(AString, AString),
    Keyword(Atom),
    Larger(u32),
    New,
    Not(Box<SearchKey>),
    Old,
    On(NaiveDate),
    Or(Box<SearchKey>, Box<SearchKey>),
    Recent,
    Seen,
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Since(NaiveDate),
    Smaller(u32),
    Subject(AString),
    Text(AString),
    To(AString),
    Uid(SequenceSet),
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword(Atom),
    Unseen,
}

// Parenthesized lists and NOT/OR nest; bound the recursion instead of
// trusting the client.
const MAX_SEARCH_DEPTH: usize = 16;

pub(crate) fn search_key(input: &[u8]) -> ImapResult<'_, SearchKey> {
    search_key_limited(input, MAX_SEARCH_DEPTH)
}

fn search_key_limited(input: &[u8], depth: usize) -> ImapResult<'_, SearchKey> {
    if depth == 0 {
        return Err(nom::Err::Failure(ImapParseError {
            input,
            kind: ImapErrorKind::Recursion,
        }));
    }
    let nested = move |input| search_key_limited(input, depth - 1);

    alt((
        alt((
            value(SearchKey::Answered, tag_no_case(b"ANSWERED")),
            value(SearchKey::All, tag_no_case(b"ALL")),
            map(preceded(tag_no_case(b"BCC "), astring), SearchKey::Bcc),
            map(preceded(tag_no_case(b"BEFORE "), date), SearchKey::Before),
            map(preceded(tag_no_case(b"BODY "), astring), SearchKey::Body),
            map(preceded(tag_no_case(b"CC "), astring), SearchKey::Cc),
            value(SearchKey::Deleted, tag_no_case(b"DELETED")),
            value(SearchKey::Draft, tag_no_case(b"DRAFT")),
            value(SearchKey::Flagged, tag_no_case(b"FLAGGED")),
            map(preceded(tag_no_case(b"FROM "), astring), SearchKey::From),
            map(
                preceded(tag_no_case(b"HEADER "), tuple((astring, sp, astring))),
                |(name, _, value)| SearchKey::Header(name, value),
            ),
            map(preceded(tag_no_case(b"KEYWORD "), atom), SearchKey::Keyword),
            map(preceded(tag_no_case(b"LARGER "), number), SearchKey::Larger),
            value(SearchKey::New, tag_no_case(b"NEW")),
        )),
        alt((
            map(preceded(tag_no_case(b"NOT "), nested), |inner| {
                SearchKey::Not(Box::new(inner))
            }),
            value(SearchKey::Old, tag_no_case(b"OLD")),
            map(preceded(tag_no_case(b"ON "), date), SearchKey::On),
            map(
                preceded(tag_no_case(b"OR "), tuple((nested, sp, nested))),
                |(left, _, right)| SearchKey::Or(Box::new(left), Box::new(right)),
            ),
            value(SearchKey::Recent, tag_no_case(b"RECENT")),
            value(SearchKey::Seen, tag_no_case(b"SEEN")),
            map(
                preceded(tag_no_case(b"SENTBEFORE "), date),
                SearchKey::SentBefore,
            ),
            map(preceded(tag_no_case(b"SENTON "), date), SearchKey::SentOn),
            map(
                preceded(tag_no_case(b"SENTSINCE "), date),
                SearchKey::SentSince,
            ),
            map(preceded(tag_no_case(b"SINCE "), date), SearchKey::Since),
            map(
                preceded(tag_no_case(b"SMALLER "), number),
                SearchKey::Smaller,
            ),
            map(
                preceded(tag_no_case(b"SUBJECT "), astring),
                SearchKey::Subject,
            ),
            map(preceded(tag_no_case(b"TEXT "), astring), SearchKey::Text),
            map(preceded(tag_no_case(b"TO "), astring), SearchKey::To),
        )),
        alt((
            value(SearchKey::Unanswered, tag_no_case(b"UNANSWERED")),
            value(SearchKey::Undeleted, tag_no_case(b"UNDELETED")),
            value(SearchKey::Undraft, tag_no_case(b"UNDRAFT")),
            value(SearchKey::Unflagged, tag_no_case(b"UNFLAGGED")),
            map(
                preceded(tag_no_case(b"UNKEYWORD "), atom),
                SearchKey::Unkeyword,
            ),
            value(SearchKey::Unseen, tag_no_case(b"UNSEEN")),
            map(preceded(tag_no_case(b"UID "), sequence_set), SearchKey::Uid),
            map(sequence_set, SearchKey::SequenceSet),
            map(
                delimited(
                    tag(b"("),
                    separated_list1(sp, nested),
                    tag(b")"),
                ),
                |keys| {
                    // Safety: `separated_list1` yields at least one element.
                    SearchKey::And(Vec1::try_from(keys).unwrap())
                },
            ),
        )),
    ))(input)
}

/// Parse the wire form of a single key, e.g. `"OR SEEN FLAGGED"`.
impl TryFrom<&str> for SearchKey {
    type Error = SearchKeyParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // The grammar is streaming; a trailing space terminates it.
        let input = format!("{} ", value);
        match search_key(input.as_bytes()) {
            Ok((rem, key)) if rem == b" " => Ok(key),
            _ => Err(SearchKeyParseError),
        }
    }
}

#[derive(Clone, Debug, Eq, thiserror::Error, PartialEq)]
#[error("Invalid search key")]
pub struct SearchKeyParseError;

/// The key list after `SEARCH [CHARSET ...]`; implicit AND.
pub(crate) fn search_key_list(input: &[u8]) -> ImapResult<'_, Vec1<SearchKey>> {
    map(separated_list1(sp, search_key), |keys| {
        // Safety: `separated_list1` yields at least one element.
        Vec1::try_from(keys).unwrap()
    })(input)
}
