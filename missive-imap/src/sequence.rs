//! Message sequence sets (RFC 3501 §9, `sequence-set`).

use std::num::NonZeroU32;

use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::{map, value},
    multi::separated_list1,
    sequence::tuple,
};

use crate::core::{nz_number, Vec1, Vec1Error};
use crate::decode::ImapResult;

/// `seq-number = nz-number / "*"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqOrUid {
    Value(NonZeroU32),
    Asterisk,
}

impl SeqOrUid {
    /// Resolve `*` against the largest number in the mailbox.
    pub fn expand(&self, largest: NonZeroU32) -> NonZeroU32 {
        match self {
            Self::Value(value) => *value,
            Self::Asterisk => largest,
        }
    }
}

/// `seq-range = seq-number ":" seq-number`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Single(SeqOrUid),
    Range(SeqOrUid, SeqOrUid),
}

/// `sequence-set = (seq-number / seq-range) *("," (seq-number / seq-range))`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceSet(pub Vec1<Sequence>);

impl SequenceSet {
    /// Everything: `1:*`.
    pub fn all() -> Self {
        Self(Vec1::from(Sequence::Range(
            SeqOrUid::Value(NonZeroU32::MIN),
            SeqOrUid::Asterisk,
        )))
    }

    /// Expand against the largest number currently in use.
    ///
    /// Values are yielded in set order, ranges ascending regardless of the
    /// order their endpoints were written in (`4:2` equals `2:4`). Values
    /// above `largest` coming from explicit endpoints are yielded as-is;
    /// filtering nonexistent entries is the index's business.
    pub fn iter(&self, largest: NonZeroU32) -> impl Iterator<Item = NonZeroU32> + '_ {
        self.0.as_ref().iter().flat_map(move |seq| {
            let (from, to) = match seq {
                Sequence::Single(x) => (x.expand(largest), x.expand(largest)),
                Sequence::Range(x, y) => {
                    let (x, y) = (x.expand(largest), y.expand(largest));
                    if x <= y {
                        (x, y)
                    } else {
                        (y, x)
                    }
                }
            };
            (from.get()..=to.get()).map(|value| {
                // Safety: the range starts at a non-zero value.
                NonZeroU32::new(value).unwrap()
            })
        })
    }

    /// Whether `value` is covered, `*` standing for `largest`.
    pub fn contains(&self, value: NonZeroU32, largest: NonZeroU32) -> bool {
        self.0.as_ref().iter().any(|seq| match seq {
            Sequence::Single(x) => x.expand(largest) == value,
            Sequence::Range(x, y) => {
                let (x, y) = (x.expand(largest), y.expand(largest));
                let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
                lo <= value && value <= hi
            }
        })
    }
}

impl From<Sequence> for SequenceSet {
    fn from(seq: Sequence) -> Self {
        Self(Vec1::from(seq))
    }
}

/// Parse the wire form, e.g. `"1,3:5,8:*"`.
impl TryFrom<&str> for SequenceSet {
    type Error = SequenceSetParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // The grammar is streaming; a trailing space terminates it.
        let input = format!("{} ", value);
        match sequence_set(input.as_bytes()) {
            Ok((rem, set)) if rem == b" " => Ok(set),
            _ => Err(SequenceSetParseError),
        }
    }
}

#[derive(Clone, Debug, Eq, thiserror::Error, PartialEq)]
#[error("Invalid sequence set")]
pub struct SequenceSetParseError;

impl TryFrom<Vec<Sequence>> for SequenceSet {
    type Error = Vec1Error;

    fn try_from(value: Vec<Sequence>) -> Result<Self, Self::Error> {
        Ok(Self(Vec1::try_from(value)?))
    }
}

// ----- parsers -----

/// `seq-number = nz-number / "*"`
fn seq_number(input: &[u8]) -> ImapResult<'_, SeqOrUid> {
    alt((
        map(nz_number, SeqOrUid::Value),
        value(SeqOrUid::Asterisk, tag(b"*")),
    ))(input)
}

/// `seq-range = seq-number ":" seq-number`
fn seq_range(input: &[u8]) -> ImapResult<'_, Sequence> {
    map(
        tuple((seq_number, tag(b":"), seq_number)),
        |(from, _, to)| Sequence::Range(from, to),
    )(input)
}

/// `sequence-set = (seq-number / seq-range) *("," (seq-number / seq-range))`
pub(crate) fn sequence_set(input: &[u8]) -> ImapResult<'_, SequenceSet> {
    map(
        separated_list1(tag(b","), alt((seq_range, map(seq_number, Sequence::Single)))),
        |seqs| {
            // Safety: `separated_list1` yields at least one element.
            SequenceSet(Vec1::try_from(seqs).unwrap())
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn expand(spec: &[u8], largest: u32) -> Vec<u32> {
        let (_, set) = sequence_set(spec).unwrap();
        set.iter(nz(largest)).map(NonZeroU32::get).collect()
    }

    #[test]
    fn test_parse_shapes() {
        assert!(sequence_set(b"1 ").is_ok());
        assert!(sequence_set(b"1:* ").is_ok());
        assert!(sequence_set(b"1,3:5,8 ").is_ok());
        assert!(sequence_set(b"* ").is_ok());
        assert!(sequence_set(b"0 ").is_err());
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand(b"1,3:5 ", 10), vec![1, 3, 4, 5]);
        assert_eq!(expand(b"8:* ", 10), vec![8, 9, 10]);
        assert_eq!(expand(b"* ", 3), vec![3]);
        // Reversed endpoints normalize.
        assert_eq!(expand(b"5:3 ", 10), vec![3, 4, 5]);
    }

    #[test]
    fn test_star_collapses_when_largest_is_low() {
        // 8:* with a 3-message mailbox means 3:8.
        assert_eq!(expand(b"8:* ", 3), vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_contains() {
        let (_, set) = sequence_set(b"2:* ").unwrap();
        assert!(set.contains(nz(2), nz(9)));
        assert!(set.contains(nz(9), nz(9)));
        assert!(!set.contains(nz(1), nz(9)));
    }
}
