//! STATUS data items (RFC 3501 §6.3.10).

use std::fmt;
use std::num::NonZeroU32;

use nom::{branch::alt, bytes::streaming::tag_no_case, combinator::value};

use crate::decode::ImapResult;

/// `status-att`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDataItemName {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

/// `status-att-list` member with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDataItem {
    Messages(u32),
    Recent(u32),
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(u32),
}

impl fmt::Display for StatusDataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Messages(n) => write!(f, "MESSAGES {}", n),
            Self::Recent(n) => write!(f, "RECENT {}", n),
            Self::UidNext(n) => write!(f, "UIDNEXT {}", n),
            Self::UidValidity(n) => write!(f, "UIDVALIDITY {}", n),
            Self::Unseen(n) => write!(f, "UNSEEN {}", n),
        }
    }
}

/// `status-att = "MESSAGES" / "RECENT" / "UIDNEXT" / "UIDVALIDITY" / "UNSEEN"`
pub(crate) fn status_att(input: &[u8]) -> ImapResult<'_, StatusDataItemName> {
    alt((
        value(StatusDataItemName::Messages, tag_no_case(b"MESSAGES")),
        value(StatusDataItemName::Recent, tag_no_case(b"RECENT")),
        value(StatusDataItemName::UidNext, tag_no_case(b"UIDNEXT")),
        value(
            StatusDataItemName::UidValidity,
            tag_no_case(b"UIDVALIDITY"),
        ),
        value(StatusDataItemName::Unseen, tag_no_case(b"UNSEEN")),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_att() {
        let (_, item) = status_att(b"MESSAGES ").unwrap();
        assert_eq!(item, StatusDataItemName::Messages);

        let (_, item) = status_att(b"uidvalidity ").unwrap();
        assert_eq!(item, StatusDataItemName::UidValidity);
    }
}
