//! Flags and flag-adjacent types (RFC 3501 §2.3.2).

use std::fmt;

use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt, value},
    multi::separated_list0,
    sequence::{delimited, preceded, tuple},
};

use crate::core::{atom, sp, Atom};
use crate::decode::ImapResult;

/// A message flag: a system flag, a `\`-prefixed extension, or a keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    /// `\`-prefixed flag outside the system set.
    Extension(Atom),
    Keyword(Atom),
}

impl Flag {
    pub fn system(atom: Atom) -> Self {
        match atom.inner().to_ascii_lowercase().as_str() {
            "seen" => Self::Seen,
            "answered" => Self::Answered,
            "flagged" => Self::Flagged,
            "deleted" => Self::Deleted,
            "draft" => Self::Draft,
            _ => Self::Extension(atom),
        }
    }

    pub fn keyword(atom: Atom) -> Self {
        Self::Keyword(atom)
    }

    /// Parse the backend's string form (`\Seen`, `MyKeyword`, ...).
    ///
    /// `\Recent` is not a [`Flag`]; it only exists in FETCH data.
    pub fn from_str(f: &str) -> Option<Self> {
        match f.strip_prefix('\\') {
            Some(rest) => Atom::try_from(rest).ok().map(Self::system),
            None => Atom::try_from(f).ok().map(Self::Keyword),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seen => f.write_str("\\Seen"),
            Self::Answered => f.write_str("\\Answered"),
            Self::Flagged => f.write_str("\\Flagged"),
            Self::Deleted => f.write_str("\\Deleted"),
            Self::Draft => f.write_str("\\Draft"),
            Self::Extension(a) => write!(f, "\\{}", a),
            Self::Keyword(a) => write!(f, "{}", a),
        }
    }
}

/// `flag-fetch = flag / "\Recent"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagFetch {
    Flag(Flag),
    Recent,
}

impl FlagFetch {
    /// Parse the backend's string form, `\Recent` included.
    pub fn from_str(f: &str) -> Option<Self> {
        if f.eq_ignore_ascii_case("\\recent") {
            return Some(Self::Recent);
        }
        Flag::from_str(f).map(Self::Flag)
    }
}

impl fmt::Display for FlagFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => flag.fmt(f),
            Self::Recent => f.write_str("\\Recent"),
        }
    }
}

/// `flag-perm = flag / "\*"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagPerm {
    Flag(Flag),
    Asterisk,
}

impl fmt::Display for FlagPerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => flag.fmt(f),
            Self::Asterisk => f.write_str("\\*"),
        }
    }
}

/// Mailbox name attributes in LIST/LSUB rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagNameAttribute {
    Noinferiors,
    Noselect,
    Marked,
    Unmarked,
    /// CHILDREN (RFC 3348) and friends.
    Extension(Atom),
}

impl fmt::Display for FlagNameAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noinferiors => f.write_str("\\Noinferiors"),
            Self::Noselect => f.write_str("\\Noselect"),
            Self::Marked => f.write_str("\\Marked"),
            Self::Unmarked => f.write_str("\\Unmarked"),
            Self::Extension(a) => write!(f, "\\{}", a),
        }
    }
}

impl From<Atom> for FlagNameAttribute {
    fn from(atom: Atom) -> Self {
        match atom.inner().to_ascii_lowercase().as_str() {
            "noinferiors" => Self::Noinferiors,
            "noselect" => Self::Noselect,
            "marked" => Self::Marked,
            "unmarked" => Self::Unmarked,
            _ => Self::Extension(atom),
        }
    }
}

/// `STORE` operation kind (`FLAGS`, `+FLAGS`, `-FLAGS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Replace,
    Add,
    Remove,
}

/// Whether `STORE` answers with untagged FETCH data (`.SILENT` suffix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResponse {
    Answer,
    Silent,
}

// ----- parsers -----

/// `flag = "\Answered" / "\Flagged" / "\Deleted" / "\Seen" / "\Draft" / flag-keyword / flag-extension`
pub(crate) fn flag(input: &[u8]) -> ImapResult<'_, Flag> {
    alt((
        map(preceded(tag(b"\\"), atom), Flag::system),
        map(atom, Flag::keyword),
    ))(input)
}

/// `flag-list = "(" [flag *(SP flag)] ")"`
pub(crate) fn flag_list(input: &[u8]) -> ImapResult<'_, Vec<Flag>> {
    delimited(tag(b"("), separated_list0(sp, flag), tag(b")"))(input)
}

/// `store-att-flags = (["+" / "-"] "FLAGS" [".SILENT"]) SP (flag-list / (flag *(SP flag)))`
pub(crate) fn store_att_flags(
    input: &[u8],
) -> ImapResult<'_, (StoreType, StoreResponse, Vec<Flag>)> {
    let (rem, ((kind, response), _, flags)) = tuple((
        tuple((
            map(
                opt(alt((
                    value(StoreType::Add, tag(b"+")),
                    value(StoreType::Remove, tag(b"-")),
                ))),
                |kind| kind.unwrap_or(StoreType::Replace),
            ),
            map(
                tuple((tag_no_case(b"FLAGS"), opt(tag_no_case(b".SILENT")))),
                |(_, silent)| match silent {
                    Some(_) => StoreResponse::Silent,
                    None => StoreResponse::Answer,
                },
            ),
        )),
        sp,
        alt((flag_list, separated_list0(sp, flag))),
    ))(input)?;

    Ok((rem, (kind, response, flags)))
}
