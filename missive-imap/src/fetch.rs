//! FETCH attributes: requested item names and returned data items.

use std::num::NonZeroU32;

use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt, value},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
};

use crate::core::{astring, nz_number, number, sp, AString, NString, Vec1};
use crate::datetime::DateTime;
use crate::decode::ImapResult;
use crate::envelope::Envelope;
use crate::flag::FlagFetch;

/// `fetch-att` (request side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDataItemName {
    Flags,
    InternalDate,
    Rfc822,
    Rfc822Header,
    Rfc822Size,
    Rfc822Text,
    Envelope,
    Uid,
    /// `BODY[<section>]<<partial>>`, `.PEEK` variant included.
    BodyExt {
        section: Option<Section>,
        partial: Option<(u32, NonZeroU32)>,
        peek: bool,
    },
}

/// `section-spec` (restricted to the whole-message forms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Header,
    HeaderFields(Vec1<AString>),
    HeaderFieldsNot(Vec1<AString>),
    Text,
}

/// `"ALL" / "FULL" / "FAST"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Macro {
    All,
    Fast,
    Full,
}

impl Macro {
    pub fn expand(&self) -> Vec<MessageDataItemName> {
        use MessageDataItemName::*;
        match self {
            Self::All => vec![Flags, InternalDate, Rfc822Size, Envelope],
            Self::Fast => vec![Flags, InternalDate, Rfc822Size],
            // Body structure is not served, FULL degrades to ALL.
            Self::Full => vec![Flags, InternalDate, Rfc822Size, Envelope],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroOrMessageDataItemNames {
    Macro(Macro),
    MessageDataItemNames(Vec<MessageDataItemName>),
}

/// `msg-att` (response side)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDataItem {
    Flags(Vec<FlagFetch>),
    InternalDate(DateTime),
    Rfc822(NString),
    Rfc822Header(NString),
    Rfc822Size(u32),
    Rfc822Text(NString),
    Envelope(Envelope),
    Uid(NonZeroU32),
    BodyExt {
        section: Option<Section>,
        origin: Option<u32>,
        data: NString,
    },
}

// ----- parsers -----

/// `header-list = "(" header-fld-name *(SP header-fld-name) ")"`
fn header_list(input: &[u8]) -> ImapResult<'_, Vec1<AString>> {
    map(
        delimited(tag(b"("), separated_list1(sp, astring), tag(b")")),
        |fields| {
            // Safety: `separated_list1` yields at least one element.
            Vec1::try_from(fields).unwrap()
        },
    )(input)
}

/// `section = "[" [section-spec] "]"`
fn section(input: &[u8]) -> ImapResult<'_, Option<Section>> {
    delimited(
        tag(b"["),
        opt(alt((
            map(
                preceded(tag_no_case(b"HEADER.FIELDS.NOT "), header_list),
                Section::HeaderFieldsNot,
            ),
            map(
                preceded(tag_no_case(b"HEADER.FIELDS "), header_list),
                Section::HeaderFields,
            ),
            value(Section::Header, tag_no_case(b"HEADER")),
            value(Section::Text, tag_no_case(b"TEXT")),
        ))),
        tag(b"]"),
    )(input)
}

/// `partial = "<" number "." nz-number ">"`
fn partial(input: &[u8]) -> ImapResult<'_, (u32, NonZeroU32)> {
    delimited(
        tag(b"<"),
        map(
            tuple((number, tag(b"."), nz_number)),
            |(origin, _, count)| (origin, count),
        ),
        tag(b">"),
    )(input)
}

/// `fetch-att` (without the unsupported BODYSTRUCTURE forms)
pub(crate) fn fetch_att(input: &[u8]) -> ImapResult<'_, MessageDataItemName> {
    alt((
        value(MessageDataItemName::Envelope, tag_no_case(b"ENVELOPE")),
        value(MessageDataItemName::Flags, tag_no_case(b"FLAGS")),
        value(
            MessageDataItemName::InternalDate,
            tag_no_case(b"INTERNALDATE"),
        ),
        value(
            MessageDataItemName::Rfc822Header,
            tag_no_case(b"RFC822.HEADER"),
        ),
        value(MessageDataItemName::Rfc822Size, tag_no_case(b"RFC822.SIZE")),
        value(MessageDataItemName::Rfc822Text, tag_no_case(b"RFC822.TEXT")),
        value(MessageDataItemName::Rfc822, tag_no_case(b"RFC822")),
        value(MessageDataItemName::Uid, tag_no_case(b"UID")),
        map(
            tuple((tag_no_case(b"BODY.PEEK"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: true,
            },
        ),
        map(
            tuple((tag_no_case(b"BODY"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: false,
            },
        ),
    ))(input)
}

/// `"ALL" / "FULL" / "FAST" / fetch-att / "(" fetch-att *(SP fetch-att) ")"`
pub(crate) fn macro_or_fetch_atts(input: &[u8]) -> ImapResult<'_, MacroOrMessageDataItemNames> {
    alt((
        value(
            MacroOrMessageDataItemNames::Macro(Macro::All),
            tag_no_case(b"ALL"),
        ),
        value(
            MacroOrMessageDataItemNames::Macro(Macro::Full),
            tag_no_case(b"FULL"),
        ),
        value(
            MacroOrMessageDataItemNames::Macro(Macro::Fast),
            tag_no_case(b"FAST"),
        ),
        map(
            delimited(tag(b"("), separated_list1(sp, fetch_att), tag(b")")),
            MacroOrMessageDataItemNames::MessageDataItemNames,
        ),
        map(fetch_att, |att| {
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![att])
        }),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_att_simple() {
        let (_, att) = fetch_att(b"FLAGS ").unwrap();
        assert_eq!(att, MessageDataItemName::Flags);

        let (_, att) = fetch_att(b"rfc822.size ").unwrap();
        assert_eq!(att, MessageDataItemName::Rfc822Size);
    }

    #[test]
    fn test_fetch_att_body_sections() {
        let (_, att) = fetch_att(b"BODY[] ").unwrap();
        assert_eq!(
            att,
            MessageDataItemName::BodyExt {
                section: None,
                partial: None,
                peek: false,
            }
        );

        let (_, att) = fetch_att(b"BODY.PEEK[HEADER] ").unwrap();
        assert_eq!(
            att,
            MessageDataItemName::BodyExt {
                section: Some(Section::Header),
                partial: None,
                peek: true,
            }
        );

        let (_, att) = fetch_att(b"BODY[TEXT]<0.2048> ").unwrap();
        assert_eq!(
            att,
            MessageDataItemName::BodyExt {
                section: Some(Section::Text),
                partial: Some((0, NonZeroU32::new(2048).unwrap())),
                peek: false,
            }
        );
    }

    #[test]
    fn test_fetch_att_header_fields() {
        let (_, att) = fetch_att(b"BODY[HEADER.FIELDS (DATE FROM)] ").unwrap();
        match att {
            MessageDataItemName::BodyExt {
                section: Some(Section::HeaderFields(fields)),
                ..
            } => assert_eq!(fields.as_ref().len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_macro_or_list() {
        let (_, atts) = macro_or_fetch_atts(b"FAST ").unwrap();
        assert_eq!(atts, MacroOrMessageDataItemNames::Macro(Macro::Fast));

        let (_, atts) = macro_or_fetch_atts(b"(FLAGS UID) ").unwrap();
        assert_eq!(
            atts,
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![
                MessageDataItemName::Flags,
                MessageDataItemName::Uid,
            ])
        );
    }
}
