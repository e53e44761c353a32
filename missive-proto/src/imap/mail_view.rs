//! Per-message FETCH construction: turns a loaded message and its index
//! entry into `msg-att` items.

use anyhow::{anyhow, bail, Result};
use chrono::Offset;

use eml_codec::{
    imf,
    part::{composite::Message, AnyPart},
};

use missive_backend::MessageData;
use missive_imap::core::NString;
use missive_imap::datetime::DateTime;
use missive_imap::envelope::{Address, Envelope};
use missive_imap::fetch::{MessageDataItem, Section};
use missive_imap::response::Data;

use crate::imap::attributes::AttributesProxy;
use crate::imap::flags;
use crate::imap::index::MailIndex;
use crate::imap::response::Body;

pub enum SeenFlag {
    DoNothing,
    MustAdd,
}

pub struct MailView<'a> {
    pub in_idx: &'a MailIndex<'a>,
    pub data: &'a MessageData,
    pub is_recent: bool,
    pub content: FetchedMail<'a>,
}

impl<'a> MailView<'a> {
    pub fn new(
        data: &'a MessageData,
        in_idx: &'a MailIndex<'a>,
        is_recent: bool,
    ) -> Result<MailView<'a>> {
        let content = match &data.content {
            Some(content) => {
                let (_, parsed) =
                    eml_codec::parse_message(content).or(Err(anyhow!("invalid mail body")))?;
                FetchedMail::new_from_message(parsed)
            }
            None => {
                let (_, parsed) = eml_codec::parse_imf(&data.headers)
                    .or(Err(anyhow!("unable to parse email headers")))?;
                FetchedMail::Partial(parsed)
            }
        };
        Ok(Self {
            in_idx,
            data,
            is_recent,
            content,
        })
    }

    pub fn filter(&self, ap: &AttributesProxy) -> Result<(Body, SeenFlag)> {
        let mut seen = SeenFlag::DoNothing;
        let res_attrs = ap
            .attrs
            .iter()
            .map(|attr| {
                use missive_imap::fetch::MessageDataItemName::*;
                match attr {
                    Uid => Ok(self.uid()),
                    Flags => Ok(self.flags()),
                    Rfc822Size => Ok(self.rfc_822_size()),
                    Rfc822Header => self.rfc_822_header(),
                    Rfc822Text => self.rfc_822_text(),
                    Rfc822 => self.rfc822(),
                    Envelope => Ok(self.envelope()),
                    InternalDate => Ok(self.internal_date()),
                    BodyExt {
                        section,
                        partial,
                        peek,
                    } => {
                        let (body, has_seen) = self.body_ext(section, partial, peek)?;
                        seen = has_seen;
                        Ok(body)
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            Body::Data(Data::Fetch {
                seq: self.in_idx.i,
                items: res_attrs.try_into()?,
            }),
            seen,
        ))
    }

    fn uid(&self) -> MessageDataItem {
        MessageDataItem::Uid(self.in_idx.uid)
    }

    fn flags(&self) -> MessageDataItem {
        MessageDataItem::Flags(flags::fetch_flags(self.in_idx.flags, self.is_recent))
    }

    fn rfc_822_size(&self) -> MessageDataItem {
        MessageDataItem::Rfc822Size(self.data.rfc822_size as u32)
    }

    fn rfc_822_header(&self) -> Result<MessageDataItem> {
        let hdrs: NString = self.data.headers.to_vec().try_into()?;
        Ok(MessageDataItem::Rfc822Header(hdrs))
    }

    fn rfc_822_text(&self) -> Result<MessageDataItem> {
        let txt: NString = self.content.as_full()?.raw_body.to_vec().try_into()?;
        Ok(MessageDataItem::Rfc822Text(txt))
    }

    fn rfc822(&self) -> Result<MessageDataItem> {
        let full: NString = self.content.as_full()?.raw_part.to_vec().try_into()?;
        Ok(MessageDataItem::Rfc822(full))
    }

    fn envelope(&self) -> MessageDataItem {
        MessageDataItem::Envelope(message_envelope(self.content.imf()))
    }

    fn internal_date(&self) -> MessageDataItem {
        let dt = self
            .data
            .internaldate
            .with_timezone(&chrono::Utc.fix());
        MessageDataItem::InternalDate(DateTime::unvalidated(dt))
    }

    /// `BODY[<section>]<<partial>>`; `.PEEK` does not set `\Seen`.
    fn body_ext(
        &self,
        section: &Option<Section>,
        partial: &Option<(u32, std::num::NonZeroU32)>,
        peek: &bool,
    ) -> Result<(MessageDataItem, SeenFlag)> {
        let mut seen = SeenFlag::DoNothing;
        if !peek && !self.in_idx.is_flag_set("\\Seen") {
            seen = SeenFlag::MustAdd;
        }

        let full_section: Vec<u8> = match section {
            None => self.content.as_full()?.raw_part.to_vec(),
            Some(Section::Header) => self.data.headers.to_vec(),
            Some(Section::HeaderFields(fields)) => {
                let names = field_names(fields.as_ref());
                filter_header_fields(&self.data.headers, &names, false)
            }
            Some(Section::HeaderFieldsNot(fields)) => {
                let names = field_names(fields.as_ref());
                filter_header_fields(&self.data.headers, &names, true)
            }
            Some(Section::Text) => self.content.as_full()?.raw_body.to_vec(),
        };

        let (data, origin) = match partial {
            None => (full_section, None),
            Some((begin, count)) => {
                let begin = (*begin as usize).min(full_section.len());
                let end = begin.saturating_add(count.get() as usize).min(full_section.len());
                (full_section[begin..end].to_vec(), Some(begin as u32))
            }
        };

        Ok((
            MessageDataItem::BodyExt {
                section: section.clone(),
                origin,
                data: data.try_into()?,
            },
            seen,
        ))
    }
}

fn field_names(fields: &[missive_imap::core::AString]) -> Vec<Vec<u8>> {
    fields
        .iter()
        .map(|name| name.as_bytes().to_ascii_lowercase())
        .collect()
}

/// Select (or reject) logical header lines by field name, preserving the
/// delimiting blank line.
pub fn filter_header_fields(headers: &[u8], names: &[Vec<u8>], negate: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut keep = false;

    for line in split_header_lines(headers) {
        let continuation = line.first().map_or(false, |b| *b == b' ' || *b == b'\t');
        if !continuation {
            keep = match line.iter().position(|b| *b == b':') {
                Some(colon) => {
                    let name = line[..colon].to_ascii_lowercase();
                    names.contains(&name) != negate
                }
                None => false,
            };
        }
        if keep {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b"\r\n");
    out
}

fn split_header_lines(headers: &[u8]) -> impl Iterator<Item = &[u8]> {
    headers.split(|b| *b == b'\n').filter_map(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    })
}

/// Envelope rules of RFC 3501 §7.4.2: absent Sender/Reply-To fall back
/// to From; the other members are NIL when their header is absent.
pub fn message_envelope(msg: &imf::Imf) -> Envelope {
    let from = msg.from.iter().map(convert_mbx).collect::<Vec<_>>();

    Envelope {
        date: NString(
            msg.date
                .as_ref()
                .and_then(|d| d.to_rfc3339().try_into().ok()),
        ),
        subject: NString(
            msg.subject
                .as_ref()
                .and_then(|d| d.to_string().try_into().ok()),
        ),
        sender: msg
            .sender
            .as_ref()
            .map(|v| vec![convert_mbx(v)])
            .unwrap_or(from.clone()),
        reply_to: if msg.reply_to.is_empty() {
            from.clone()
        } else {
            convert_addresses(&msg.reply_to)
        },
        from,
        to: convert_addresses(&msg.to),
        cc: convert_addresses(&msg.cc),
        bcc: convert_addresses(&msg.bcc),
        in_reply_to: NString(
            msg.in_reply_to
                .iter()
                .next()
                .and_then(|d| d.to_string().try_into().ok()),
        ),
        message_id: NString(
            msg.msg_id
                .as_ref()
                .and_then(|d| d.to_string().try_into().ok()),
        ),
    }
}

pub fn convert_addresses(addrlist: &Vec<imf::address::AddressRef>) -> Vec<Address> {
    let mut acc = vec![];
    for item in addrlist {
        match item {
            imf::address::AddressRef::Single(a) => acc.push(convert_mbx(a)),
            imf::address::AddressRef::Many(l) => {
                acc.extend(l.participants.iter().map(convert_mbx))
            }
        }
    }
    acc
}

pub fn convert_mbx(addr: &imf::mailbox::MailboxRef) -> Address {
    Address {
        name: NString(
            addr.name
                .as_ref()
                .and_then(|x| x.to_string().try_into().ok()),
        ),
        // SMTP at-domain-list (source route) is long obsolete.
        adl: NString(None),
        mailbox: NString(addr.addrspec.local_part.to_string().try_into().ok()),
        host: NString(addr.addrspec.domain.to_string().try_into().ok()),
    }
}

// -------------------

pub enum FetchedMail<'a> {
    Partial(imf::Imf<'a>),
    Full(AnyPart<'a>),
}

impl<'a> FetchedMail<'a> {
    pub fn new_from_message(msg: Message<'a>) -> Self {
        Self::Full(AnyPart::Msg(msg))
    }

    fn as_full(&self) -> Result<&Message<'a>> {
        match self {
            FetchedMail::Full(AnyPart::Msg(message)) => Ok(message),
            _ => bail!("the full message was not fetched, only its headers"),
        }
    }

    fn imf(&self) -> &imf::Imf<'a> {
        match self {
            FetchedMail::Full(AnyPart::Msg(message)) => &message.imf,
            FetchedMail::Partial(imf) => imf,
            FetchedMail::Full(_) => unreachable!("messages always parse as AnyPart::Msg"),
        }
    }
}
