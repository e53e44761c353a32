//! Mailbox names, including the modified UTF-7 encoding of RFC 3501 §5.1.3.

use std::str::from_utf8;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use nom::{branch::alt, combinator::map};
use thiserror::Error;

use crate::core::{astring, is, string, token1, AString, IString, LIST};
use crate::decode::ImapResult;

/// `mailbox = "INBOX" / astring`
///
/// INBOX is case-insensitive on the wire and normalized here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mailbox {
    Inbox,
    Other(MailboxOther),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxOther(pub(crate) AString);

impl MailboxOther {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<AString> for Mailbox {
    fn from(astr: AString) -> Self {
        if astr.as_bytes().eq_ignore_ascii_case(b"INBOX") {
            Self::Inbox
        } else {
            Self::Other(MailboxOther(astr))
        }
    }
}

impl Mailbox {
    /// Decode the wire name into the user-visible UTF-8 name.
    pub fn to_utf8(&self) -> Result<String, Utf7Error> {
        match self {
            Self::Inbox => Ok("INBOX".to_owned()),
            Self::Other(other) => {
                let raw = from_utf8(other.as_bytes()).map_err(|_| Utf7Error::NotAscii)?;
                utf7_decode(raw)
            }
        }
    }

    /// Encode a user-visible UTF-8 name into its wire form.
    pub fn from_utf8(name: &str) -> Result<Self, MailboxError> {
        if name.eq_ignore_ascii_case("INBOX") {
            return Ok(Self::Inbox);
        }
        let encoded = utf7_encode(name);
        let astr = AString::try_from(encoded.as_str()).map_err(|_| MailboxError::Unencodable)?;
        Ok(Self::Other(MailboxOther(astr)))
    }
}

impl TryFrom<&str> for Mailbox {
    type Error = MailboxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let astr = AString::try_from(value).map_err(|_| MailboxError::Unencodable)?;
        Ok(Self::from(astr))
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MailboxError {
    #[error("Mailbox name can not be encoded")]
    Unencodable,
}

/// `list-mailbox = 1*list-char / string`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListMailbox {
    Token(ListCharString),
    String(IString),
}

impl ListMailbox {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Token(t) => t.0.as_bytes(),
            Self::String(s) => s.as_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListCharString(pub(crate) String);

impl ListCharString {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), MailboxError> {
        let value = value.as_ref();
        if value.is_empty() || value.iter().any(|b| !is(*b, LIST)) {
            return Err(MailboxError::Unencodable);
        }
        Ok(())
    }

    pub fn unvalidated(inner: impl Into<String>) -> Self {
        let inner = inner.into();
        #[cfg(debug_assertions)]
        Self::verify(inner.as_bytes()).unwrap();
        Self(inner)
    }
}

impl TryFrom<&str> for ListMailbox {
    type Error = MailboxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !value.is_empty() && ListCharString::verify(value).is_ok() {
            return Ok(Self::Token(ListCharString(value.to_owned())));
        }
        IString::try_from(value)
            .map(Self::String)
            .map_err(|_| MailboxError::Unencodable)
    }
}

// ----- modified UTF-7 -----

// RFC 3501 modified BASE64: standard alphabet with "," for "/", no padding.
const MUTF7: GeneralPurpose = GeneralPurpose::new(
    &alphabet::IMAP_MUTF7,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Utf7Error {
    #[error("Encoded name contains a non-ASCII byte")]
    NotAscii,
    #[error("Shift sequence is missing its terminating '-'")]
    UnterminatedShift,
    #[error("Invalid modified BASE64 in shift sequence")]
    BadBase64,
    #[error("Shift sequence does not decode to UTF-16")]
    BadUtf16,
}

/// Encode a Unicode mailbox name into modified UTF-7.
pub fn utf7_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut shifted: Vec<u16> = Vec::new();

    let mut flush = |out: &mut String, shifted: &mut Vec<u16>| {
        if shifted.is_empty() {
            return;
        }
        let bytes: Vec<u8> = shifted.iter().flat_map(|unit| unit.to_be_bytes()).collect();
        out.push('&');
        out.push_str(&MUTF7.encode(bytes));
        out.push('-');
        shifted.clear();
    };

    for c in name.chars() {
        if (' '..='~').contains(&c) {
            flush(&mut out, &mut shifted);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut buf = [0u16; 2];
            shifted.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut shifted);

    out
}

/// Decode a modified UTF-7 mailbox name back into Unicode.
pub fn utf7_decode(encoded: &str) -> Result<String, Utf7Error> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();

    while let Some(c) = chars.next() {
        if c == '&' {
            let mut b64 = String::new();
            loop {
                match chars.next() {
                    None => return Err(Utf7Error::UnterminatedShift),
                    Some('-') => break,
                    Some(x) => b64.push(x),
                }
            }
            if b64.is_empty() {
                out.push('&');
            } else {
                let bytes = MUTF7
                    .decode(b64.as_bytes())
                    .map_err(|_| Utf7Error::BadBase64)?;
                if bytes.len() % 2 != 0 {
                    return Err(Utf7Error::BadUtf16);
                }
                let units: Vec<u16> = bytes
                    .chunks(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                out.push_str(&String::from_utf16(&units).map_err(|_| Utf7Error::BadUtf16)?);
            }
        } else if (' '..='~').contains(&c) {
            out.push(c);
        } else {
            return Err(Utf7Error::NotAscii);
        }
    }

    Ok(out)
}

// ----- parsers -----

/// `mailbox = "INBOX" / astring`
pub(crate) fn mailbox(input: &[u8]) -> ImapResult<'_, Mailbox> {
    map(astring, Mailbox::from)(input)
}

/// `list-mailbox = 1*list-char / string`
pub(crate) fn list_mailbox(input: &[u8]) -> ImapResult<'_, ListMailbox> {
    alt((
        map(token1(LIST), |token| {
            ListMailbox::Token(ListCharString::unvalidated(token))
        }),
        map(string, ListMailbox::String),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_case_insensitive() {
        let (_, mbx) = mailbox(b"inBox ").unwrap();
        assert_eq!(mbx, Mailbox::Inbox);
    }

    #[test]
    fn test_utf7_passthrough_ascii() {
        assert_eq!(utf7_encode("Sent/2024"), "Sent/2024");
        assert_eq!(utf7_decode("Sent/2024").unwrap(), "Sent/2024");
    }

    #[test]
    fn test_utf7_ampersand() {
        assert_eq!(utf7_encode("A&B"), "A&-B");
        assert_eq!(utf7_decode("A&-B").unwrap(), "A&B");
    }

    #[test]
    fn test_utf7_umlaut() {
        assert_eq!(utf7_encode("Entwürfe"), "Entw&APw-rfe");
        assert_eq!(utf7_decode("Entw&APw-rfe").unwrap(), "Entwürfe");
    }

    #[test]
    fn test_utf7_round_trip() {
        for name in ["INBOX", "Entwürfe", "日本語", "a&b&c", "mixed 日本 &", "✉"] {
            assert_eq!(utf7_decode(&utf7_encode(name)).unwrap(), name);
        }
    }

    #[test]
    fn test_utf7_decode_errors() {
        assert_eq!(utf7_decode("Entw&APw"), Err(Utf7Error::UnterminatedShift));
        assert!(utf7_decode("bad\u{e9}").is_err());
    }
}
