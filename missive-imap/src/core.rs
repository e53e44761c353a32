//! Core lexical types of the IMAP grammar.
//!
//! Validation is table-driven: every byte is classified once, at compile
//! time, into the lexical alphabets of RFC 3501 §9, and constructors and
//! parsers consult the same table. A token type is its alphabet plus an
//! emptiness rule; the `token_type!` macro stamps out the boilerplate.

use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroU32;
use std::str::from_utf8;

use nom::{
    branch::alt,
    bytes::streaming::{tag, take, take_while, take_while1},
    combinator::{map, map_res, opt, recognize, value},
    sequence::{delimited, pair, terminated},
};
use thiserror::Error;

use crate::decode::{ImapErrorKind, ImapParseError, ImapResult};

// ----- byte classification -----

// One bit per alphabet; a byte may belong to several.
pub(crate) const ATOM: u8 = 1 << 0; // ATOM-CHAR
pub(crate) const ASTR: u8 = 1 << 1; // ASTRING-CHAR (atom + resp-specials)
pub(crate) const TAGC: u8 = 1 << 2; // ASTRING-CHAR minus "+"
pub(crate) const TEXT: u8 = 1 << 3; // TEXT-CHAR
pub(crate) const QSAFE: u8 = 1 << 4; // TEXT-CHAR minus quoted-specials
pub(crate) const LIST: u8 = 1 << 5; // ATOM-CHAR + list-wildcards + resp-specials
pub(crate) const DIGIT: u8 = 1 << 6;
pub(crate) const B64: u8 = 1 << 7;

static CLASSES: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let byte = i as u8;
        let mut class = 0u8;

        // TEXT-CHAR: any 7-bit CHAR except NUL, CR and LF.
        if byte != 0 && byte < 0x80 && byte != b'\r' && byte != b'\n' {
            class |= TEXT;
            if byte != b'"' && byte != b'\\' {
                class |= QSAFE;
            }
        }

        // ATOM-CHAR: visible ASCII minus atom-specials.
        if byte > b' ' && byte < 0x7f {
            match byte {
                b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']' => {}
                _ => class |= ATOM,
            }
        }
        if class & ATOM != 0 || byte == b']' {
            class |= ASTR;
            if byte != b'+' {
                class |= TAGC;
            }
        }
        if class & ATOM != 0 || byte == b'%' || byte == b'*' || byte == b']' {
            class |= LIST;
        }

        if byte.is_ascii_digit() {
            class |= DIGIT;
        }
        if byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/' {
            class |= B64;
        }

        table[i] = class;
        i += 1;
    }
    table
};

pub(crate) fn is(byte: u8, class: u8) -> bool {
    CLASSES[byte as usize] & class != 0
}

/// Why a byte sequence is not a token of the class at hand.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SyntaxError {
    #[error("empty token")]
    Empty,
    #[error("byte 0x{byte:02x} at offset {at} is outside the token's alphabet")]
    Forbidden { byte: u8, at: usize },
    #[error("NUL byte at offset {at}")]
    Nul { at: usize },
}

fn check_token(bytes: &[u8], class: u8, may_be_empty: bool) -> Result<(), SyntaxError> {
    if bytes.is_empty() {
        return match may_be_empty {
            true => Ok(()),
            false => Err(SyntaxError::Empty),
        };
    }
    match bytes.iter().position(|b| !is(*b, class)) {
        None => Ok(()),
        Some(at) => Err(SyntaxError::Forbidden {
            byte: bytes[at],
            at,
        }),
    }
}

// ----- token types -----

macro_rules! token_type {
    ($(#[$doc:meta])* $name:ident, $class:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn verify(value: impl AsRef<[u8]>) -> Result<(), SyntaxError> {
                check_token(value.as_ref(), $class, false)
            }

            pub fn unvalidated(inner: impl Into<String>) -> Self {
                let inner = inner.into();
                #[cfg(debug_assertions)]
                Self::verify(inner.as_bytes()).unwrap();
                Self(inner)
            }

            pub fn inner(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = SyntaxError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::verify(value)?;
                Ok(Self(value.to_owned()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = SyntaxError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::verify(&value)?;
                Ok(Self(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

token_type!(
    /// `atom = 1*ATOM-CHAR`
    Atom,
    ATOM
);
token_type!(
    /// The atom-like branch of `astring`: `1*ASTRING-CHAR`.
    AtomExt,
    ASTR
);
token_type!(
    /// `tag = 1*<any ASTRING-CHAR except "+">`
    Tag,
    TAGC
);
token_type!(
    /// `text = 1*TEXT-CHAR`
    Text,
    TEXT
);

impl From<Atom> for AtomExt {
    fn from(value: Atom) -> Self {
        Self(value.0)
    }
}

// ----- strings -----

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`, held unescaped. May be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quoted(String);

impl Quoted {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), SyntaxError> {
        // Quoted-specials are fine here; escaping is the writer's job.
        check_token(value.as_ref(), TEXT, true)
    }

    pub fn unvalidated(inner: impl Into<String>) -> Self {
        let inner = inner.into();
        #[cfg(debug_assertions)]
        Self::verify(&inner).unwrap();
        Self(inner)
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Quoted {
    type Error = SyntaxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for Quoted {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Synchronizing (`{n}`) or non-synchronizing (`{n+}`, RFC 7888) literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralMode {
    Sync,
    NonSync,
}

/// `literal = "{" number ["+"] "}" CRLF *CHAR8`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    data: Vec<u8>,
    mode: LiteralMode,
}

impl Literal {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), SyntaxError> {
        // CHAR8 is any byte but NUL.
        match value.as_ref().iter().position(|b| *b == 0x00) {
            None => Ok(()),
            Some(at) => Err(SyntaxError::Nul { at }),
        }
    }

    pub fn unvalidated(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        #[cfg(debug_assertions)]
        Self::verify(&data).unwrap();
        Self {
            data,
            mode: LiteralMode::Sync,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn mode(&self) -> LiteralMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: LiteralMode) {
        self.mode = mode;
    }
}

impl TryFrom<&[u8]> for Literal {
    type Error = SyntaxError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;
        Ok(Self {
            data: value.to_vec(),
            mode: LiteralMode::Sync,
        })
    }
}

impl TryFrom<Vec<u8>> for Literal {
    type Error = SyntaxError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::verify(&value)?;
        Ok(Self {
            data: value,
            mode: LiteralMode::Sync,
        })
    }
}

impl AsRef<[u8]> for Literal {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// `string = quoted / literal`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IString {
    Quoted(Quoted),
    Literal(Literal),
}

impl IString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Quoted(q) => q.0.as_bytes(),
            Self::Literal(l) => &l.data,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Quoted(q) => q.0.into_bytes(),
            Self::Literal(l) => l.data,
        }
    }
}

// The cheapest representation wins: quoted if the bytes allow it, a
// literal otherwise.
impl TryFrom<&str> for IString {
    type Error = SyntaxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match Quoted::verify(value) {
            Ok(()) => Ok(Self::Quoted(Quoted(value.to_owned()))),
            Err(_) => Ok(Self::Literal(Literal::try_from(value.as_bytes())?)),
        }
    }
}

impl TryFrom<String> for IString {
    type Error = SyntaxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match Quoted::verify(&value) {
            Ok(()) => Ok(Self::Quoted(Quoted(value))),
            Err(_) => Ok(Self::Literal(Literal::try_from(value.into_bytes())?)),
        }
    }
}

impl TryFrom<Vec<u8>> for IString {
    type Error = SyntaxError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        match from_utf8(&value) {
            Ok(text) if Quoted::verify(text).is_ok() => {
                // Just checked to be UTF-8.
                Ok(Self::Quoted(Quoted(String::from_utf8(value).unwrap())))
            }
            _ => Ok(Self::Literal(Literal::try_from(value)?)),
        }
    }
}

/// `nstring = string / nil`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NString(pub Option<IString>);

impl NString {
    pub fn nil() -> Self {
        Self(None)
    }
}

impl TryFrom<&str> for NString {
    type Error = SyntaxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self(Some(IString::try_from(value)?)))
    }
}

impl TryFrom<Vec<u8>> for NString {
    type Error = SyntaxError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Ok(Self(Some(IString::try_from(value)?)))
    }
}

/// `astring = 1*ASTRING-CHAR / string`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AString {
    Atom(AtomExt),
    String(IString),
}

impl AString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Atom(a) => a.inner().as_bytes(),
            Self::String(s) => s.as_bytes(),
        }
    }
}

impl TryFrom<&str> for AString {
    type Error = SyntaxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match AtomExt::try_from(value) {
            Ok(atom) => Ok(Self::Atom(atom)),
            Err(_) => Ok(Self::String(IString::try_from(value)?)),
        }
    }
}

impl TryFrom<&AString> for String {
    type Error = std::str::Utf8Error;

    fn try_from(value: &AString) -> Result<Self, Self::Error> {
        Ok(from_utf8(value.as_bytes())?.to_owned())
    }
}

/// `charset = atom / quoted`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Charset {
    Atom(Atom),
    Quoted(Quoted),
}

impl Charset {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Atom(a) => a.inner(),
            Self::Quoted(q) => q.inner(),
        }
    }
}

/// `QUOTED-CHAR`, as used for the hierarchy delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotedChar(pub(crate) char);

impl QuotedChar {
    pub fn unvalidated(inner: char) -> Self {
        #[cfg(debug_assertions)]
        assert!(inner.is_ascii() && is(inner as u8, TEXT));
        Self(inner)
    }

    pub fn inner(&self) -> char {
        self.0
    }
}

/// A non-empty list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vec1<T>(Vec<T>);

impl<T> Vec1<T> {
    pub fn as_ref(&self) -> &[T] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> From<T> for Vec1<T> {
    fn from(value: T) -> Self {
        Self(vec![value])
    }
}

impl<T> TryFrom<Vec<T>> for Vec1<T> {
    type Error = Vec1Error;

    fn try_from(value: Vec<T>) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(Vec1Error::Empty);
        }
        Ok(Self(value))
    }
}

impl<T> IntoIterator for Vec1<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Vec1Error {
    #[error("must not be empty")]
    Empty,
}

/// Holder that redacts its content from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    pub fn declassify(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/* REDACTED */")
    }
}

/// Prefix `"` and `\` with a backslash.
pub(crate) fn escape_quoted(raw: &str) -> Cow<str> {
    if !raw.bytes().any(|b| b == b'"' || b == b'\\') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

// ----- parsers -----

fn bad(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<ImapParseError<'_>> {
    nom::Err::Error(ImapParseError {
        input,
        kind: ImapErrorKind::Nom(kind),
    })
}

pub(crate) fn sp(input: &[u8]) -> ImapResult<'_, ()> {
    value((), tag(b" "))(input)
}

pub(crate) fn crlf(input: &[u8]) -> ImapResult<'_, ()> {
    value((), tag(b"\r\n"))(input)
}

pub(crate) fn dquote(input: &[u8]) -> ImapResult<'_, ()> {
    value((), tag(b"\""))(input)
}

/// One non-empty token of `class`.
pub(crate) fn token1(class: u8) -> impl for<'a> Fn(&'a [u8]) -> ImapResult<'a, &'a str> {
    move |input| {
        map(take_while1(move |b| is(b, class)), |bytes| {
            // Every class admits ASCII only.
            from_utf8(bytes).unwrap()
        })(input)
    }
}

/// `atom = 1*ATOM-CHAR`
pub(crate) fn atom(input: &[u8]) -> ImapResult<'_, Atom> {
    map(token1(ATOM), Atom::unvalidated)(input)
}

/// `tag = 1*<any ASTRING-CHAR except "+">`
pub(crate) fn tag_imap(input: &[u8]) -> ImapResult<'_, Tag> {
    map(token1(TAGC), Tag::unvalidated)(input)
}

/// `number = 1*DIGIT`, 32 bits.
pub(crate) fn number(input: &[u8]) -> ImapResult<'_, u32> {
    map_res(token1(DIGIT), str::parse::<u32>)(input)
}

/// `nz-number = digit-nz *DIGIT`
pub(crate) fn nz_number(input: &[u8]) -> ImapResult<'_, NonZeroU32> {
    map_res(number, NonZeroU32::try_from)(input)
}

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`
///
/// Unescapes while scanning: one pass, at most one allocation.
pub(crate) fn quoted(input: &[u8]) -> ImapResult<'_, Quoted> {
    let (mut rest, _) = dquote(input)?;
    let mut unescaped = String::new();

    loop {
        match rest.first() {
            None => return Err(nom::Err::Incomplete(nom::Needed::new(1))),
            Some(b'"') => return Ok((&rest[1..], Quoted::unvalidated(unescaped))),
            Some(b'\\') => match rest.get(1) {
                None => return Err(nom::Err::Incomplete(nom::Needed::new(1))),
                Some(b) if matches!(*b, b'"' | b'\\') => {
                    unescaped.push(*b as char);
                    rest = &rest[2..];
                }
                Some(_) => return Err(bad(rest, nom::error::ErrorKind::Escaped)),
            },
            Some(b) if is(*b, QSAFE) => {
                unescaped.push(*b as char);
                rest = &rest[1..];
            }
            Some(_) => return Err(bad(rest, nom::error::ErrorKind::Char)),
        }
    }
}

/// `"{" number ["+"] "}"`
fn literal_prefix(input: &[u8]) -> ImapResult<'_, (u32, LiteralMode)> {
    delimited(
        tag(b"{"),
        pair(
            number,
            map(opt(tag(b"+")), |plus| match plus {
                Some(_) => LiteralMode::NonSync,
                None => LiteralMode::Sync,
            }),
        ),
        tag(b"}"),
    )(input)
}

/// `literal = "{" number ["+"] "}" CRLF *CHAR8`
///
/// When fewer than `number` bytes are buffered, parsing fails with
/// [`ImapErrorKind::Literal`] so the caller can run the continuation
/// handshake (or, for `{n+}`, simply read on).
pub(crate) fn literal(input: &[u8]) -> ImapResult<'_, Literal> {
    let (after_prefix, (length, mode)) = terminated(literal_prefix, crlf)(input)?;

    // An empty rest means even a zero-length literal still waits for
    // the line that follows it.
    if after_prefix.len() < length as usize || after_prefix.is_empty() {
        return Err(nom::Err::Failure(ImapParseError {
            input,
            kind: ImapErrorKind::Literal {
                // Stamped by the `command` parser once the tag is known.
                tag: None,
                length,
                mode,
            },
        }));
    }

    let (rest, data) = take(length)(after_prefix)?;
    match Literal::try_from(data) {
        Ok(mut literal) => {
            literal.set_mode(mode);
            Ok((rest, literal))
        }
        Err(_) => Err(nom::Err::Failure(ImapParseError {
            input,
            kind: ImapErrorKind::Nul,
        })),
    }
}

/// `string = quoted / literal`
pub(crate) fn string(input: &[u8]) -> ImapResult<'_, IString> {
    alt((map(quoted, IString::Quoted), map(literal, IString::Literal)))(input)
}

/// `astring = 1*ASTRING-CHAR / string`
pub(crate) fn astring(input: &[u8]) -> ImapResult<'_, AString> {
    alt((
        map(token1(ASTR), |token| {
            AString::Atom(AtomExt::unvalidated(token))
        }),
        map(string, AString::String),
    ))(input)
}

/// `nil = "NIL"`
pub(crate) fn nil(input: &[u8]) -> ImapResult<'_, ()> {
    value((), nom::bytes::streaming::tag_no_case(b"NIL"))(input)
}

/// `nstring = nil / string`
pub(crate) fn nstring(input: &[u8]) -> ImapResult<'_, NString> {
    alt((
        value(NString(None), nil),
        map(string, |s| NString(Some(s))),
    ))(input)
}

/// `charset = atom / quoted`
pub(crate) fn charset(input: &[u8]) -> ImapResult<'_, Charset> {
    alt((map(atom, Charset::Atom), map(quoted, Charset::Quoted)))(input)
}

/// `base64 = *(4base64-char) [base64-terminal]`
pub(crate) fn base64(input: &[u8]) -> ImapResult<'_, Vec<u8>> {
    use base64::Engine;

    map_res(
        recognize(pair(
            take_while(|b| is(b, B64)),
            opt(alt((tag(b"=="), tag(b"=")))),
        )),
        |raw| base64::engine::general_purpose::STANDARD.decode(raw),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_classes() {
        // '=' and '-' are plain atom bytes; ']' only reaches astrings.
        assert!(is(b'=', ATOM));
        assert!(is(b'-', ATOM));
        assert!(!is(b']', ATOM));
        assert!(is(b']', ASTR));
        // '+' is fine in an astring but never in a tag.
        assert!(is(b'+', ASTR));
        assert!(!is(b'+', TAGC));
        // Wildcards belong to list patterns only.
        assert!(is(b'%', LIST) && is(b'*', LIST));
        assert!(!is(b'%', ATOM) && !is(b'*', ATOM));
        // CR/LF/NUL are nowhere, not even in TEXT.
        for b in [0x00, b'\r', b'\n'] {
            assert_eq!(CLASSES[b as usize], 0);
        }
    }

    #[test]
    fn test_token_validation() {
        assert!(Atom::try_from("box17").is_ok());
        assert_eq!(Atom::try_from(""), Err(SyntaxError::Empty));
        assert_eq!(
            Atom::try_from("in box"),
            Err(SyntaxError::Forbidden { byte: b' ', at: 2 })
        );
        assert!(Tag::try_from("a001").is_ok());
        assert!(Tag::try_from("a+1").is_err());
    }

    #[test]
    fn test_atom_parser_stops_at_specials() {
        let (rem, val) = atom(b"box17)").unwrap();
        assert_eq!(val.inner(), "box17");
        assert_eq!(rem, b")");

        assert!(atom(b" lead").is_err());
    }

    #[test]
    fn test_tag_parser_excludes_plus() {
        let (rem, val) = tag_imap(b"a+1 ").unwrap();
        assert_eq!(val.inner(), "a");
        assert_eq!(rem, b"+1 ");
    }

    #[test]
    fn test_number_limits() {
        let (_, n) = number(b"4294967295 ").unwrap();
        assert_eq!(n, u32::MAX);
        // One past u32::MAX must fail, not wrap.
        assert!(number(b"4294967296 ").is_err());
        assert!(nz_number(b"0 ").is_err());
    }

    #[test]
    fn test_quoted_scanning() {
        let (rem, val) = quoted(b"\"MOTD of the day\"rest").unwrap();
        assert_eq!(val.inner(), "MOTD of the day");
        assert_eq!(rem, b"rest");

        // Escapes unescape in one pass.
        let (_, val) = quoted(br#""a \"b\" \\ c" "#).unwrap();
        assert_eq!(val.inner(), r#"a "b" \ c"#);

        // Empty is legal.
        let (rem, val) = quoted(b"\"\"x").unwrap();
        assert_eq!(val.inner(), "");
        assert_eq!(rem, b"x");

        // Only quoted-specials may be escaped.
        assert!(quoted(b"\"a \\x b\"").is_err());
        // An unterminated quoted string wants more input.
        assert!(matches!(
            quoted(b"\"still open"),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_literal_modes_and_continuation() {
        let (rem, lit) = literal(b"{6}\r\nfoobartail").unwrap();
        assert_eq!(lit.data(), b"foobar");
        assert_eq!(lit.mode(), LiteralMode::Sync);
        assert_eq!(rem, b"tail");

        let (_, lit) = literal(b"{2+}\r\nok").unwrap();
        assert_eq!(lit.mode(), LiteralMode::NonSync);

        // The empty literal is valid.
        let (rem, lit) = literal(b"{0}\r\nx").unwrap();
        assert!(lit.data().is_empty());
        assert_eq!(rem, b"x");

        // Data not (fully) buffered: hand control back to the framer.
        for partial in [&b"{6}\r\n"[..], &b"{6}\r\nfoo"[..]] {
            match literal(partial) {
                Err(nom::Err::Failure(ImapParseError {
                    kind: ImapErrorKind::Literal { length: 6, .. },
                    ..
                })) => (),
                other => panic!("unexpected: {:?}", other),
            }
        }
        // Same for a zero-length literal with nothing behind it yet.
        assert!(matches!(
            literal(b"{0}\r\n"),
            Err(nom::Err::Failure(ImapParseError {
                kind: ImapErrorKind::Literal { length: 0, .. },
                ..
            }))
        ));

        // CHAR8 excludes NUL.
        assert!(matches!(
            literal(b"{3}\r\na\x00b"),
            Err(nom::Err::Failure(ImapParseError {
                kind: ImapErrorKind::Nul,
                ..
            }))
        ));
    }

    #[test]
    fn test_astring_picks_cheapest_form() {
        assert!(matches!(AString::try_from("plain").unwrap(), AString::Atom(_)));
        assert!(matches!(
            AString::try_from("two words").unwrap(),
            AString::String(IString::Quoted(_))
        ));
        assert!(matches!(
            AString::try_from("line\r\nbreak").unwrap(),
            AString::String(IString::Literal(_))
        ));
    }

    #[test]
    fn test_nstring() {
        let (_, n) = nstring(b"nil ").unwrap();
        assert_eq!(n, NString(None));

        let (_, n) = nstring(b"\"x\" ").unwrap();
        assert!(n.0.is_some());
    }

    #[test]
    fn test_escape_quoted_borrows_when_clean() {
        assert!(matches!(escape_quoted("clean"), Cow::Borrowed(_)));
        assert_eq!(escape_quoted(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_quoted(r"back\slash"), r"back\\slash");
    }
}
