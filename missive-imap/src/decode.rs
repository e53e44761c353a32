//! Decoding entry points and error plumbing.
//!
//! IMAP literals make separating parsing from the application difficult:
//! when the server recognizes `{42}\r\n` at the end of the buffered input,
//! it must first agree to receive more data with a continuation request.
//! The command decoder therefore has a dedicated [`CommandDecodeError::LiteralFound`]
//! outcome that the connection loop turns into a `+` line (or an immediate
//! read for `{42+}`).

use std::num::{ParseIntError, TryFromIntError};

use nom::error::{ErrorKind, FromExternalError, ParseError};

use crate::auth::{authenticate_data, AuthenticateData};
use crate::command::{command, idle_done, Command};
use crate::core::{LiteralMode, Tag};

/// An extended version of [`nom::IResult`].
pub(crate) type ImapResult<'a, O> = Result<(&'a [u8], O), nom::Err<ImapParseError<'a>>>;

/// An extended version of [`nom::error::Error`].
#[derive(Debug)]
pub(crate) struct ImapParseError<'a> {
    pub input: &'a [u8],
    pub kind: ImapErrorKind,
}

/// An extended version of [`nom::error::ErrorKind`].
#[derive(Debug)]
pub(crate) enum ImapErrorKind {
    /// A literal whose data is not buffered yet.
    Literal {
        tag: Option<Tag>,
        length: u32,
        mode: LiteralMode,
    },
    /// The command name is not in the server's repertoire.
    UnknownCommand,
    /// A number field did not fit.
    Number,
    /// Broken base64 payload.
    Base64,
    /// An impossible calendar date or time.
    DateTime,
    /// NUL inside a literal.
    Nul,
    /// literal8 (`~{n}`): BINARY is not offered.
    Literal8,
    /// Nested search program too deep.
    Recursion,
    Nom(ErrorKind),
}

impl<'a> ParseError<&'a [u8]> for ImapParseError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            input,
            kind: ImapErrorKind::Nom(kind),
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, _: Self) -> Self {
        Self {
            input,
            kind: ImapErrorKind::Nom(kind),
        }
    }
}

impl<'a> FromExternalError<&'a [u8], ParseIntError> for ImapParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: ParseIntError) -> Self {
        Self {
            input,
            kind: ImapErrorKind::Number,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], TryFromIntError> for ImapParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: TryFromIntError) -> Self {
        Self {
            input,
            kind: ImapErrorKind::Number,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], base64::DecodeError> for ImapParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: base64::DecodeError) -> Self {
        Self {
            input,
            kind: ImapErrorKind::Base64,
        }
    }
}

/// Error during command decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandDecodeError {
    /// More data is needed.
    Incomplete,

    /// The decoder stopped at the beginning of literal data.
    ///
    /// For a sync literal the server must send a continuation request (or
    /// reject the literal); for a non-sync literal the data follows
    /// unconditionally.
    LiteralFound {
        /// Command tag, echoable in a rejection.
        tag: Tag,
        length: u32,
        mode: LiteralMode,
    },

    /// The command name itself was not recognized.
    UnknownCommand { offset: usize },

    /// Decoding failed at the given byte offset.
    Failed { offset: usize },
}

/// Decode one command line, `remaining` being the unconsumed input.
pub fn decode_command(input: &[u8]) -> Result<(&[u8], Command), CommandDecodeError> {
    match command(input) {
        Ok((remaining, cmd)) => Ok((remaining, cmd)),
        Err(nom::Err::Incomplete(_)) => Err(CommandDecodeError::Incomplete),
        Err(nom::Err::Failure(error)) | Err(nom::Err::Error(error)) => {
            let offset = input.len() - error.input.len();
            match error.kind {
                ImapErrorKind::Literal {
                    tag: Some(tag),
                    length,
                    mode,
                } => Err(CommandDecodeError::LiteralFound { tag, length, mode }),
                ImapErrorKind::UnknownCommand => {
                    Err(CommandDecodeError::UnknownCommand { offset })
                }
                _ => Err(CommandDecodeError::Failed { offset }),
            }
        }
    }
}

/// Error during authenticate-data line decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthenticateDataDecodeError {
    Incomplete,
    Failed,
}

/// Decode one line of a SASL exchange (base64 payload or `*` abort).
pub fn decode_authenticate_data(
    input: &[u8],
) -> Result<(&[u8], AuthenticateData), AuthenticateDataDecodeError> {
    match authenticate_data(input) {
        Ok((remaining, data)) => Ok((remaining, data)),
        Err(nom::Err::Incomplete(_)) => Err(AuthenticateDataDecodeError::Incomplete),
        Err(_) => Err(AuthenticateDataDecodeError::Failed),
    }
}

/// Error during idle-done line decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IdleDoneDecodeError {
    Incomplete,
    Failed,
}

/// Decode the `DONE\r\n` line terminating an IDLE command.
pub fn decode_idle_done(input: &[u8]) -> Result<&[u8], IdleDoneDecodeError> {
    match idle_done(input) {
        Ok((remaining, ())) => Ok(remaining),
        Err(nom::Err::Incomplete(_)) => Err(IdleDoneDecodeError::Incomplete),
        Err(_) => Err(IdleDoneDecodeError::Failed),
    }
}
