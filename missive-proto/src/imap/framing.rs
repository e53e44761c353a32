//! Line/literal framing between the socket and the command parser.
//!
//! A command ends at CRLF unless the line ends in a literal prefix, in
//! which case the codec waits for the announced bytes (after asking the
//! connection loop to send a continuation for synchronizing literals).

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use missive_imap::auth::AuthenticateData;
use missive_imap::command::Command;
use missive_imap::core::{LiteralMode, Tag};
use missive_imap::decode::{
    decode_authenticate_data, decode_command, decode_idle_done, CommandDecodeError,
};
use missive_imap::encode::Encode;
use missive_imap::response::{Greeting, Response};

/// What the reader currently expects from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Ordinary command lines.
    Command,
    /// One line of a SASL exchange (base64 or `*`).
    Sasl,
    /// The `DONE` line terminating IDLE.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramingState {
    ReadLine { to_consume_acc: usize },
    ReadLiteral { to_consume_acc: usize, length: u32 },
}

#[derive(Debug)]
pub struct ImapServerCodec {
    state: FramingState,
    mode: ReadMode,
    max_literal_size: usize,
}

#[derive(Debug, Error)]
pub enum ImapCodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Line is not CRLF-terminated")]
    NotCrLf,
}

#[derive(Debug, PartialEq)]
pub enum Event {
    Command(Command),
    AuthenticateData(AuthenticateData),
    IdleDone,
    ActionRequired(Action),
    /// The line did not decode to a command; `tag` is echoable when it
    /// was readable, `reason` goes into the BAD text.
    BadCommand {
        tag: Option<Tag>,
        reason: &'static str,
    },
}

#[derive(Debug, PartialEq)]
pub enum Action {
    /// Send `+ OK` so the client transmits the announced literal.
    SendLiteralAck,
    /// The literal exceeds the budget. Non-sync literals are already in
    /// flight, so byte framing is lost and the connection must close.
    RejectLiteral { tag: Tag, length: u32, fatal: bool },
}

impl ImapServerCodec {
    pub fn new(max_literal_size: usize) -> Self {
        Self {
            state: FramingState::ReadLine { to_consume_acc: 0 },
            mode: ReadMode::Command,
            max_literal_size,
        }
    }

    pub fn set_mode(&mut self, mode: ReadMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    fn decode_command_line(&mut self, src: &mut BytesMut) -> Result<Option<Event>, ImapCodecError> {
        loop {
            match self.state {
                FramingState::ReadLine {
                    ref mut to_consume_acc,
                } => match find_crlf_inclusive(*to_consume_acc, src) {
                    Some(Ok(to_consume)) => {
                        *to_consume_acc += to_consume;
                        let line = &src[..*to_consume_acc];

                        match decode_command(line) {
                            Ok((_rem, cmd)) => {
                                let to_advance = *to_consume_acc;
                                src.advance(to_advance);
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };
                                return Ok(Some(Event::Command(cmd)));
                            }
                            Err(CommandDecodeError::LiteralFound { tag, length, mode }) => {
                                if length as usize > self.max_literal_size {
                                    let to_advance = *to_consume_acc;
                                    src.advance(to_advance);
                                    self.state = FramingState::ReadLine { to_consume_acc: 0 };
                                    return Ok(Some(Event::ActionRequired(
                                        Action::RejectLiteral {
                                            tag,
                                            length,
                                            fatal: mode == LiteralMode::NonSync,
                                        },
                                    )));
                                }

                                src.reserve(length as usize);
                                self.state = FramingState::ReadLiteral {
                                    to_consume_acc: *to_consume_acc,
                                    length,
                                };
                                if mode == LiteralMode::Sync {
                                    return Ok(Some(Event::ActionRequired(
                                        Action::SendLiteralAck,
                                    )));
                                }
                                // Non-sync literal: the data follows
                                // unconditionally, keep framing.
                            }
                            Err(decode_error) => {
                                let reason = match decode_error {
                                    CommandDecodeError::UnknownCommand { .. } => {
                                        "Unknown command"
                                    }
                                    _ => "Parse error",
                                };
                                let tag = leading_tag(line);
                                let to_advance = *to_consume_acc;
                                src.advance(to_advance);
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };
                                return Ok(Some(Event::BadCommand { tag, reason }));
                            }
                        }
                    }
                    // A line that ends in a bare LF lost its framing.
                    Some(Err(to_discard)) => {
                        let to_advance = *to_consume_acc + to_discard;
                        src.advance(to_advance);
                        self.state = FramingState::ReadLine { to_consume_acc: 0 };
                        return Err(ImapCodecError::NotCrLf);
                    }
                    None => return Ok(None),
                },
                FramingState::ReadLiteral {
                    to_consume_acc,
                    length,
                } => {
                    if to_consume_acc + length as usize <= src.len() {
                        self.state = FramingState::ReadLine {
                            to_consume_acc: to_consume_acc + length as usize,
                        };
                    } else {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn decode_plain_line<'a>(
        &mut self,
        src: &'a mut BytesMut,
    ) -> Result<Option<(usize, &'a [u8])>, ImapCodecError> {
        match find_crlf_inclusive(0, src) {
            Some(Ok(to_consume)) => Ok(Some((to_consume, &src[..to_consume]))),
            Some(Err(to_discard)) => {
                src.advance(to_discard);
                Err(ImapCodecError::NotCrLf)
            }
            None => Ok(None),
        }
    }
}

impl Decoder for ImapServerCodec {
    type Item = Event;
    type Error = ImapCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.mode {
            ReadMode::Command => self.decode_command_line(src),
            ReadMode::Sasl => {
                let (to_consume, line) = match self.decode_plain_line(src)? {
                    Some(found) => found,
                    None => return Ok(None),
                };
                // A malformed exchange line aborts the exchange, like `*`.
                let event = match decode_authenticate_data(line) {
                    Ok((_, data)) => Event::AuthenticateData(data),
                    Err(_) => Event::AuthenticateData(AuthenticateData::Cancel),
                };
                src.advance(to_consume);
                Ok(Some(event))
            }
            ReadMode::Idle => {
                let (to_consume, line) = match self.decode_plain_line(src)? {
                    Some(found) => found,
                    None => return Ok(None),
                };
                let event = match decode_idle_done(line) {
                    Ok(_) => Event::IdleDone,
                    Err(_) => Event::BadCommand {
                        tag: None,
                        reason: "Expected DONE",
                    },
                };
                src.advance(to_consume);
                Ok(Some(event))
            }
        }
    }
}

impl Encoder<&Greeting> for ImapServerCodec {
    type Error = ImapCodecError;

    fn encode(&mut self, item: &Greeting, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode().dump());
        Ok(())
    }
}

impl Encoder<&Response> for ImapServerCodec {
    type Error = ImapCodecError;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode().dump());
        Ok(())
    }
}

/// After skipping `skip` bytes, how many more form a full CRLF line?
/// `Err` carries the length of a line broken by a bare LF.
fn find_crlf_inclusive(skip: usize, buf: &BytesMut) -> Option<Result<usize, usize>> {
    match buf.iter().skip(skip).position(|b| *b == b'\n') {
        Some(pos) => {
            let consumed = pos + 1;
            if pos >= 1 && buf[skip + pos - 1] == b'\r' {
                Some(Ok(consumed))
            } else {
                Some(Err(consumed))
            }
        }
        None => None,
    }
}

fn leading_tag(line: &[u8]) -> Option<Tag> {
    let end = line.iter().position(|b| *b == b' ')?;
    std::str::from_utf8(&line[..end])
        .ok()
        .and_then(|raw| Tag::try_from(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use missive_imap::command::CommandBody;

    #[test]
    fn test_decoder_line() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a NOOP");
        assert!(matches!(codec.decode(&mut src), Ok(None)));

        src.extend_from_slice(b"\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::Command(cmd))) => assert!(matches!(cmd.body, CommandBody::Noop)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(src.is_empty());
    }

    #[test]
    fn test_decoder_sync_literal_needs_ack() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a LOGIN {5}\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::ActionRequired(Action::SendLiteralAck))
        );

        src.extend_from_slice(b"alice password\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::Command(cmd))) => {
                assert!(matches!(cmd.body, CommandBody::Login { .. }))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_non_sync_literal_no_ack() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a LOGIN {5+}\r\nalice password\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::Command(cmd))) => {
                assert!(matches!(cmd.body, CommandBody::Login { .. }))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_oversized_literal() {
        let mut codec = ImapServerCodec::new(16);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a LOGIN alice {17}\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::ActionRequired(Action::RejectLiteral {
                length: 17,
                fatal: false,
                ..
            }))) => (),
            other => panic!("unexpected: {:?}", other),
        }

        src.extend_from_slice(b"b LOGIN alice {99+}\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::ActionRequired(Action::RejectLiteral { fatal: true, .. }))) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_garbage_keeps_tag() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a7 FROBNICATE all the things\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::BadCommand {
                tag: Some(tag),
                reason: "Unknown command",
            })) => assert_eq!(tag.inner(), "a7"),
            other => panic!("unexpected: {:?}", other),
        }

        // A known command with malformed arguments is a parse error.
        src.extend_from_slice(b"a8 STORE oops\r\n");
        match codec.decode(&mut src) {
            Ok(Some(Event::BadCommand {
                tag: Some(tag),
                reason: "Parse error",
            })) => assert_eq!(tag.inner(), "a8"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_bare_lf_is_fatal() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a NOOP\n");
        assert!(matches!(
            codec.decode(&mut src),
            Err(ImapCodecError::NotCrLf)
        ));
    }

    #[test]
    fn test_idle_mode() {
        let mut codec = ImapServerCodec::new(1024);
        codec.set_mode(ReadMode::Idle);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"DONE\r\n");
        assert_eq!(codec.decode(&mut src).unwrap(), Some(Event::IdleDone));
    }

    #[test]
    fn test_sasl_mode() {
        let mut codec = ImapServerCodec::new(1024);
        codec.set_mode(ReadMode::Sasl);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"*\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::AuthenticateData(AuthenticateData::Cancel))
        );
    }
}
