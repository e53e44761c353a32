//! Typed commands and the command-line grammar (RFC 3501 §6, plus the
//! extensions the server advertises).

use std::fmt;

use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case},
    combinator::{map, opt, value},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded, terminated, tuple},
};

use crate::auth::{auth_type, AuthMechanism};
use crate::core::{
    astring, atom, base64, charset, crlf, literal, sp, tag_imap, AString, Atom, Charset, IString,
    Literal, NString, Secret, Tag, Vec1,
};
use crate::core::{nstring, string};
use crate::datetime::{date_time, DateTime};
use crate::decode::{ImapErrorKind, ImapParseError, ImapResult};
use crate::fetch::{macro_or_fetch_atts, MacroOrMessageDataItemNames};
use crate::flag::{flag_list, store_att_flags, Flag, StoreResponse, StoreType};
use crate::mailbox::{list_mailbox, mailbox, ListMailbox, Mailbox};
use crate::search::{search_key_list, SearchKey};
use crate::sequence::{sequence_set, SequenceSet};
use crate::status::{status_att, StatusDataItemName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub tag: Tag,
    pub body: CommandBody,
}

impl Command {
    pub fn new(tag: impl Into<String>, body: CommandBody) -> Self {
        Self {
            tag: Tag::unvalidated(tag),
            body,
        }
    }

    /// The command name, for logging and error texts.
    pub fn name(&self) -> &'static str {
        self.body.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBody {
    // Any state
    Capability,
    Noop,
    Logout,
    Id {
        parameters: Option<Vec<(IString, NString)>>,
    },

    // Not authenticated
    StartTls,
    Authenticate {
        mechanism: AuthMechanism,
        initial_response: Option<Secret<Vec<u8>>>,
    },
    Login {
        username: AString,
        password: Secret<AString>,
    },

    // Authenticated
    Select {
        mailbox: Mailbox,
    },
    Examine {
        mailbox: Mailbox,
    },
    Create {
        mailbox: Mailbox,
    },
    Delete {
        mailbox: Mailbox,
    },
    Rename {
        from: Mailbox,
        to: Mailbox,
    },
    Subscribe {
        mailbox: Mailbox,
    },
    Unsubscribe {
        mailbox: Mailbox,
    },
    List {
        reference: Mailbox,
        mailbox_wildcard: ListMailbox,
    },
    Lsub {
        reference: Mailbox,
        mailbox_wildcard: ListMailbox,
    },
    Namespace,
    Status {
        mailbox: Mailbox,
        item_names: Vec<StatusDataItemName>,
    },
    Append {
        mailbox: Mailbox,
        flags: Vec<Flag>,
        date: Option<DateTime>,
        message: Literal,
    },
    Idle,
    Enable {
        capabilities: Vec1<CapabilityEnable>,
    },
    Compress {
        algorithm: CompressionAlgorithm,
    },

    // Selected
    Check,
    Close,
    Unselect,
    /// `Some` is `UID EXPUNGE` (RFC 4315).
    Expunge {
        uid_sequence_set: Option<SequenceSet>,
    },
    Search {
        charset: Option<Charset>,
        criteria: Vec1<SearchKey>,
        uid: bool,
    },
    Fetch {
        sequence_set: SequenceSet,
        macro_or_item_names: MacroOrMessageDataItemNames,
        uid: bool,
    },
    Store {
        sequence_set: SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: Vec<Flag>,
        uid: bool,
    },
    Copy {
        sequence_set: SequenceSet,
        mailbox: Mailbox,
        uid: bool,
    },
    Move {
        sequence_set: SequenceSet,
        mailbox: Mailbox,
        uid: bool,
    },
}

impl CommandBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Id { .. } => "ID",
            Self::StartTls => "STARTTLS",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Namespace => "NAMESPACE",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Idle => "IDLE",
            Self::Enable { .. } => "ENABLE",
            Self::Compress { .. } => "COMPRESS",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Unselect => "UNSELECT",
            Self::Expunge { .. } => "EXPUNGE",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Copy { .. } => "COPY",
            Self::Move { .. } => "MOVE",
        }
    }
}

/// `capability` argument of ENABLE (RFC 5161).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityEnable {
    Utf8(Utf8Kind),
    Other(Atom),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Utf8Kind {
    Accept,
    Only,
}

impl From<Atom> for CapabilityEnable {
    fn from(atom: Atom) -> Self {
        match atom.inner().to_ascii_uppercase().as_str() {
            "UTF8=ACCEPT" => Self::Utf8(Utf8Kind::Accept),
            "UTF8=ONLY" => Self::Utf8(Utf8Kind::Only),
            _ => Self::Other(atom),
        }
    }
}

impl fmt::Display for CapabilityEnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8(Utf8Kind::Accept) => f.write_str("UTF8=ACCEPT"),
            Self::Utf8(Utf8Kind::Only) => f.write_str("UTF8=ONLY"),
            Self::Other(a) => write!(f, "{}", a),
        }
    }
}

/// COMPRESS algorithm (RFC 4978).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    Deflate,
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deflate => f.write_str("DEFLATE"),
        }
    }
}

// ----- parsers -----

/// `command = tag SP command-body CRLF`
pub(crate) fn command(input: &[u8]) -> ImapResult<'_, Command> {
    let (rest, obtained_tag) = terminated(tag_imap, sp)(input)?;

    match terminated(command_body, crlf)(rest) {
        Ok((rest, body)) => Ok((
            rest,
            Command {
                tag: obtained_tag,
                body,
            },
        )),
        // A literal error escapes the body parser before the tag is
        // attached; stamp it so the connection loop can answer (or
        // reject) the right command.
        Err(error) => Err(stamp_literal_tag(error, obtained_tag)),
    }
}

fn stamp_literal_tag(
    mut error: nom::Err<ImapParseError<'_>>,
    stamp: Tag,
) -> nom::Err<ImapParseError<'_>> {
    if let nom::Err::Error(ImapParseError {
        kind: ImapErrorKind::Literal { tag, .. },
        ..
    })
    | nom::Err::Failure(ImapParseError {
        kind: ImapErrorKind::Literal { tag, .. },
        ..
    }) = &mut error
    {
        *tag = Some(stamp);
    }
    error
}

/// The command name decides the argument grammar, so it is read once and
/// dispatched on, instead of probing every command's keyword in turn.
fn command_body(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, word) = atom(input)?;
    let name = word.inner().to_ascii_uppercase();

    if let Some(body) = bare_body(&name) {
        return Ok((rest, body));
    }

    // Everything else takes arguments after one SP. The separator is
    // only demanded once the name is recognized, so an unknown command
    // reports as such whatever follows it.
    if !takes_args(&name) {
        return Err(unknown_command(input));
    }
    let (rest, _) = sp(rest)?;

    match name.as_str() {
        "LOGIN" => login_args(rest),
        "AUTHENTICATE" => authenticate_args(rest),
        "SELECT" => map(mailbox, |mailbox| CommandBody::Select { mailbox })(rest),
        "EXAMINE" => map(mailbox, |mailbox| CommandBody::Examine { mailbox })(rest),
        "CREATE" => map(mailbox, |mailbox| CommandBody::Create { mailbox })(rest),
        "DELETE" => map(mailbox, |mailbox| CommandBody::Delete { mailbox })(rest),
        "SUBSCRIBE" => map(mailbox, |mailbox| CommandBody::Subscribe { mailbox })(rest),
        "UNSUBSCRIBE" => map(mailbox, |mailbox| CommandBody::Unsubscribe { mailbox })(rest),
        "RENAME" => rename_args(rest),
        "LIST" => list_args(rest, false),
        "LSUB" => list_args(rest, true),
        "STATUS" => status_args(rest),
        "APPEND" => append_args(rest),
        "ENABLE" => enable_args(rest),
        "COMPRESS" => compress_args(rest),
        "ID" => id_args(rest),
        "FETCH" => fetch_args(rest, false),
        "STORE" => store_args(rest, false),
        "COPY" => copy_args(rest, false),
        "MOVE" => move_args(rest, false),
        "SEARCH" => search_args(rest, false),
        "UID" => uid_args(rest),
        _ => Err(unknown_command(input)),
    }
}

fn unknown_command(input: &[u8]) -> nom::Err<ImapParseError<'_>> {
    nom::Err::Error(ImapParseError {
        input,
        kind: ImapErrorKind::UnknownCommand,
    })
}

/// Commands that are a bare keyword without arguments.
fn bare_body(name: &str) -> Option<CommandBody> {
    Some(match name {
        "CAPABILITY" => CommandBody::Capability,
        "NOOP" => CommandBody::Noop,
        "LOGOUT" => CommandBody::Logout,
        "STARTTLS" => CommandBody::StartTls,
        "CHECK" => CommandBody::Check,
        "CLOSE" => CommandBody::Close,
        "UNSELECT" => CommandBody::Unselect,
        "EXPUNGE" => CommandBody::Expunge {
            uid_sequence_set: None,
        },
        "IDLE" => CommandBody::Idle,
        "NAMESPACE" => CommandBody::Namespace,
        _ => return None,
    })
}

fn takes_args(name: &str) -> bool {
    matches!(
        name,
        "LOGIN"
            | "AUTHENTICATE"
            | "SELECT"
            | "EXAMINE"
            | "CREATE"
            | "DELETE"
            | "RENAME"
            | "SUBSCRIBE"
            | "UNSUBSCRIBE"
            | "LIST"
            | "LSUB"
            | "STATUS"
            | "APPEND"
            | "ENABLE"
            | "COMPRESS"
            | "ID"
            | "FETCH"
            | "STORE"
            | "COPY"
            | "MOVE"
            | "SEARCH"
            | "UID"
    )
}

/// `uid = "UID" SP (copy / move / fetch / search / store / uid-expunge)`
fn uid_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, word) = terminated(atom, sp)(input)?;

    match word.inner().to_ascii_uppercase().as_str() {
        "FETCH" => fetch_args(rest, true),
        "STORE" => store_args(rest, true),
        "COPY" => copy_args(rest, true),
        "MOVE" => move_args(rest, true),
        "SEARCH" => search_args(rest, true),
        // `uid-expunge = "EXPUNGE" SP sequence-set` (RFC 4315)
        "EXPUNGE" => map(sequence_set, |set| CommandBody::Expunge {
            uid_sequence_set: Some(set),
        })(rest),
        _ => Err(unknown_command(input)),
    }
}

/// `userid SP password`
fn login_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, (username, _, password)) = tuple((astring, sp, astring))(input)?;

    Ok((
        rest,
        CommandBody::Login {
            username,
            password: Secret::new(password),
        },
    ))
}

/// `auth-type [SP initial-response]`
///
/// The optional initial response is SASL-IR (RFC 4959); `=` transmits a
/// zero-length response.
fn authenticate_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, (mechanism, initial_response)) = tuple((
        auth_type,
        opt(preceded(sp, alt((value(Vec::new(), tag(b"=")), base64)))),
    ))(input)?;

    Ok((
        rest,
        CommandBody::Authenticate {
            mechanism,
            initial_response: initial_response.map(Secret::new),
        },
    ))
}

/// `mailbox SP mailbox`
fn rename_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, (from, _, to)) = tuple((mailbox, sp, mailbox))(input)?;

    Ok((rest, CommandBody::Rename { from, to }))
}

/// `mailbox SP list-mailbox`, shared by LIST and LSUB.
fn list_args(input: &[u8], is_lsub: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (reference, _, mailbox_wildcard)) =
        tuple((mailbox, sp, list_mailbox))(input)?;

    let body = match is_lsub {
        false => CommandBody::List {
            reference,
            mailbox_wildcard,
        },
        true => CommandBody::Lsub {
            reference,
            mailbox_wildcard,
        },
    };
    Ok((rest, body))
}

/// `mailbox SP "(" status-att *(SP status-att) ")"`
fn status_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, (mailbox, _, item_names)) = tuple((
        mailbox,
        sp,
        delimited(tag(b"("), separated_list0(sp, status_att), tag(b")")),
    ))(input)?;

    Ok((
        rest,
        CommandBody::Status {
            mailbox,
            item_names,
        },
    ))
}

/// `mailbox [SP flag-list] [SP date-time] SP literal`
fn append_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, (mailbox, flags, date, _)) = tuple((
        mailbox,
        opt(preceded(sp, flag_list)),
        opt(preceded(sp, date_time)),
        sp,
    ))(input)?;

    // literal8 (`~{n}`, RFC 3516) is not supported: BINARY is not
    // advertised, so its use is a protocol error.
    if rest.first() == Some(&b'~') {
        return Err(nom::Err::Failure(ImapParseError {
            input: rest,
            kind: ImapErrorKind::Literal8,
        }));
    }

    let (rest, message) = literal(rest)?;

    Ok((
        rest,
        CommandBody::Append {
            mailbox,
            flags: flags.unwrap_or_default(),
            date,
            message,
        },
    ))
}

/// `1*(SP capability)` minus the first SP (RFC 5161)
fn enable_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    let (rest, capabilities) =
        separated_list1(sp, map(atom, CapabilityEnable::from))(input)?;

    Ok((
        rest,
        CommandBody::Enable {
            // Safety: `separated_list1` yields at least one element.
            capabilities: Vec1::try_from(capabilities).unwrap(),
        },
    ))
}

/// `algorithm = "DEFLATE"` (RFC 4978)
fn compress_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    map(
        value(CompressionAlgorithm::Deflate, tag_no_case(b"DEFLATE")),
        |algorithm| CommandBody::Compress { algorithm },
    )(input)
}

/// `id-params-list` (RFC 2971)
fn id_args(input: &[u8]) -> ImapResult<'_, CommandBody> {
    map(id_params_list, |parameters| CommandBody::Id { parameters })(input)
}

/// `id-params-list = "(" [string SP nstring *(SP string SP nstring)] ")" / nil`
fn id_params_list(input: &[u8]) -> ImapResult<'_, Option<Vec<(IString, NString)>>> {
    alt((
        map(
            delimited(
                tag(b"("),
                separated_list0(sp, map(tuple((string, sp, nstring)), |(k, _, v)| (k, v))),
                tag(b")"),
            ),
            Some,
        ),
        value(None, tag_no_case(b"NIL")),
    ))(input)
}

/// `sequence-set SP ("ALL" / "FULL" / "FAST" / fetch-att / "(" ... ")")`
fn fetch_args(input: &[u8], uid: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (sequence_set, _, macro_or_item_names)) =
        tuple((sequence_set, sp, macro_or_fetch_atts))(input)?;

    Ok((
        rest,
        CommandBody::Fetch {
            sequence_set,
            macro_or_item_names,
            uid,
        },
    ))
}

/// `sequence-set SP store-att-flags`
fn store_args(input: &[u8], uid: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (sequence_set, _, (kind, response, flags))) =
        tuple((sequence_set, sp, store_att_flags))(input)?;

    Ok((
        rest,
        CommandBody::Store {
            sequence_set,
            kind,
            response,
            flags,
            uid,
        },
    ))
}

/// `sequence-set SP mailbox`
fn copy_args(input: &[u8], uid: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (sequence_set, _, mailbox)) = tuple((sequence_set, sp, mailbox))(input)?;

    Ok((
        rest,
        CommandBody::Copy {
            sequence_set,
            mailbox,
            uid,
        },
    ))
}

/// `sequence-set SP mailbox` (RFC 6851)
fn move_args(input: &[u8], uid: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (sequence_set, _, mailbox)) = tuple((sequence_set, sp, mailbox))(input)?;

    Ok((
        rest,
        CommandBody::Move {
            sequence_set,
            mailbox,
            uid,
        },
    ))
}

/// `["CHARSET" SP charset SP] 1*(SP search-key)` minus the first SP
fn search_args(input: &[u8], uid: bool) -> ImapResult<'_, CommandBody> {
    let (rest, (charset, criteria)) = tuple((
        opt(terminated(preceded(tag_no_case(b"CHARSET "), charset), sp)),
        search_key_list,
    ))(input)?;

    Ok((
        rest,
        CommandBody::Search {
            charset,
            criteria,
            uid,
        },
    ))
}

/// `idle-done = "DONE" CRLF` (RFC 2177)
pub(crate) fn idle_done(input: &[u8]) -> ImapResult<'_, ()> {
    value((), tuple((tag_no_case(b"DONE"), crlf)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LiteralMode;

    fn parse(line: &[u8]) -> Command {
        let (rem, cmd) = command(line).unwrap();
        assert!(rem.is_empty());
        cmd
    }

    #[test]
    fn test_any_state_commands() {
        assert!(matches!(parse(b"a CAPABILITY\r\n").body, CommandBody::Capability));
        assert!(matches!(parse(b"a noop\r\n").body, CommandBody::Noop));
        assert!(matches!(parse(b"a LOGOUT\r\n").body, CommandBody::Logout));
    }

    #[test]
    fn test_id() {
        let cmd = parse(b"a ID NIL\r\n");
        assert!(matches!(cmd.body, CommandBody::Id { parameters: None }));

        let cmd = parse(b"a ID (\"name\" \"client\" \"version\" NIL)\r\n");
        match cmd.body {
            CommandBody::Id {
                parameters: Some(params),
            } => assert_eq!(params.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_login() {
        let cmd = parse(b"a1 LOGIN alice hunter2\r\n");
        match cmd.body {
            CommandBody::Login { username, .. } => {
                assert_eq!(username.as_bytes(), b"alice")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_login_with_literals() {
        let (_, cmd) = command(b"a1 LOGIN {5+}\r\nalice {7+}\r\nhunter2\r\n").unwrap();
        match cmd.body {
            CommandBody::Login { username, password } => {
                assert_eq!(username.as_bytes(), b"alice");
                assert_eq!(password.declassify().as_bytes(), b"hunter2");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_authenticate() {
        let cmd = parse(b"a AUTHENTICATE PLAIN\r\n");
        match cmd.body {
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => {
                assert_eq!(mechanism, AuthMechanism::Plain);
                assert!(initial_response.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }

        // SASL-IR
        let cmd = parse(b"a AUTHENTICATE PLAIN AGFsaWNlAGh1bnRlcjI=\r\n");
        match cmd.body {
            CommandBody::Authenticate {
                initial_response: Some(ir),
                ..
            } => assert_eq!(ir.declassify().as_slice(), b"\0alice\0hunter2"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_select_examine() {
        assert!(matches!(
            parse(b"a SELECT INBOX\r\n").body,
            CommandBody::Select {
                mailbox: Mailbox::Inbox
            }
        ));
        assert!(matches!(
            parse(b"a EXAMINE Archive\r\n").body,
            CommandBody::Examine { .. }
        ));
    }

    #[test]
    fn test_append() {
        let (_, cmd) = command(b"a APPEND INBOX (\\Seen) {5+}\r\nhello\r\n").unwrap();
        match cmd.body {
            CommandBody::Append {
                mailbox,
                flags,
                date,
                message,
            } => {
                assert_eq!(mailbox, Mailbox::Inbox);
                assert_eq!(flags, vec![Flag::Seen]);
                assert!(date.is_none());
                assert_eq!(message.data(), b"hello");
                assert_eq!(message.mode(), LiteralMode::NonSync);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_append_literal8_rejected() {
        assert!(command(b"a APPEND INBOX ~{5}\r\nhello\r\n").is_err());
    }

    #[test]
    fn test_uid_prefix() {
        match parse(b"a UID FETCH 1:* (FLAGS)\r\n").body {
            CommandBody::Fetch { uid, .. } => assert!(uid),
            other => panic!("unexpected: {:?}", other),
        }
        match parse(b"a FETCH 1:* (FLAGS)\r\n").body {
            CommandBody::Fetch { uid, .. } => assert!(!uid),
            other => panic!("unexpected: {:?}", other),
        }
        match parse(b"a UID EXPUNGE 4:7\r\n").body {
            CommandBody::Expunge { uid_sequence_set } => assert!(uid_sequence_set.is_some()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_store() {
        match parse(b"a STORE 2 +FLAGS (\\Deleted)\r\n").body {
            CommandBody::Store {
                kind,
                response,
                flags,
                uid,
                ..
            } => {
                assert_eq!(kind, StoreType::Add);
                assert_eq!(response, StoreResponse::Answer);
                assert_eq!(flags, vec![Flag::Deleted]);
                assert!(!uid);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_search_with_charset() {
        match parse(b"a SEARCH CHARSET UTF-8 UNSEEN SUBJECT hello\r\n").body {
            CommandBody::Search {
                charset, criteria, ..
            } => {
                assert!(charset.is_some());
                assert_eq!(criteria.as_ref().len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_idle_vs_id() {
        assert!(matches!(parse(b"a IDLE\r\n").body, CommandBody::Idle));
        assert!(matches!(parse(b"a ID NIL\r\n").body, CommandBody::Id { .. }));
    }

    #[test]
    fn test_enable() {
        match parse(b"a ENABLE UTF8=ACCEPT\r\n").body {
            CommandBody::Enable { capabilities } => {
                assert_eq!(
                    capabilities.as_ref(),
                    &[CapabilityEnable::Utf8(Utf8Kind::Accept)]
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_compress() {
        assert!(matches!(
            parse(b"a COMPRESS DEFLATE\r\n").body,
            CommandBody::Compress {
                algorithm: CompressionAlgorithm::Deflate
            }
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert!(command(b"a FROBNICATE\r\n").is_err());
    }
}
