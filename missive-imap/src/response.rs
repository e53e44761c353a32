//! Server responses: status, data, continuation requests, response codes.

use std::fmt;
use std::num::NonZeroU32;

use thiserror::Error;

use crate::command::CapabilityEnable;
use crate::core::{Atom, IString, NString, QuotedChar, SyntaxError, Tag, Text, Vec1};
use crate::fetch::MessageDataItem;
use crate::flag::{Flag, FlagNameAttribute, FlagPerm};
use crate::mailbox::Mailbox;
use crate::status::StatusDataItem;

/// Any response the server can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Status(Status),
    Data(Data),
    ContinuationRequest(ContinuationRequest),
}

/// `greeting = "*" SP (resp-cond-auth / resp-cond-bye) CRLF`
#[derive(Debug, Clone, PartialEq)]
pub struct Greeting {
    pub kind: GreetingKind,
    pub code: Option<Code>,
    pub text: Text,
}

impl Greeting {
    pub fn ok(code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            kind: GreetingKind::Ok,
            code,
            text: Text::try_from(text)?,
        })
    }

    pub fn preauth(code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            kind: GreetingKind::PreAuth,
            code,
            text: Text::try_from(text)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingKind {
    Ok,
    PreAuth,
    Bye,
}

/// Tagged or untagged condition responses.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ok {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },
    No {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },
    Bad {
        tag: Option<Tag>,
        code: Option<Code>,
        text: Text,
    },
    Bye {
        code: Option<Code>,
        text: Text,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ok,
    No,
    Bad,
}

impl Status {
    pub fn new(
        tag: Option<Tag>,
        kind: StatusKind,
        code: Option<Code>,
        text: impl Into<String>,
    ) -> Result<Self, SyntaxError> {
        let text = Text::try_from(text.into())?;
        Ok(match kind {
            StatusKind::Ok => Self::Ok { tag, code, text },
            StatusKind::No => Self::No { tag, code, text },
            StatusKind::Bad => Self::Bad { tag, code, text },
        })
    }

    pub fn ok(tag: Option<Tag>, code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Self::new(tag, StatusKind::Ok, code, text)
    }

    pub fn no(tag: Option<Tag>, code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Self::new(tag, StatusKind::No, code, text)
    }

    pub fn bad(tag: Option<Tag>, code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Self::new(tag, StatusKind::Bad, code, text)
    }

    pub fn bye(code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Ok(Self::Bye {
            code,
            text: Text::try_from(text)?,
        })
    }

    /// The tag this status answers, if any.
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Self::Ok { tag, .. } | Self::No { tag, .. } | Self::Bad { tag, .. } => tag.as_ref(),
            Self::Bye { .. } => None,
        }
    }
}

/// Untagged data responses.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Capability(Vec1<Capability>),
    List {
        items: Vec<FlagNameAttribute>,
        delimiter: Option<QuotedChar>,
        mailbox: Mailbox,
    },
    Lsub {
        items: Vec<FlagNameAttribute>,
        delimiter: Option<QuotedChar>,
        mailbox: Mailbox,
    },
    Status {
        mailbox: Mailbox,
        items: Vec<StatusDataItem>,
    },
    Search(Vec<NonZeroU32>),
    Flags(Vec<Flag>),
    Exists(u32),
    Recent(u32),
    Expunge(NonZeroU32),
    Fetch {
        seq: NonZeroU32,
        items: Vec1<MessageDataItem>,
    },
    Enabled {
        capabilities: Vec<CapabilityEnable>,
    },
    Id {
        parameters: Option<Vec<(IString, NString)>>,
    },
    Namespace {
        personal: Vec<(IString, Option<QuotedChar>)>,
        other: Vec<(IString, Option<QuotedChar>)>,
        shared: Vec<(IString, Option<QuotedChar>)>,
    },
}

/// `continue-req = "+" SP (resp-text / base64) CRLF`
#[derive(Debug, Clone, PartialEq)]
pub enum ContinuationRequest {
    Basic { code: Option<Code>, text: Text },
    Base64(Vec<u8>),
}

impl ContinuationRequest {
    pub fn basic(code: Option<Code>, text: &str) -> Result<Self, SyntaxError> {
        Ok(Self::Basic {
            code,
            text: Text::try_from(text)?,
        })
    }

    pub fn base64(data: Vec<u8>) -> Self {
        Self::Base64(data)
    }
}

/// `resp-text-code`
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    Alert,
    BadCharset {
        allowed: Vec<IString>,
    },
    Capability(Vec1<Capability>),
    Parse,
    PermanentFlags(Vec<FlagPerm>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(NonZeroU32),
    /// RFC 4315
    AppendUid {
        uid_validity: NonZeroU32,
        uid: NonZeroU32,
    },
    /// RFC 4315
    CopyUid {
        uid_validity: NonZeroU32,
        source: Vec<NonZeroU32>,
        destination: Vec<NonZeroU32>,
    },
    /// RFC 5530
    AuthenticationFailed,
    OverQuota,
    ServerBug,
    CompressionActive,
    Other(CodeOther),
}

/// An uninterpreted response code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeOther(Vec<u8>);

impl CodeOther {
    pub fn unvalidated(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn inner(&self) -> &[u8] {
        &self.0
    }
}

/// `capability` as advertised in CAPABILITY data and greeting codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Imap4Rev1,
    LiteralPlus,
    Idle,
    UidPlus,
    Move,
    Enable,
    Id,
    Namespace,
    Unselect,
    Children,
    StartTls,
    SaslIr,
    Auth(crate::auth::AuthMechanism),
    CompressDeflate,
    Other(Atom),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::Idle => f.write_str("IDLE"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Move => f.write_str("MOVE"),
            Self::Enable => f.write_str("ENABLE"),
            Self::Id => f.write_str("ID"),
            Self::Namespace => f.write_str("NAMESPACE"),
            Self::Unselect => f.write_str("UNSELECT"),
            Self::Children => f.write_str("CHILDREN"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::SaslIr => f.write_str("SASL-IR"),
            Self::Auth(mechanism) => write!(f, "AUTH={}", mechanism),
            Self::CompressDeflate => f.write_str("COMPRESS=DEFLATE"),
            Self::Other(atom) => write!(f, "{}", atom),
        }
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ResponseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}
