//! Fragment-based serialization.
//!
//! Messages are not dumped as flat byte strings: a literal inside a
//! response changes the message flow (the client may only continue after
//! CRLF framing), so encoding yields [`Fragment`]s. A server that is sure
//! no coordination is needed can still [`Encoded::dump`] everything.

use std::collections::VecDeque;
use std::io::Write;

use base64::Engine;

use crate::command::{Command, CommandBody};
use crate::core::{
    escape_quoted, AString, Atom, AtomExt, Charset, IString, Literal, LiteralMode, NString, Quoted,
    QuotedChar, Tag, Text, Vec1,
};
use crate::datetime::{DateTime, NaiveDate};
use crate::envelope::{Address, Envelope};
use crate::fetch::{
    MacroOrMessageDataItemNames, MessageDataItem, MessageDataItemName, Section,
};
use crate::flag::{Flag, FlagFetch, FlagNameAttribute, FlagPerm, StoreResponse, StoreType};
use crate::mailbox::{ListMailbox, Mailbox};
use crate::response::{
    Capability, Code, CodeOther, ContinuationRequest, Data, Greeting, GreetingKind, Response,
    Status,
};
use crate::search::SearchKey;
use crate::sequence::{SeqOrUid, Sequence, SequenceSet};
use crate::status::StatusDataItem;

/// Types that know their own wire form.
pub trait Encode {
    fn encode(&self) -> Encoded;
}

impl<T: EncodeIntoContext> Encode for T {
    fn encode(&self) -> Encoded {
        let mut ctx = EncodeContext::new();
        // Writing into a Vec can not fail.
        self.encode_ctx(&mut ctx).unwrap();
        Encoded {
            items: ctx.into_items(),
        }
    }
}

/// An encoded message, iterable as [`Fragment`]s.
#[derive(Clone, Debug)]
pub struct Encoded {
    items: VecDeque<Fragment>,
}

impl Encoded {
    /// Dump the (remaining) encoded data, ignoring fragment boundaries.
    pub fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();
        for fragment in self.items {
            match fragment {
                Fragment::Line { mut data } => out.append(&mut data),
                Fragment::Literal { mut data, .. } => out.append(&mut data),
            }
        }
        out
    }
}

impl Iterator for Encoded {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }
}

/// A step of an encoded message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fragment {
    /// A line ready to be sent.
    Line { data: Vec<u8> },
    /// Literal data; sync mode requires a continuation handshake first.
    Literal { data: Vec<u8>, mode: LiteralMode },
}

#[derive(Clone, Debug, Default)]
pub(crate) struct EncodeContext {
    accumulator: Vec<u8>,
    items: VecDeque<Fragment>,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self) {
        self.items.push_back(Fragment::Line {
            data: std::mem::take(&mut self.accumulator),
        })
    }

    pub fn push_literal(&mut self, mode: LiteralMode) {
        self.items.push_back(Fragment::Literal {
            data: std::mem::take(&mut self.accumulator),
            mode,
        })
    }

    pub fn into_items(self) -> VecDeque<Fragment> {
        let Self {
            accumulator,
            mut items,
        } = self;
        if !accumulator.is_empty() {
            items.push_back(Fragment::Line { data: accumulator });
        }
        items
    }
}

impl Write for EncodeContext {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.accumulator.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) trait EncodeIntoContext {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()>;
}

// ----- primitives -----

impl EncodeIntoContext for u32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for std::num::NonZeroU32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for Atom {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for AtomExt {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Tag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Text {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Quoted {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{}\"", escape_quoted(self.inner()))
    }
}

impl EncodeIntoContext for QuotedChar {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self.inner() {
            '\\' => ctx.write_all(b"\"\\\\\""),
            '"' => ctx.write_all(b"\"\\\"\""),
            other => write!(ctx, "\"{}\"", other),
        }
    }
}

impl EncodeIntoContext for Literal {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self.mode() {
            LiteralMode::Sync => write!(ctx, "{{{}}}\r\n", self.data().len())?,
            LiteralMode::NonSync => write!(ctx, "{{{}+}}\r\n", self.data().len())?,
        }
        ctx.push_line();

        ctx.write_all(self.data())?;
        ctx.push_literal(self.mode());
        Ok(())
    }
}

impl EncodeIntoContext for IString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Quoted(quoted) => quoted.encode_ctx(ctx),
            Self::Literal(literal) => literal.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for NString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match &self.0 {
            Some(istring) => istring.encode_ctx(ctx),
            None => ctx.write_all(b"NIL"),
        }
    }
}

impl EncodeIntoContext for AString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Atom(atom) => atom.encode_ctx(ctx),
            Self::String(istring) => istring.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for Charset {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Atom(atom) => atom.encode_ctx(ctx),
            Self::Quoted(quoted) => quoted.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for DateTime {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{}\"", self)
    }
}

impl EncodeIntoContext for NaiveDate {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for Mailbox {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Inbox => ctx.write_all(b"INBOX"),
            Self::Other(other) => other.0.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for ListMailbox {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Token(token) => ctx.write_all(token.0.as_bytes()),
            Self::String(istring) => istring.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for SequenceSet {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        join_serializable(self.0.as_ref(), b",", ctx)
    }
}

impl EncodeIntoContext for Sequence {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Single(value) => value.encode_ctx(ctx),
            Self::Range(from, to) => {
                from.encode_ctx(ctx)?;
                ctx.write_all(b":")?;
                to.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for SeqOrUid {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Value(value) => value.encode_ctx(ctx),
            Self::Asterisk => ctx.write_all(b"*"),
        }
    }
}

impl EncodeIntoContext for Flag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for FlagFetch {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for FlagPerm {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for FlagNameAttribute {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

fn join_serializable<T: EncodeIntoContext>(
    elements: &[T],
    separator: &[u8],
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    if let Some((last, head)) = elements.split_last() {
        for element in head {
            element.encode_ctx(ctx)?;
            ctx.write_all(separator)?;
        }
        last.encode_ctx(ctx)?;
    }
    Ok(())
}

// ----- greeting & status -----

impl EncodeIntoContext for Greeting {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"* ")?;
        match self.kind {
            GreetingKind::Ok => ctx.write_all(b"OK")?,
            GreetingKind::PreAuth => ctx.write_all(b"PREAUTH")?,
            GreetingKind::Bye => ctx.write_all(b"BYE")?,
        }
        if let Some(code) = &self.code {
            ctx.write_all(b" [")?;
            code.encode_ctx(ctx)?;
            ctx.write_all(b"]")?;
        }
        ctx.write_all(b" ")?;
        self.text.encode_ctx(ctx)?;
        ctx.write_all(b"\r\n")
    }
}

fn encode_condition(
    ctx: &mut EncodeContext,
    tag: Option<&Tag>,
    condition: &[u8],
    code: Option<&Code>,
    text: &Text,
) -> std::io::Result<()> {
    match tag {
        Some(tag) => tag.encode_ctx(ctx)?,
        None => ctx.write_all(b"*")?,
    }
    ctx.write_all(b" ")?;
    ctx.write_all(condition)?;
    ctx.write_all(b" ")?;
    if let Some(code) = code {
        ctx.write_all(b"[")?;
        code.encode_ctx(ctx)?;
        ctx.write_all(b"] ")?;
    }
    text.encode_ctx(ctx)?;
    ctx.write_all(b"\r\n")
}

impl EncodeIntoContext for Status {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Ok { tag, code, text } => {
                encode_condition(ctx, tag.as_ref(), b"OK", code.as_ref(), text)
            }
            Self::No { tag, code, text } => {
                encode_condition(ctx, tag.as_ref(), b"NO", code.as_ref(), text)
            }
            Self::Bad { tag, code, text } => {
                encode_condition(ctx, tag.as_ref(), b"BAD", code.as_ref(), text)
            }
            Self::Bye { code, text } => encode_condition(ctx, None, b"BYE", code.as_ref(), text),
        }
    }
}

impl EncodeIntoContext for Code {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Alert => ctx.write_all(b"ALERT"),
            Self::BadCharset { allowed } => {
                ctx.write_all(b"BADCHARSET")?;
                if !allowed.is_empty() {
                    ctx.write_all(b" (")?;
                    join_serializable(allowed, b" ", ctx)?;
                    ctx.write_all(b")")?;
                }
                Ok(())
            }
            Self::Capability(caps) => {
                ctx.write_all(b"CAPABILITY ")?;
                join_serializable(caps.as_ref(), b" ", ctx)
            }
            Self::Parse => ctx.write_all(b"PARSE"),
            Self::PermanentFlags(flags) => {
                ctx.write_all(b"PERMANENTFLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::ReadOnly => ctx.write_all(b"READ-ONLY"),
            Self::ReadWrite => ctx.write_all(b"READ-WRITE"),
            Self::TryCreate => ctx.write_all(b"TRYCREATE"),
            Self::UidNext(next) => {
                ctx.write_all(b"UIDNEXT ")?;
                next.encode_ctx(ctx)
            }
            Self::UidValidity(validity) => {
                ctx.write_all(b"UIDVALIDITY ")?;
                validity.encode_ctx(ctx)
            }
            Self::Unseen(seq) => {
                ctx.write_all(b"UNSEEN ")?;
                seq.encode_ctx(ctx)
            }
            Self::AppendUid { uid_validity, uid } => {
                write!(ctx, "APPENDUID {} {}", uid_validity, uid)
            }
            Self::CopyUid {
                uid_validity,
                source,
                destination,
            } => {
                write!(ctx, "COPYUID {} ", uid_validity)?;
                join_serializable(source, b",", ctx)?;
                ctx.write_all(b" ")?;
                join_serializable(destination, b",", ctx)
            }
            Self::AuthenticationFailed => ctx.write_all(b"AUTHENTICATIONFAILED"),
            Self::OverQuota => ctx.write_all(b"OVERQUOTA"),
            Self::ServerBug => ctx.write_all(b"SERVERBUG"),
            Self::CompressionActive => ctx.write_all(b"COMPRESSIONACTIVE"),
            Self::Other(other) => other.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for CodeOther {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner())
    }
}

impl EncodeIntoContext for Capability {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

// ----- data -----

impl EncodeIntoContext for Data {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Capability(caps) => {
                ctx.write_all(b"* CAPABILITY ")?;
                join_serializable(caps.as_ref(), b" ", ctx)?;
            }
            Self::List {
                items,
                delimiter,
                mailbox,
            } => {
                ctx.write_all(b"* LIST (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b") ")?;
                encode_delimiter(ctx, delimiter.as_ref())?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)?;
            }
            Self::Lsub {
                items,
                delimiter,
                mailbox,
            } => {
                ctx.write_all(b"* LSUB (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b") ")?;
                encode_delimiter(ctx, delimiter.as_ref())?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)?;
            }
            Self::Status { mailbox, items } => {
                ctx.write_all(b"* STATUS ")?;
                mailbox.encode_ctx(ctx)?;
                ctx.write_all(b" (")?;
                join_serializable(items, b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Search(seqs) => {
                ctx.write_all(b"* SEARCH")?;
                for seq in seqs {
                    ctx.write_all(b" ")?;
                    seq.encode_ctx(ctx)?;
                }
            }
            Self::Flags(flags) => {
                ctx.write_all(b"* FLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Exists(count) => write!(ctx, "* {} EXISTS", count)?,
            Self::Recent(count) => write!(ctx, "* {} RECENT", count)?,
            Self::Expunge(seq) => write!(ctx, "* {} EXPUNGE", seq)?,
            Self::Fetch { seq, items } => {
                write!(ctx, "* {} FETCH (", seq)?;
                join_serializable(items.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")?;
            }
            Self::Enabled { capabilities } => {
                ctx.write_all(b"* ENABLED")?;
                for cap in capabilities {
                    write!(ctx, " {}", cap)?;
                }
            }
            Self::Id { parameters } => {
                ctx.write_all(b"* ID ")?;
                encode_id_parameters(ctx, parameters.as_deref())?;
            }
            Self::Namespace {
                personal,
                other,
                shared,
            } => {
                ctx.write_all(b"* NAMESPACE ")?;
                encode_namespace(ctx, personal)?;
                ctx.write_all(b" ")?;
                encode_namespace(ctx, other)?;
                ctx.write_all(b" ")?;
                encode_namespace(ctx, shared)?;
            }
        }
        ctx.write_all(b"\r\n")
    }
}

fn encode_delimiter(ctx: &mut EncodeContext, delimiter: Option<&QuotedChar>) -> std::io::Result<()> {
    match delimiter {
        Some(delimiter) => delimiter.encode_ctx(ctx),
        None => ctx.write_all(b"NIL"),
    }
}

fn encode_id_parameters(
    ctx: &mut EncodeContext,
    parameters: Option<&[(IString, NString)]>,
) -> std::io::Result<()> {
    match parameters {
        None => ctx.write_all(b"NIL"),
        Some(parameters) => {
            ctx.write_all(b"(")?;
            let mut first = true;
            for (key, value) in parameters {
                if !first {
                    ctx.write_all(b" ")?;
                }
                first = false;
                key.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                value.encode_ctx(ctx)?;
            }
            ctx.write_all(b")")
        }
    }
}

fn encode_namespace(
    ctx: &mut EncodeContext,
    namespaces: &[(IString, Option<QuotedChar>)],
) -> std::io::Result<()> {
    if namespaces.is_empty() {
        return ctx.write_all(b"NIL");
    }
    ctx.write_all(b"(")?;
    for (prefix, delimiter) in namespaces {
        ctx.write_all(b"(")?;
        prefix.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        encode_delimiter(ctx, delimiter.as_ref())?;
        ctx.write_all(b")")?;
    }
    ctx.write_all(b")")
}

impl EncodeIntoContext for StatusDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{}", self)
    }
}

impl EncodeIntoContext for MessageDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Flags(flags) => {
                ctx.write_all(b"FLAGS (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::InternalDate(datetime) => {
                ctx.write_all(b"INTERNALDATE ")?;
                datetime.encode_ctx(ctx)
            }
            Self::Rfc822(nstring) => {
                ctx.write_all(b"RFC822 ")?;
                nstring.encode_ctx(ctx)
            }
            Self::Rfc822Header(nstring) => {
                ctx.write_all(b"RFC822.HEADER ")?;
                nstring.encode_ctx(ctx)
            }
            Self::Rfc822Size(size) => write!(ctx, "RFC822.SIZE {}", size),
            Self::Rfc822Text(nstring) => {
                ctx.write_all(b"RFC822.TEXT ")?;
                nstring.encode_ctx(ctx)
            }
            Self::Envelope(envelope) => {
                ctx.write_all(b"ENVELOPE ")?;
                envelope.encode_ctx(ctx)
            }
            Self::Uid(uid) => write!(ctx, "UID {}", uid),
            Self::BodyExt {
                section,
                origin,
                data,
            } => {
                ctx.write_all(b"BODY[")?;
                if let Some(section) = section {
                    section.encode_ctx(ctx)?;
                }
                ctx.write_all(b"]")?;
                if let Some(origin) = origin {
                    write!(ctx, "<{}>", origin)?;
                }
                ctx.write_all(b" ")?;
                data.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for Section {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Header => ctx.write_all(b"HEADER"),
            Self::HeaderFields(fields) => {
                ctx.write_all(b"HEADER.FIELDS (")?;
                join_serializable(fields.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::HeaderFieldsNot(fields) => {
                ctx.write_all(b"HEADER.FIELDS.NOT (")?;
                join_serializable(fields.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::Text => ctx.write_all(b"TEXT"),
        }
    }
}

impl EncodeIntoContext for Envelope {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.date.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.subject.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.from)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.sender)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.reply_to)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.to)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.cc)?;
        ctx.write_all(b" ")?;
        encode_address_list(ctx, &self.bcc)?;
        ctx.write_all(b" ")?;
        self.in_reply_to.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.message_id.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

fn encode_address_list(ctx: &mut EncodeContext, addresses: &[Address]) -> std::io::Result<()> {
    if addresses.is_empty() {
        return ctx.write_all(b"NIL");
    }
    ctx.write_all(b"(")?;
    for address in addresses {
        address.encode_ctx(ctx)?;
    }
    ctx.write_all(b")")
}

impl EncodeIntoContext for Address {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.name.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.adl.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.mailbox.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.host.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

// ----- continuation & response -----

impl EncodeIntoContext for ContinuationRequest {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Basic { code, text } => {
                ctx.write_all(b"+ ")?;
                if let Some(code) = code {
                    ctx.write_all(b"[")?;
                    code.encode_ctx(ctx)?;
                    ctx.write_all(b"] ")?;
                }
                text.encode_ctx(ctx)?;
                ctx.write_all(b"\r\n")
            }
            Self::Base64(data) => {
                write!(
                    ctx,
                    "+ {}\r\n",
                    base64::engine::general_purpose::STANDARD.encode(data)
                )
            }
        }
    }
}

impl EncodeIntoContext for Response {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Status(status) => status.encode_ctx(ctx),
            Self::Data(data) => data.encode_ctx(ctx),
            Self::ContinuationRequest(cont) => cont.encode_ctx(ctx),
        }
    }
}

// ----- command (client side, used by the test tooling) -----

impl EncodeIntoContext for Command {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        self.tag.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.body.encode_ctx(ctx)?;
        ctx.write_all(b"\r\n")
    }
}

impl EncodeIntoContext for CommandBody {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Capability => ctx.write_all(b"CAPABILITY"),
            Self::Noop => ctx.write_all(b"NOOP"),
            Self::Logout => ctx.write_all(b"LOGOUT"),
            Self::Id { parameters } => {
                ctx.write_all(b"ID ")?;
                encode_id_parameters(ctx, parameters.as_deref())
            }
            Self::StartTls => ctx.write_all(b"STARTTLS"),
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                write!(ctx, "AUTHENTICATE {}", mechanism)?;
                if let Some(ir) = initial_response {
                    let ir = ir.declassify();
                    if ir.is_empty() {
                        ctx.write_all(b" =")?;
                    } else {
                        write!(
                            ctx,
                            " {}",
                            base64::engine::general_purpose::STANDARD.encode(ir)
                        )?;
                    }
                }
                Ok(())
            }
            Self::Login { username, password } => {
                ctx.write_all(b"LOGIN ")?;
                username.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                password.declassify().encode_ctx(ctx)
            }
            Self::Select { mailbox } => {
                ctx.write_all(b"SELECT ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Examine { mailbox } => {
                ctx.write_all(b"EXAMINE ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Create { mailbox } => {
                ctx.write_all(b"CREATE ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Delete { mailbox } => {
                ctx.write_all(b"DELETE ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Rename { from, to } => {
                ctx.write_all(b"RENAME ")?;
                from.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                to.encode_ctx(ctx)
            }
            Self::Subscribe { mailbox } => {
                ctx.write_all(b"SUBSCRIBE ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Unsubscribe { mailbox } => {
                ctx.write_all(b"UNSUBSCRIBE ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::List {
                reference,
                mailbox_wildcard,
            } => {
                ctx.write_all(b"LIST ")?;
                reference.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                mailbox_wildcard.encode_ctx(ctx)
            }
            Self::Lsub {
                reference,
                mailbox_wildcard,
            } => {
                ctx.write_all(b"LSUB ")?;
                reference.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                mailbox_wildcard.encode_ctx(ctx)
            }
            Self::Namespace => ctx.write_all(b"NAMESPACE"),
            Self::Status {
                mailbox,
                item_names,
            } => {
                ctx.write_all(b"STATUS ")?;
                mailbox.encode_ctx(ctx)?;
                ctx.write_all(b" (")?;
                let names: Vec<&[u8]> = item_names
                    .iter()
                    .map(|name| match name {
                        crate::status::StatusDataItemName::Messages => b"MESSAGES".as_ref(),
                        crate::status::StatusDataItemName::Recent => b"RECENT".as_ref(),
                        crate::status::StatusDataItemName::UidNext => b"UIDNEXT".as_ref(),
                        crate::status::StatusDataItemName::UidValidity => b"UIDVALIDITY".as_ref(),
                        crate::status::StatusDataItemName::Unseen => b"UNSEEN".as_ref(),
                    })
                    .collect();
                ctx.write_all(&names.join(&b" "[..]))?;
                ctx.write_all(b")")
            }
            Self::Append {
                mailbox,
                flags,
                date,
                message,
            } => {
                ctx.write_all(b"APPEND ")?;
                mailbox.encode_ctx(ctx)?;
                if !flags.is_empty() {
                    ctx.write_all(b" (")?;
                    join_serializable(flags, b" ", ctx)?;
                    ctx.write_all(b")")?;
                }
                if let Some(date) = date {
                    ctx.write_all(b" ")?;
                    date.encode_ctx(ctx)?;
                }
                ctx.write_all(b" ")?;
                message.encode_ctx(ctx)
            }
            Self::Idle => ctx.write_all(b"IDLE"),
            Self::Enable { capabilities } => {
                ctx.write_all(b"ENABLE")?;
                for cap in capabilities.as_ref() {
                    write!(ctx, " {}", cap)?;
                }
                Ok(())
            }
            Self::Compress { algorithm } => write!(ctx, "COMPRESS {}", algorithm),
            Self::Check => ctx.write_all(b"CHECK"),
            Self::Close => ctx.write_all(b"CLOSE"),
            Self::Unselect => ctx.write_all(b"UNSELECT"),
            Self::Expunge { uid_sequence_set } => match uid_sequence_set {
                None => ctx.write_all(b"EXPUNGE"),
                Some(set) => {
                    ctx.write_all(b"UID EXPUNGE ")?;
                    set.encode_ctx(ctx)
                }
            },
            Self::Search {
                charset,
                criteria,
                uid,
            } => {
                if *uid {
                    ctx.write_all(b"UID ")?;
                }
                ctx.write_all(b"SEARCH")?;
                if let Some(charset) = charset {
                    ctx.write_all(b" CHARSET ")?;
                    charset.encode_ctx(ctx)?;
                }
                for criterion in criteria.as_ref() {
                    ctx.write_all(b" ")?;
                    criterion.encode_ctx(ctx)?;
                }
                Ok(())
            }
            Self::Fetch {
                sequence_set,
                macro_or_item_names,
                uid,
            } => {
                if *uid {
                    ctx.write_all(b"UID ")?;
                }
                ctx.write_all(b"FETCH ")?;
                sequence_set.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                macro_or_item_names.encode_ctx(ctx)
            }
            Self::Store {
                sequence_set,
                kind,
                response,
                flags,
                uid,
            } => {
                if *uid {
                    ctx.write_all(b"UID ")?;
                }
                ctx.write_all(b"STORE ")?;
                sequence_set.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                match kind {
                    StoreType::Add => ctx.write_all(b"+")?,
                    StoreType::Remove => ctx.write_all(b"-")?,
                    StoreType::Replace => {}
                }
                ctx.write_all(b"FLAGS")?;
                if matches!(response, StoreResponse::Silent) {
                    ctx.write_all(b".SILENT")?;
                }
                ctx.write_all(b" (")?;
                join_serializable(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::Copy {
                sequence_set,
                mailbox,
                uid,
            } => {
                if *uid {
                    ctx.write_all(b"UID ")?;
                }
                ctx.write_all(b"COPY ")?;
                sequence_set.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)
            }
            Self::Move {
                sequence_set,
                mailbox,
                uid,
            } => {
                if *uid {
                    ctx.write_all(b"UID ")?;
                }
                ctx.write_all(b"MOVE ")?;
                sequence_set.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                mailbox.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for MacroOrMessageDataItemNames {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Macro(m) => ctx.write_all(match m {
                crate::fetch::Macro::All => b"ALL",
                crate::fetch::Macro::Fast => b"FAST",
                crate::fetch::Macro::Full => b"FULL",
            }),
            Self::MessageDataItemNames(names) => {
                ctx.write_all(b"(")?;
                join_serializable(names, b" ", ctx)?;
                ctx.write_all(b")")
            }
        }
    }
}

impl EncodeIntoContext for MessageDataItemName {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Flags => ctx.write_all(b"FLAGS"),
            Self::InternalDate => ctx.write_all(b"INTERNALDATE"),
            Self::Rfc822 => ctx.write_all(b"RFC822"),
            Self::Rfc822Header => ctx.write_all(b"RFC822.HEADER"),
            Self::Rfc822Size => ctx.write_all(b"RFC822.SIZE"),
            Self::Rfc822Text => ctx.write_all(b"RFC822.TEXT"),
            Self::Envelope => ctx.write_all(b"ENVELOPE"),
            Self::Uid => ctx.write_all(b"UID"),
            Self::BodyExt {
                section,
                partial,
                peek,
            } => {
                if *peek {
                    ctx.write_all(b"BODY.PEEK[")?;
                } else {
                    ctx.write_all(b"BODY[")?;
                }
                if let Some(section) = section {
                    section.encode_ctx(ctx)?;
                }
                ctx.write_all(b"]")?;
                if let Some((origin, count)) = partial {
                    write!(ctx, "<{}.{}>", origin, count)?;
                }
                Ok(())
            }
        }
    }
}

impl EncodeIntoContext for SearchKey {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::And(keys) => {
                ctx.write_all(b"(")?;
                join_serializable(keys.as_ref(), b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::SequenceSet(set) => set.encode_ctx(ctx),
            Self::All => ctx.write_all(b"ALL"),
            Self::Answered => ctx.write_all(b"ANSWERED"),
            Self::Bcc(astring) => encode_key_astring(ctx, b"BCC", astring),
            Self::Before(date) => encode_key_date(ctx, b"BEFORE", date),
            Self::Body(astring) => encode_key_astring(ctx, b"BODY", astring),
            Self::Cc(astring) => encode_key_astring(ctx, b"CC", astring),
            Self::Deleted => ctx.write_all(b"DELETED"),
            Self::Draft => ctx.write_all(b"DRAFT"),
            Self::Flagged => ctx.write_all(b"FLAGGED"),
            Self::From(astring) => encode_key_astring(ctx, b"FROM", astring),
            Self::Header(name, value) => {
                ctx.write_all(b"HEADER ")?;
                name.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                value.encode_ctx(ctx)
            }
            Self::Keyword(atom) => {
                ctx.write_all(b"KEYWORD ")?;
                atom.encode_ctx(ctx)
            }
            Self::Larger(size) => write!(ctx, "LARGER {}", size),
            Self::New => ctx.write_all(b"NEW"),
            Self::Not(inner) => {
                ctx.write_all(b"NOT ")?;
                inner.encode_ctx(ctx)
            }
            Self::Old => ctx.write_all(b"OLD"),
            Self::On(date) => encode_key_date(ctx, b"ON", date),
            Self::Or(left, right) => {
                ctx.write_all(b"OR ")?;
                left.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                right.encode_ctx(ctx)
            }
            Self::Recent => ctx.write_all(b"RECENT"),
            Self::Seen => ctx.write_all(b"SEEN"),
            Self::SentBefore(date) => encode_key_date(ctx, b"SENTBEFORE", date),
            Self::SentOn(date) => encode_key_date(ctx, b"SENTON", date),
            Self::SentSince(date) => encode_key_date(ctx, b"SENTSINCE", date),
            Self::Since(date) => encode_key_date(ctx, b"SINCE", date),
            Self::Smaller(size) => write!(ctx, "SMALLER {}", size),
            Self::Subject(astring) => encode_key_astring(ctx, b"SUBJECT", astring),
            Self::Text(astring) => encode_key_astring(ctx, b"TEXT", astring),
            Self::To(astring) => encode_key_astring(ctx, b"TO", astring),
            Self::Uid(set) => {
                ctx.write_all(b"UID ")?;
                set.encode_ctx(ctx)
            }
            Self::Unanswered => ctx.write_all(b"UNANSWERED"),
            Self::Undeleted => ctx.write_all(b"UNDELETED"),
            Self::Undraft => ctx.write_all(b"UNDRAFT"),
            Self::Unflagged => ctx.write_all(b"UNFLAGGED"),
            Self::Unkeyword(atom) => {
                ctx.write_all(b"UNKEYWORD ")?;
                atom.encode_ctx(ctx)
            }
            Self::Unseen => ctx.write_all(b"UNSEEN"),
        }
    }
}

fn encode_key_astring(
    ctx: &mut EncodeContext,
    key: &[u8],
    value: &AString,
) -> std::io::Result<()> {
    ctx.write_all(key)?;
    ctx.write_all(b" ")?;
    value.encode_ctx(ctx)
}

fn encode_key_date(ctx: &mut EncodeContext, key: &[u8], date: &NaiveDate) -> std::io::Result<()> {
    ctx.write_all(key)?;
    ctx.write_all(b" ")?;
    date.encode_ctx(ctx)
}

// `Vec1` appears in joined positions only; keep a direct impl for
// call sites that hold one.
impl<T: EncodeIntoContext> EncodeIntoContext for Vec1<T> {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        join_serializable(self.as_ref(), b" ", ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;
    use crate::decode::decode_command;

    fn dump(value: &impl Encode) -> Vec<u8> {
        value.encode().dump()
    }

    #[test]
    fn test_greeting() {
        let greeting = Greeting::ok(None, "Missive ready").unwrap();
        assert_eq!(dump(&greeting), b"* OK Missive ready\r\n");
    }

    #[test]
    fn test_status_with_code() {
        let status = Status::ok(
            Some(Tag::unvalidated("a2")),
            Some(Code::ReadWrite),
            "SELECT completed",
        )
        .unwrap();
        assert_eq!(dump(&status), b"a2 OK [READ-WRITE] SELECT completed\r\n");
    }

    #[test]
    fn test_untagged_exists_recent() {
        assert_eq!(dump(&Data::Exists(0)), b"* 0 EXISTS\r\n");
        assert_eq!(dump(&Data::Recent(1)), b"* 1 RECENT\r\n");
        assert_eq!(
            dump(&Data::Expunge(NonZeroU32::new(2).unwrap())),
            b"* 2 EXPUNGE\r\n"
        );
    }

    #[test]
    fn test_uidvalidity_codes() {
        let status = Status::ok(
            None,
            Some(Code::UidValidity(NonZeroU32::new(42).unwrap())),
            "UIDs valid",
        )
        .unwrap();
        assert_eq!(dump(&status), b"* OK [UIDVALIDITY 42] UIDs valid\r\n");

        let status = Status::ok(
            None,
            Some(Code::AppendUid {
                uid_validity: NonZeroU32::new(3).unwrap(),
                uid: NonZeroU32::new(1).unwrap(),
            }),
            "APPEND completed",
        )
        .unwrap();
        assert_eq!(dump(&status), b"* OK [APPENDUID 3 1] APPEND completed\r\n");
    }

    #[test]
    fn test_fetch_data() {
        let data = Data::Fetch {
            seq: NonZeroU32::new(1).unwrap(),
            items: Vec1::try_from(vec![
                MessageDataItem::Uid(NonZeroU32::new(1).unwrap()),
                MessageDataItem::Flags(vec![FlagFetch::Recent]),
            ])
            .unwrap(),
        };
        assert_eq!(dump(&data), b"* 1 FETCH (UID 1 FLAGS (\\Recent))\r\n");
    }

    #[test]
    fn test_literal_fragments() {
        let data = Data::Fetch {
            seq: NonZeroU32::new(7).unwrap(),
            items: Vec1::from(MessageDataItem::Rfc822(
                NString::try_from(b"raw\r\nbytes".to_vec()).unwrap(),
            )),
        };
        let fragments: Vec<Fragment> = data.encode().collect();
        assert_eq!(
            fragments,
            vec![
                Fragment::Line {
                    data: b"* 7 FETCH (RFC822 {10}\r\n".to_vec()
                },
                Fragment::Literal {
                    data: b"raw\r\nbytes".to_vec(),
                    mode: LiteralMode::Sync
                },
                Fragment::Line {
                    data: b")\r\n".to_vec()
                },
            ]
        );
    }

    #[test]
    fn test_continuation() {
        let cont = ContinuationRequest::basic(None, "OK").unwrap();
        assert_eq!(dump(&cont), b"+ OK\r\n");

        let cont = ContinuationRequest::base64(b"challenge".to_vec());
        assert_eq!(dump(&cont), b"+ Y2hhbGxlbmdl\r\n");
    }

    #[test]
    fn test_namespace() {
        let data = Data::Namespace {
            personal: vec![(
                IString::try_from("").unwrap(),
                Some(QuotedChar::unvalidated('/')),
            )],
            other: vec![],
            shared: vec![],
        };
        assert_eq!(dump(&data), b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n");
    }

    #[test]
    fn test_command_round_trip() {
        let commands = [
            Command::new("a1", CommandBody::Capability),
            Command::new(
                "a2",
                CommandBody::Login {
                    username: AString::try_from("alice").unwrap(),
                    password: crate::core::Secret::new(AString::try_from("hunter2").unwrap()),
                },
            ),
            Command::new(
                "a3",
                CommandBody::Fetch {
                    sequence_set: SequenceSet::all(),
                    macro_or_item_names: MacroOrMessageDataItemNames::MessageDataItemNames(vec![
                        MessageDataItemName::Flags,
                        MessageDataItemName::Uid,
                    ]),
                    uid: true,
                },
            ),
            Command::new(
                "a4",
                CommandBody::Store {
                    sequence_set: SequenceSet::all(),
                    kind: StoreType::Add,
                    response: StoreResponse::Silent,
                    flags: vec![Flag::Deleted],
                    uid: false,
                },
            ),
        ];

        for command in commands {
            let bytes = command.encode().dump();
            let (rem, decoded) = decode_command(&bytes).unwrap();
            assert!(rem.is_empty());
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn test_quoted_escaping_round_trip() {
        let quoted = Quoted::try_from("say \"hi\" \\ there").unwrap();
        let bytes = {
            let mut ctx = EncodeContext::new();
            quoted.encode_ctx(&mut ctx).unwrap();
            let mut out = Vec::new();
            for item in ctx.into_items() {
                match item {
                    Fragment::Line { data } | Fragment::Literal { data, .. } => {
                        out.extend_from_slice(&data)
                    }
                }
            }
            out
        };
        let (_, reparsed) = crate::core::quoted(&[&bytes[..], b" "].concat()).unwrap();
        assert_eq!(reparsed, quoted);
    }
}
