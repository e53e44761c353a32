//! Dispatch for the Selected state.

use std::sync::Arc;

use anyhow::Result;

use missive_backend::{DeliverFilter, MailStore};
use missive_imap::command::{Command, CommandBody};
use missive_imap::core::{Charset, Vec1};
use missive_imap::fetch::MacroOrMessageDataItemNames;
use missive_imap::flag::{Flag, StoreResponse, StoreType};
use missive_imap::mailbox::Mailbox as MailboxCodec;
use missive_imap::response::Code;
use missive_imap::search::SearchKey;
use missive_imap::sequence::SequenceSet;

use crate::imap::attributes::AttributesProxy;
use crate::imap::capability::{ClientCapability, ServerCapability};
use crate::imap::command::{authenticated, mailbox_name};
use crate::imap::flow::{self, MailboxPerm};
use crate::imap::mailbox_view::MailboxView;
use crate::imap::response::Response;

pub struct SelectedContext<'a> {
    pub req: &'a Command,
    pub store: &'a Arc<dyn MailStore>,
    pub mailbox: &'a mut MailboxView,
    pub server_capabilities: &'a ServerCapability,
    pub client_capabilities: &'a mut ClientCapability,
    pub deliver_filter: &'a Arc<dyn DeliverFilter>,
    pub perm: &'a MailboxPerm,
    pub tls_available: bool,
    pub secure: bool,
}

pub async fn dispatch<'a>(ctx: SelectedContext<'a>) -> Result<(Response, flow::Transition)> {
    match &ctx.req.body {
        // Close releases the view; which flavor depends on the permission.
        CommandBody::Close => match ctx.perm {
            MailboxPerm::ReadWrite => ctx.close().await,
            MailboxPerm::ReadOnly => ctx.examine_close().await,
        },
        CommandBody::Check => ctx.check(),
        CommandBody::Fetch {
            sequence_set,
            macro_or_item_names,
            uid,
        } => ctx.fetch(sequence_set, macro_or_item_names, *uid).await,
        CommandBody::Search {
            charset,
            criteria,
            uid,
        } => ctx.search(charset, criteria, *uid).await,
        CommandBody::Expunge { uid_sequence_set } => {
            ctx.expunge(uid_sequence_set.as_ref()).await
        }
        CommandBody::Store {
            sequence_set,
            kind,
            response,
            flags,
            uid,
        } => ctx.store(sequence_set, *kind, *response, flags, *uid).await,
        CommandBody::Copy {
            sequence_set,
            mailbox,
            uid,
        } => ctx.copy(sequence_set, mailbox, *uid).await,
        CommandBody::Move {
            sequence_set,
            mailbox,
            uid,
        } => ctx.r#move(sequence_set, mailbox, *uid).await,
        CommandBody::Unselect => ctx.unselect().await,

        // IDLE never reaches this point: the connection loop routes it
        // through the session's idle path.
        // Shared with the Authenticated state.
        _ => {
            authenticated::dispatch(authenticated::AuthenticatedContext {
                req: ctx.req,
                server_capabilities: ctx.server_capabilities,
                client_capabilities: ctx.client_capabilities,
                store: ctx.store,
                deliver_filter: ctx.deliver_filter,
                tls_available: ctx.tls_available,
                secure: ctx.secure,
            })
            .await
        }
    }
}

impl<'a> SelectedContext<'a> {
    /// CLOSE expunges silently: no untagged EXPUNGE responses are sent.
    async fn close(self) -> Result<(Response, flow::Transition)> {
        self.mailbox.expunge(None).await?;
        Ok((
            Response::build()
                .to_req(self.req)
                .message("CLOSE completed")
                .ok()?,
            flow::Transition::Unselect,
        ))
    }

    /// CLOSE on an EXAMINEd mailbox does not expunge.
    async fn examine_close(self) -> Result<(Response, flow::Transition)> {
        Ok((
            Response::build()
                .to_req(self.req)
                .message("CLOSE completed")
                .ok()?,
            flow::Transition::Unselect,
        ))
    }

    async fn unselect(self) -> Result<(Response, flow::Transition)> {
        Ok((
            Response::build()
                .to_req(self.req)
                .message("UNSELECT completed")
                .ok()?,
            flow::Transition::Unselect,
        ))
    }

    /// The pending updates flow out through the session's flush.
    fn check(self) -> Result<(Response, flow::Transition)> {
        Ok((
            Response::build()
                .to_req(self.req)
                .message("CHECK completed")
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn fetch(
        self,
        sequence_set: &SequenceSet,
        attributes: &MacroOrMessageDataItemNames,
        uid: bool,
    ) -> Result<(Response, flow::Transition)> {
        let ap = AttributesProxy::new(attributes, uid);

        match self.mailbox.fetch(sequence_set, &ap, uid).await {
            Ok(resp) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("FETCH completed")
                    .set_body(resp)
                    .ok()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message(e.to_string())
                    .no()?,
                flow::Transition::None,
            )),
        }
    }

    async fn search(
        self,
        charset: &Option<Charset>,
        criteria: &Vec1<SearchKey>,
        uid: bool,
    ) -> Result<(Response, flow::Transition)> {
        if let Some(charset) = charset {
            let name = charset.as_str().to_ascii_uppercase();
            if name != "UTF-8" && name != "US-ASCII" {
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Unsupported charset")
                        .code(Code::BadCharset {
                            allowed: vec![
                                "US-ASCII".try_into()?,
                                "UTF-8".try_into()?,
                            ],
                        })
                        .no()?,
                    flow::Transition::None,
                ));
            }
        }

        let key = match criteria.as_ref() {
            [single] => single.clone(),
            _ => SearchKey::And(criteria.clone()),
        };

        let found = self.mailbox.search(&key, uid).await?;
        Ok((
            Response::build()
                .to_req(self.req)
                .set_body(found)
                .message("SEARCH completed")
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn expunge(
        self,
        uid_sequence_set: Option<&SequenceSet>,
    ) -> Result<(Response, flow::Transition)> {
        if let Some(failed) = self.fail_read_only() {
            return Ok((failed, flow::Transition::None));
        }

        self.mailbox.expunge(uid_sequence_set).await?;

        // The untagged EXPUNGE responses surface in the flush preceding
        // this tagged OK.
        Ok((
            Response::build()
                .to_req(self.req)
                .message("EXPUNGE completed")
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn store(
        self,
        sequence_set: &SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: &[Flag],
        uid: bool,
    ) -> Result<(Response, flow::Transition)> {
        if let Some(failed) = self.fail_read_only() {
            return Ok((failed, flow::Transition::None));
        }

        let data = self
            .mailbox
            .store(sequence_set, kind, response, flags, uid)
            .await?;

        Ok((
            Response::build()
                .to_req(self.req)
                .message("STORE completed")
                .set_body(data)
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn copy(
        self,
        sequence_set: &SequenceSet,
        mailbox: &MailboxCodec,
        uid: bool,
    ) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        if !self.store.has_mailbox(&name).await? {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Destination mailbox does not exist")
                    .code(Code::TryCreate)
                    .no()?,
                flow::Transition::None,
            ));
        }

        let mut ok_resp = Response::build()
            .to_req(self.req)
            .message("COPY completed");

        if let Some((uid_validity, uid_map)) =
            self.mailbox.copy(sequence_set, self.store, &name, uid).await?
        {
            ok_resp = ok_resp.code(Code::CopyUid {
                uid_validity,
                source: uid_map.iter().map(|(src, _)| *src).collect(),
                destination: uid_map.iter().map(|(_, dst)| *dst).collect(),
            });
        }

        Ok((ok_resp.ok()?, flow::Transition::None))
    }

    async fn r#move(
        self,
        sequence_set: &SequenceSet,
        mailbox: &MailboxCodec,
        uid: bool,
    ) -> Result<(Response, flow::Transition)> {
        if let Some(failed) = self.fail_read_only() {
            return Ok((failed, flow::Transition::None));
        }

        let name = mailbox_name(mailbox)?;

        if !self.store.has_mailbox(&name).await? {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Destination mailbox does not exist")
                    .code(Code::TryCreate)
                    .no()?,
                flow::Transition::None,
            ));
        }

        let mut ok_resp = Response::build()
            .to_req(self.req)
            .message("MOVE completed");

        if let Some((uid_validity, uid_map)) = self
            .mailbox
            .r#move(sequence_set, self.store, &name, uid)
            .await?
        {
            ok_resp = ok_resp.code(Code::CopyUid {
                uid_validity,
                source: uid_map.iter().map(|(src, _)| *src).collect(),
                destination: uid_map.iter().map(|(_, dst)| *dst).collect(),
            });
        }

        // The source-side untagged EXPUNGEs surface in the flush.
        Ok((ok_resp.ok()?, flow::Transition::None))
    }

    fn fail_read_only(&self) -> Option<Response> {
        match self.perm {
            MailboxPerm::ReadWrite => None,
            MailboxPerm::ReadOnly => Some(
                Response::build()
                    .to_req(self.req)
                    .message("Write commands are forbidden while examining a mailbox")
                    .code(Code::ReadOnly)
                    .no()
                    .unwrap(),
            ),
        }
    }
}
