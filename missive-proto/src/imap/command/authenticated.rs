//! Dispatch for the Authenticated state (also reached as a fallback from
//! Selected for the commands shared between the two).

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use missive_backend::{DeliverFilter, MailStore, MailboxHandle, StoreError,
    MAILBOX_HIERARCHY_DELIMITER as MBX_HIER_DELIM_RAW};
use missive_imap::command::{CapabilityEnable, Command, CommandBody};
use missive_imap::core::{Atom, IString, Literal, QuotedChar, Vec1};
use missive_imap::datetime::DateTime;
use missive_imap::flag::{Flag, FlagNameAttribute};
use missive_imap::mailbox::{ListMailbox, Mailbox as MailboxCodec};
use missive_imap::response::{Code, Data};
use missive_imap::status::{StatusDataItem, StatusDataItemName};

use crate::imap::capability::{ClientCapability, ServerCapability};
use crate::imap::command::{anystate, mailbox_name};
use crate::imap::errors::{store_error_response, Target};
use crate::imap::flags;
use crate::imap::flow;
use crate::imap::mailbox_view::MailboxView;
use crate::imap::response::Response;

pub struct AuthenticatedContext<'a> {
    pub req: &'a Command,
    pub server_capabilities: &'a ServerCapability,
    pub client_capabilities: &'a mut ClientCapability,
    pub store: &'a Arc<dyn MailStore>,
    pub deliver_filter: &'a Arc<dyn DeliverFilter>,
    pub tls_available: bool,
    pub secure: bool,
}

pub async fn dispatch<'a>(
    mut ctx: AuthenticatedContext<'a>,
) -> Result<(Response, flow::Transition)> {
    match &ctx.req.body {
        // Any state
        CommandBody::Noop => anystate::noop_nothing(ctx.req.tag.clone()),
        CommandBody::Capability => anystate::capability(
            ctx.req.tag.clone(),
            ctx.server_capabilities
                .advertise(ctx.tls_available, ctx.secure),
        ),
        CommandBody::Logout => anystate::logout(ctx.req.tag.clone()),
        CommandBody::Id { parameters } => anystate::id(ctx.req.tag.clone(), parameters),

        // Specific to this state
        CommandBody::Create { mailbox } => ctx.create(mailbox).await,
        CommandBody::Delete { mailbox } => ctx.delete(mailbox).await,
        CommandBody::Rename { from, to } => ctx.rename(from, to).await,
        CommandBody::Lsub {
            reference,
            mailbox_wildcard,
        } => ctx.list(reference, mailbox_wildcard, true).await,
        CommandBody::List {
            reference,
            mailbox_wildcard,
        } => ctx.list(reference, mailbox_wildcard, false).await,
        CommandBody::Status {
            mailbox,
            item_names,
        } => ctx.status(mailbox, item_names).await,
        CommandBody::Subscribe { mailbox } => ctx.subscribe(mailbox).await,
        CommandBody::Unsubscribe { mailbox } => ctx.unsubscribe(mailbox).await,
        CommandBody::Select { mailbox } => ctx.select(mailbox).await,
        CommandBody::Examine { mailbox } => ctx.examine(mailbox).await,
        CommandBody::Append {
            mailbox,
            flags,
            date,
            message,
        } => ctx.append(mailbox, flags, date, message).await,
        CommandBody::Enable { capabilities } => ctx.enable(capabilities),
        CommandBody::Namespace => ctx.namespace(),

        // Everything else is Selected-only (or NotAuthenticated-only).
        _ => anystate::wrong_state(ctx.req.tag.clone()),
    }
}

impl<'a> AuthenticatedContext<'a> {
    async fn create(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        if matches!(mailbox, MailboxCodec::Inbox) {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Cannot create INBOX")
                    .bad()?,
                flow::Transition::None,
            ));
        }
        let name = mailbox_name(mailbox)?;

        match self.store.create_mailbox(&name).await {
            Ok(()) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("CREATE completed")
                    .ok()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                store_error_response(&e, self.req.tag.clone(), Target::Other)?,
                flow::Transition::None,
            )),
        }
    }

    async fn delete(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        match self.store.delete_mailbox(&name).await {
            Ok(()) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("DELETE completed")
                    .ok()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                store_error_response(&e, self.req.tag.clone(), Target::Other)?,
                flow::Transition::None,
            )),
        }
    }

    async fn rename(
        self,
        from: &MailboxCodec,
        to: &MailboxCodec,
    ) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(from)?;
        let new_name = mailbox_name(to)?;

        match self.store.rename_mailbox(&name, &new_name).await {
            Ok(()) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("RENAME completed")
                    .ok()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                store_error_response(&e, self.req.tag.clone(), Target::Other)?,
                flow::Transition::None,
            )),
        }
    }

    async fn list(
        &mut self,
        reference: &MailboxCodec,
        mailbox_wildcard: &ListMailbox,
        is_lsub: bool,
    ) -> Result<(Response, flow::Transition)> {
        let mbx_hier_delim: QuotedChar = QuotedChar::unvalidated(MBX_HIER_DELIM_RAW);

        let reference = mailbox_name(reference)?;
        let wildcard = std::str::from_utf8(mailbox_wildcard.as_bytes())?;

        // An empty ("" "") LIST asks for the hierarchy delimiter.
        if wildcard.is_empty() {
            let data = if is_lsub {
                Data::Lsub {
                    items: vec![],
                    delimiter: Some(mbx_hier_delim),
                    mailbox: MailboxCodec::from_utf8("")?,
                }
            } else {
                Data::List {
                    items: vec![],
                    delimiter: Some(mbx_hier_delim),
                    mailbox: MailboxCodec::from_utf8("")?,
                }
            };
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message(if is_lsub {
                        "LSUB completed"
                    } else {
                        "LIST completed"
                    })
                    .data(data)
                    .ok()?,
                flow::Transition::None,
            ));
        }

        // The reference simply prefixes the pattern.
        let pattern = format!("{}{}", reference, wildcard);

        let known = self.store.list_mailboxes().await?;
        let selection: Vec<String> = if is_lsub {
            self.store.subscriptions().await?
        } else {
            known.clone()
        };

        // Intermediate hierarchy levels show up as \Noselect rows.
        let mut vmailboxes: BTreeMap<String, bool> = BTreeMap::new();
        for name in selection.iter() {
            for (i, _) in name.match_indices(MBX_HIER_DELIM_RAW) {
                if i > 0 {
                    vmailboxes.entry(name[..i].to_string()).or_insert(false);
                }
            }
            vmailboxes.insert(name.clone(), true);
        }

        let mut ret = vec![];
        for (name, is_real) in vmailboxes.iter() {
            if !matches_wildcard(&pattern, name) {
                continue;
            }

            let mailbox = MailboxCodec::from_utf8(name)?;
            let mut items = vec![];

            if !*is_real || (is_lsub && !known.contains(name)) {
                items.push(FlagNameAttribute::Noselect);
            }

            // CHILDREN (RFC 3348)
            let prefix = format!("{}{}", name, MBX_HIER_DELIM_RAW);
            let has_children = known.iter().any(|other| other.starts_with(&prefix));
            items.push(FlagNameAttribute::Extension(Atom::unvalidated(
                if has_children {
                    "HasChildren"
                } else {
                    "HasNoChildren"
                },
            )));

            if is_lsub {
                ret.push(Data::Lsub {
                    items,
                    delimiter: Some(mbx_hier_delim),
                    mailbox,
                });
            } else {
                ret.push(Data::List {
                    items,
                    delimiter: Some(mbx_hier_delim),
                    mailbox,
                });
            }
        }

        let msg = if is_lsub {
            "LSUB completed"
        } else {
            "LIST completed"
        };
        Ok((
            Response::build()
                .to_req(self.req)
                .message(msg)
                .many_data(ret)
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn status(
        &mut self,
        mailbox: &MailboxCodec,
        attributes: &[StatusDataItemName],
    ) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        let handle = match self.store.open_mailbox(&name).await? {
            Some(handle) => handle,
            None => {
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Mailbox does not exist")
                        .no()?,
                    flow::Transition::None,
                ))
            }
        };

        let items = status_items(&handle, attributes).await?;
        let data = Data::Status {
            mailbox: mailbox.clone(),
            items,
        };

        Ok((
            Response::build()
                .to_req(self.req)
                .message("STATUS completed")
                .data(data)
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn subscribe(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        if !self.store.has_mailbox(&name).await? {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Mailbox does not exist")
                    .no()?,
                flow::Transition::None,
            ));
        }
        self.store.subscribe(&name).await?;
        Ok((
            Response::build()
                .to_req(self.req)
                .message("SUBSCRIBE completed")
                .ok()?,
            flow::Transition::None,
        ))
    }

    async fn unsubscribe(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        match self.store.unsubscribe(&name).await {
            Ok(()) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("UNSUBSCRIBE completed")
                    .ok()?,
                flow::Transition::None,
            )),
            Err(StoreError::NotFound(_)) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Not subscribed to that mailbox")
                    .no()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                store_error_response(&e, self.req.tag.clone(), Target::Other)?,
                flow::Transition::None,
            )),
        }
    }

    async fn select(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        let handle = match self.store.open_mailbox(&name).await? {
            Some(handle) => handle,
            None => {
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Mailbox does not exist")
                        .no()?,
                    flow::Transition::None,
                ))
            }
        };
        tracing::info!(user=%self.store.username(), mailbox=%name, "mailbox.selected");

        let view = MailboxView::new(handle).await;
        let data = view.summary()?;

        Ok((
            Response::build()
                .to_req(self.req)
                .message("SELECT completed")
                .code(Code::ReadWrite)
                .set_body(data)
                .ok()?,
            flow::Transition::Select(view, flow::MailboxPerm::ReadWrite),
        ))
    }

    async fn examine(self, mailbox: &MailboxCodec) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        let handle = match self.store.open_mailbox(&name).await? {
            Some(handle) => handle,
            None => {
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Mailbox does not exist")
                        .no()?,
                    flow::Transition::None,
                ))
            }
        };
        tracing::info!(user=%self.store.username(), mailbox=%name, "mailbox.examined");

        let view = MailboxView::new(handle).await;
        let data = view.summary()?;

        Ok((
            Response::build()
                .to_req(self.req)
                .message("EXAMINE completed")
                .code(Code::ReadOnly)
                .set_body(data)
                .ok()?,
            flow::Transition::Select(view, flow::MailboxPerm::ReadOnly),
        ))
    }

    async fn append(
        self,
        mailbox: &MailboxCodec,
        flags: &[Flag],
        date: &Option<DateTime>,
        message: &Literal,
    ) -> Result<(Response, flow::Transition)> {
        let name = mailbox_name(mailbox)?;

        let internaldate = date
            .as_ref()
            .map(|d| d.inner().with_timezone(&Utc));

        // The deliver filter may rewrite flags or redirect the target.
        let (name, flags) = self
            .deliver_filter
            .apply(name, flags::to_backend(flags), message.data())
            .await;

        let handle = match self.store.open_mailbox(&name).await? {
            Some(handle) => handle,
            None => {
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Mailbox does not exist")
                        .code(Code::TryCreate)
                        .no()?,
                    flow::Transition::None,
                ))
            }
        };

        match handle
            .append(flags, internaldate, message.data().to_vec())
            .await
        {
            Ok((uid_validity, uid)) => Ok((
                Response::build()
                    .to_req(self.req)
                    .message("APPEND completed")
                    .code(Code::AppendUid { uid_validity, uid })
                    .ok()?,
                flow::Transition::None,
            )),
            Err(e) => Ok((
                store_error_response(&e, self.req.tag.clone(), Target::Destination)?,
                flow::Transition::None,
            )),
        }
    }

    fn enable(
        self,
        cap_enable: &Vec1<CapabilityEnable>,
    ) -> Result<(Response, flow::Transition)> {
        let capabilities = self.client_capabilities.try_enable(cap_enable.as_ref());
        let mut response_builder = Response::build().to_req(self.req);
        if !capabilities.is_empty() {
            response_builder = response_builder.data(Data::Enabled { capabilities });
        }
        Ok((
            response_builder.message("ENABLE completed").ok()?,
            flow::Transition::None,
        ))
    }

    /// RFC 2342: one personal namespace rooted at "", no others.
    fn namespace(self) -> Result<(Response, flow::Transition)> {
        Ok((
            Response::build()
                .to_req(self.req)
                .message("NAMESPACE completed")
                .data(Data::Namespace {
                    personal: vec![(
                        IString::try_from("")?,
                        Some(QuotedChar::unvalidated(MBX_HIER_DELIM_RAW)),
                    )],
                    other: vec![],
                    shared: vec![],
                })
                .ok()?,
            flow::Transition::None,
        ))
    }
}

pub(crate) async fn status_items(
    handle: &Arc<dyn MailboxHandle>,
    attributes: &[StatusDataItemName],
) -> Result<Vec<StatusDataItem>> {
    let snapshot = handle.snapshot().await;

    let mut items = vec![];
    for attr in attributes.iter() {
        items.push(match attr {
            StatusDataItemName::Messages => StatusDataItem::Messages(snapshot.exists() as u32),
            StatusDataItemName::Recent => StatusDataItem::Recent(handle.pending_recent().await),
            StatusDataItemName::UidNext => StatusDataItem::UidNext(snapshot.uidnext),
            StatusDataItemName::UidValidity => {
                StatusDataItem::UidValidity(snapshot.uidvalidity)
            }
            StatusDataItemName::Unseen => StatusDataItem::Unseen(
                (snapshot.exists() - snapshot.seen_count()) as u32,
            ),
        });
    }
    Ok(items)
}

/// IMAP LIST wildcards: `*` crosses the hierarchy delimiter, `%` stops
/// at it.
fn matches_wildcard(wildcard: &str, name: &str) -> bool {
    let wildcard = wildcard.chars().collect::<Vec<char>>();
    let name = name.chars().collect::<Vec<char>>();

    let mut matches = vec![vec![false; wildcard.len() + 1]; name.len() + 1];

    for i in 0..=name.len() {
        for j in 0..=wildcard.len() {
            matches[i][j] = (i == 0 && j == 0)
                || (j > 0
                    && matches[i][j - 1]
                    && (wildcard[j - 1] == '%' || wildcard[j - 1] == '*'))
                || (i > 0
                    && j > 0
                    && matches[i - 1][j - 1]
                    && wildcard[j - 1] == name[i - 1]
                    && wildcard[j - 1] != '%'
                    && wildcard[j - 1] != '*')
                || (i > 0
                    && j > 0
                    && matches[i - 1][j]
                    && (wildcard[j - 1] == '*'
                        || (wildcard[j - 1] == '%' && name[i - 1] != MBX_HIER_DELIM_RAW)));
        }
    }

    matches[name.len()][wildcard.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches() {
        assert!(matches_wildcard("INBOX", "INBOX"));
        assert!(matches_wildcard("*", "INBOX"));
        assert!(matches_wildcard("%", "INBOX"));
        assert!(!matches_wildcard("%", "Test/Azerty"));
        assert!(!matches_wildcard("INBOX/*", "INBOX"));
        assert!(matches_wildcard("Sent/*", "Sent/A"));
        assert!(matches_wildcard("Sent/*", "Sent/A/B"));
        assert!(!matches_wildcard("Sent/%", "Sent/A/B"));
    }
}
