//! Dispatch for the NotAuthenticated state.

use anyhow::Result;
use missive_backend::ArcLoginProvider;
use missive_imap::command::{Command, CommandBody};
use missive_imap::core::Secret;
use missive_imap::response::{Code, Data};

use crate::imap::capability::ServerCapability;
use crate::imap::flow;
use crate::imap::response::Response;

use super::anystate;

pub struct AnonymousContext<'a> {
    pub req: &'a Command,
    pub login_provider: &'a ArcLoginProvider,
    pub server_capabilities: &'a ServerCapability,
    /// A TLS acceptor is configured and the transport is still plain.
    pub tls_available: bool,
    /// TLS is active, or the peer is local (loopback / UNIX socket).
    pub secure: bool,
}

pub async fn dispatch(ctx: AnonymousContext<'_>) -> Result<(Response, flow::Transition)> {
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

        // RFC 5161: nothing is enableable before authentication, but the
        // command itself is permitted.
        CommandBody::Enable { .. } => Ok((
            Response::build()
                .to_req(ctx.req)
                .message("ENABLE completed")
                .data(Data::Enabled {
                    capabilities: vec![],
                })
                .ok()?,
            flow::Transition::None,
        )),

        // Specific to this state
        CommandBody::StartTls => ctx.start_tls(),
        CommandBody::Login { username, password } => ctx.login(username, password).await,

        // AUTHENTICATE is driven by the session itself (it spans
        // continuation lines); everything else is out of place.
        _ => anystate::wrong_state(ctx.req.tag.clone()),
    }
}

impl<'a> AnonymousContext<'a> {
    fn start_tls(self) -> Result<(Response, flow::Transition)> {
        if !self.tls_available {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("TLS is not available on this listener")
                    .no()?,
                flow::Transition::None,
            ));
        }
        Ok((
            Response::build()
                .to_req(self.req)
                .message("Begin TLS negotiation now")
                .ok()?,
            flow::Transition::StartTls,
        ))
    }

    async fn login(
        self,
        username: &missive_imap::core::AString,
        password: &Secret<missive_imap::core::AString>,
    ) -> Result<(Response, flow::Transition)> {
        if !self.secure {
            return Ok((
                Response::build()
                    .to_req(self.req)
                    .message("Run STARTTLS first")
                    .no()?,
                flow::Transition::None,
            ));
        }

        let (username, password) = (
            String::try_from(username)?,
            String::try_from(password.declassify())?,
        );
        tracing::info!(user = %username, "command.login");

        let store = match self.login_provider.login(&username, &password).await {
            Err(e) => {
                tracing::debug!(user=%username, error=%e, "authentication failed");
                return Ok((
                    Response::build()
                        .to_req(self.req)
                        .message("Authentication failed")
                        .code(Code::AuthenticationFailed)
                        .no()?,
                    flow::Transition::None,
                ));
            }
            Ok(store) => store,
        };

        tracing::info!(user = %username, "connected");
        Ok((
            Response::build()
                .to_req(self.req)
                .message("Login completed")
                .ok()?,
            flow::Transition::Authenticate(store),
        ))
    }
}
