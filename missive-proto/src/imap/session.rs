//! One IMAP session: the protocol state machine behind a connection.

use std::sync::Arc;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::Notify;

use missive_backend::{ArcLoginProvider, DeliverFilter, MailStore};
use missive_imap::auth::{AuthMechanism, AuthenticateData};
use missive_imap::command::{Command, CommandBody};
use missive_imap::core::Tag;
use missive_imap::response::Code;
use missive_sasl::{AuthRes, Credentials, Mechanism, State as SaslState};

use crate::imap::capability::{ClientCapability, ServerCapability};
use crate::imap::command::{anonymous, authenticated, selected};
use crate::imap::flow;
use crate::imap::request::Request;
use crate::imap::response::{Response, ResponseOrIdle};

/// Connection facts the session needs for its decisions.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// TLS can still be started on this connection.
    pub tls_available: bool,
    /// TLS is active or the peer is trusted to be local.
    pub secure: bool,
    /// AUTH=EXTERNAL asserts identities without proof; only trusted
    /// listeners (UNIX sockets) may allow it.
    pub external_allowed: bool,
}

struct SaslExchange {
    tag: Tag,
    flow: SaslState,
}

pub struct Instance {
    pub login_provider: ArcLoginProvider,
    pub server_capabilities: ServerCapability,
    pub client_capabilities: ClientCapability,
    pub state: flow::State,
    pub info: SessionInfo,
    deliver_filter: Arc<dyn DeliverFilter>,
    sasl: Option<SaslExchange>,
    compressed: bool,
}

impl Instance {
    pub fn new(
        login_provider: ArcLoginProvider,
        cap: ServerCapability,
        deliver_filter: Arc<dyn DeliverFilter>,
        info: SessionInfo,
        preauth: Option<Arc<dyn MailStore>>,
    ) -> Self {
        let state = match preauth {
            Some(store) => flow::State::Authenticated(store),
            None => flow::State::NotAuthenticated,
        };
        Self {
            login_provider,
            state,
            server_capabilities: cap,
            client_capabilities: ClientCapability::default(),
            info,
            deliver_filter,
            sasl: None,
            compressed: false,
        }
    }

    pub async fn request(&mut self, req: Request) -> ResponseOrIdle {
        match req {
            Request::IdleStart(tag) => self.idle_init(tag),
            Request::IdlePoll => self.idle_poll().await,
            Request::ImapCommand(cmd) => self.command(cmd).await,
            Request::SaslAnswer(data) => self.sasl_answer(data).await,
        }
    }

    pub fn idle_init(&mut self, tag: Tag) -> ResponseOrIdle {
        let transition = flow::Transition::Idle(tag.clone(), Notify::new());

        let maybe_stop = self
            .state
            .apply(transition)
            .context("IDLE transition failed")
            .and_then(|_| {
                self.state
                    .notify()
                    .ok_or(anyhow!("IDLE state has no Notify object"))
            });

        match maybe_stop {
            Ok(stop) => ResponseOrIdle::IdleAccept(stop),
            Err(_) => {
                let no = Response::build()
                    .tag(tag)
                    .message("IDLE is only allowed with a selected mailbox")
                    .bad()
                    .unwrap();
                ResponseOrIdle::IdleReject(no)
            }
        }
    }

    pub async fn idle_poll(&mut self) -> ResponseOrIdle {
        match self.idle_poll_happy().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(err=?e, "something bad happened in idle");
                ResponseOrIdle::Response(Response::bye().unwrap())
            }
        }
    }

    async fn idle_poll_happy(&mut self) -> Result<ResponseOrIdle> {
        let (view, tag, stop) = match &mut self.state {
            flow::State::Idle(_, view, _, tag, stop) => (view, tag.clone(), stop.clone()),
            _ => bail!("invalid session state, can't idle"),
        };

        tokio::select! {
            _ = stop.notified() => {
                self.state.apply(flow::Transition::UnIdle)?;
                Ok(ResponseOrIdle::Response(Response::build()
                    .tag(tag)
                    .message("IDLE completed")
                    .ok()?))
            },
            change = view.idle_sync() => {
                tracing::debug!("idle event");
                Ok(ResponseOrIdle::IdleEvent(change?))
            }
        }
    }

    pub async fn command(&mut self, cmd: Command) -> ResponseOrIdle {
        // COMPRESS and AUTHENTICATE involve the connection loop itself;
        // they are driven here rather than in the per-state dispatch.
        match &cmd.body {
            CommandBody::Compress { .. } => return self.compress(&cmd),
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => {
                let (mechanism, initial_response) =
                    (mechanism.clone(), initial_response.clone());
                return self.authenticate(cmd, mechanism, initial_response).await;
            }
            _ => (),
        }

        let (resp, tr) = match &mut self.state {
            flow::State::NotAuthenticated => {
                let ctx = anonymous::AnonymousContext {
                    req: &cmd,
                    login_provider: &self.login_provider,
                    server_capabilities: &self.server_capabilities,
                    tls_available: self.info.tls_available,
                    secure: self.info.secure,
                };
                anonymous::dispatch(ctx).await
            }
            flow::State::Authenticated(ref store) => {
                let ctx = authenticated::AuthenticatedContext {
                    req: &cmd,
                    server_capabilities: &self.server_capabilities,
                    client_capabilities: &mut self.client_capabilities,
                    store,
                    deliver_filter: &self.deliver_filter,
                    tls_available: self.info.tls_available,
                    secure: self.info.secure,
                };
                authenticated::dispatch(ctx).await
            }
            flow::State::Selected(ref store, ref mut mailbox, ref perm) => {
                let ctx = selected::SelectedContext {
                    req: &cmd,
                    server_capabilities: &self.server_capabilities,
                    client_capabilities: &mut self.client_capabilities,
                    store,
                    mailbox,
                    deliver_filter: &self.deliver_filter,
                    perm,
                    tls_available: self.info.tls_available,
                    secure: self.info.secure,
                };
                selected::dispatch(ctx).await
            }
            flow::State::Idle(..) => Err(anyhow!("can not receive command while idling")),
            flow::State::Logout => Response::build()
                .tag(cmd.tag.clone())
                .message("No commands are allowed in the LOGOUT state.")
                .bad()
                .map(|r| (r, flow::Transition::None)),
        }
        .unwrap_or_else(|err| {
            tracing::error!("command error {:?} occurred while processing {:?}", err, cmd);
            (
                Response::build()
                    .to_req(&cmd)
                    .message("Internal error while processing command")
                    .bad()
                    .unwrap(),
                flow::Transition::None,
            )
        });

        // Transport upgrades never go through State::apply.
        match tr {
            flow::Transition::StartTls => {
                self.info.tls_available = false;
                self.info.secure = true;
                return ResponseOrIdle::StartTls(resp);
            }
            flow::Transition::Compress => unreachable!("COMPRESS is handled above"),
            tr => {
                let resp = self.flush_if_due(resp, &cmd, &tr).await;

                if let Err(e) = self.state.apply(tr) {
                    tracing::error!(
                        "transition error {:?} occurred while processing {:?}",
                        e,
                        cmd
                    );
                    return ResponseOrIdle::Response(
                        Response::build()
                            .to_req(&cmd)
                            .message("Internal error, command caused an illegal state transition")
                            .bad()
                            .unwrap(),
                    );
                }
                ResponseOrIdle::Response(resp)
            }
        }
    }

    /// Flush point (a): queued untagged updates go out immediately
    /// before the tagged response, except for FETCH/STORE/SEARCH whose
    /// output addresses sequence numbers of the frozen view.
    async fn flush_if_due(
        &mut self,
        mut resp: Response,
        cmd: &Command,
        tr: &flow::Transition,
    ) -> Response {
        let flushable = !matches!(
            cmd.body,
            CommandBody::Fetch { .. } | CommandBody::Store { .. } | CommandBody::Search { .. }
        );
        let stays_selected = matches!(tr, flow::Transition::None);

        if let (true, true, flow::State::Selected(_, view, _)) =
            (flushable, stays_selected, &mut self.state)
        {
            match view.flush().await {
                Ok(mut updates) => resp.body.append(&mut updates),
                Err(e) => tracing::error!(err=?e, "failed to flush pending updates"),
            }
        }
        resp
    }

    fn compress(&mut self, cmd: &Command) -> ResponseOrIdle {
        if self.compressed {
            let resp = Response::build()
                .to_req(cmd)
                .message("DEFLATE is already active")
                .code(Code::CompressionActive)
                .no()
                .unwrap();
            return ResponseOrIdle::Response(resp);
        }
        self.compressed = true;
        let resp = Response::build()
            .to_req(cmd)
            .message("DEFLATE active")
            .ok()
            .unwrap();
        ResponseOrIdle::Compress(resp)
    }

    async fn authenticate(
        &mut self,
        cmd: Command,
        mechanism: AuthMechanism,
        initial_response: Option<missive_imap::core::Secret<Vec<u8>>>,
    ) -> ResponseOrIdle {
        if !matches!(self.state, flow::State::NotAuthenticated) {
            return ResponseOrIdle::Response(
                Response::build()
                    .to_req(&cmd)
                    .message("Command not allowed in this state")
                    .bad()
                    .unwrap(),
            );
        }

        let mechanism = match mechanism {
            AuthMechanism::Plain => Mechanism::Plain,
            AuthMechanism::External => Mechanism::External,
            other => {
                return ResponseOrIdle::Response(
                    Response::build()
                        .to_req(&cmd)
                        .message(format!("{} is not a supported mechanism", other))
                        .code(Code::AuthenticationFailed)
                        .no()
                        .unwrap(),
                );
            }
        };

        if matches!(mechanism, Mechanism::Plain) && !self.info.secure {
            return ResponseOrIdle::Response(
                Response::build()
                    .to_req(&cmd)
                    .message("Run STARTTLS first")
                    .no()
                    .unwrap(),
            );
        }

        let mut flow = SaslState::new(mechanism);
        let challenge = flow
            .initial_challenge()
            .expect("fresh SASL exchanges accept a challenge");
        self.sasl = Some(SaslExchange {
            tag: cmd.tag,
            flow,
        });

        // SASL-IR: the response was inlined, skip the continuation.
        match initial_response {
            Some(ir) => self.sasl_answer(AuthenticateData::Continue(ir)).await,
            None => ResponseOrIdle::SaslChallenge(challenge),
        }
    }

    async fn sasl_answer(&mut self, data: AuthenticateData) -> ResponseOrIdle {
        let Some(mut exchange) = self.sasl.take() else {
            return ResponseOrIdle::Response(
                Response::build()
                    .message("No authentication in progress")
                    .bad()
                    .unwrap(),
            );
        };

        let payload = match data {
            AuthenticateData::Cancel => {
                return ResponseOrIdle::Response(
                    Response::build()
                        .tag(exchange.tag)
                        .message("AUTHENTICATE cancelled")
                        .bad()
                        .unwrap(),
                );
            }
            AuthenticateData::Continue(secret) => secret,
        };

        let provider = self.login_provider.clone();
        let external_allowed = self.info.external_allowed;
        let store_slot: Arc<Mutex<Option<Arc<dyn MailStore>>>> = Arc::new(Mutex::new(None));
        let slot = store_slot.clone();

        exchange
            .flow
            .progress(payload.declassify(), move |creds| async move {
                let outcome = match creds {
                    Credentials::Password { username, password } => provider
                        .login(&username, &password)
                        .await
                        .ok()
                        .map(|store| (username, store)),
                    Credentials::External { identity } if external_allowed => provider
                        .assume(&identity)
                        .await
                        .ok()
                        .map(|store| (identity, store)),
                    Credentials::External { .. } => {
                        tracing::warn!("EXTERNAL is not allowed on this listener");
                        None
                    }
                };
                match outcome {
                    Some((identity, store)) => {
                        *slot.lock().unwrap() = Some(store);
                        Some(identity)
                    }
                    None => None,
                }
            })
            .await;

        match exchange.flow {
            SaslState::Done(AuthRes::Success(identity)) => {
                let store = store_slot
                    .lock()
                    .unwrap()
                    .take()
                    .expect("successful SASL exchanges carry a store");
                if let Err(e) = self.state.apply(flow::Transition::Authenticate(store)) {
                    tracing::error!(err=?e, "SASL success in a non-authenticable state");
                    return ResponseOrIdle::Response(
                        Response::build()
                            .tag(exchange.tag)
                            .message("Internal error")
                            .bad()
                            .unwrap(),
                    );
                }
                tracing::info!(user=%identity, "authenticated");
                ResponseOrIdle::Response(
                    Response::build()
                        .tag(exchange.tag)
                        .message("Authentication completed")
                        .ok()
                        .unwrap(),
                )
            }
            SaslState::Done(AuthRes::Failed) => ResponseOrIdle::Response(
                Response::build()
                    .tag(exchange.tag)
                    .message("Authentication failed")
                    .code(Code::AuthenticationFailed)
                    .no()
                    .unwrap(),
            ),
            _ => ResponseOrIdle::Response(
                Response::build()
                    .tag(exchange.tag)
                    .message("Authentication exchange is in a broken state")
                    .bad()
                    .unwrap(),
            ),
        }
    }
}
