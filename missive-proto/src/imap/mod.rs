pub mod attributes;
pub mod capability;
pub mod command;
pub mod errors;
pub mod flags;
pub mod flow;
pub mod framing;
pub mod index;
pub mod mail_view;
pub mod mailbox_view;
pub mod request;
pub mod response;
pub mod search;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::SinkExt;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;

use rustls_pemfile::{certs, private_key};

use missive_backend::{ArcLoginProvider, DeliverFilter, MailStore};
use missive_imap::command::CommandBody;
use missive_imap::response::{
    Code, ContinuationRequest, Greeting, Response as WireResponse, Status,
};

use crate::deflate::DeflateStream;
use crate::imap::capability::ServerCapability;
use crate::imap::framing::{Action, Event, ImapCodecError, ImapServerCodec, ReadMode};
use crate::imap::request::Request;
use crate::imap::response::{Body, Response, ResponseOrIdle};
use crate::imap::session::{Instance, SessionInfo};
use crate::proxy::read_proxy_header;
use crate::stream::{any_stream, AnyStream};

const PIPELINABLE_COMMANDS: usize = 64;

/// Per-command literal budget.
pub const DEFAULT_MAX_LITERAL: usize = 40 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum ListenerKind {
    Tcp {
        bind_addr: std::net::SocketAddr,
        /// Implicit TLS (the 993 flavor); needs `tls`.
        implicit_tls: bool,
    },
    Unix {
        path: PathBuf,
        /// Greet with PREAUTH as this user.
        preauth_user: Option<String>,
    },
}

#[derive(Clone)]
pub struct ServerParams {
    pub listener: ListenerKind,
    pub tls: Option<TlsAcceptor>,
    pub proxy_protocol: bool,
    pub max_literal_size: usize,
    pub command_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl ServerParams {
    pub fn new(listener: ListenerKind) -> Self {
        Self {
            listener,
            tls: None,
            proxy_protocol: false,
            max_literal_size: DEFAULT_MAX_LITERAL,
            command_timeout: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(29 * 60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

pub fn load_tls_acceptor(certs_path: &PathBuf, key_path: &PathBuf) -> Result<TlsAcceptor> {
    let loaded_certs = certs(&mut std::io::BufReader::new(
        std::fs::File::open(certs_path).context("opening certificate file")?,
    ))
    .collect::<Result<Vec<_>, _>>()?;
    let loaded_key = private_key(&mut std::io::BufReader::new(
        std::fs::File::open(key_path).context("opening key file")?,
    ))?
    .ok_or(anyhow!("no private key found"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(loaded_certs, loaded_key)?;
    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

pub struct Server {
    params: ServerParams,
    login_provider: ArcLoginProvider,
    deliver_filter: Arc<dyn DeliverFilter>,
    capabilities: ServerCapability,
}

#[derive(Clone)]
struct ClientContext {
    addr: String,
    login_provider: ArcLoginProvider,
    deliver_filter: Arc<dyn DeliverFilter>,
    must_exit: watch::Receiver<bool>,
    server_capabilities: ServerCapability,
    tls_acceptor: Option<TlsAcceptor>,
    info: SessionInfo,
    preauth_user: Option<String>,
    max_literal_size: usize,
    command_timeout: Duration,
    idle_timeout: Duration,
}

pub fn new(
    params: ServerParams,
    login_provider: ArcLoginProvider,
    deliver_filter: Arc<dyn DeliverFilter>,
) -> Server {
    Server {
        params,
        login_provider,
        deliver_filter,
        capabilities: ServerCapability::default(),
    }
}

impl Server {
    pub async fn run(self, must_exit: watch::Receiver<bool>) -> Result<()> {
        match self.params.listener.clone() {
            ListenerKind::Tcp {
                bind_addr,
                implicit_tls,
            } => {
                let tcp = TcpListener::bind(bind_addr).await?;
                tracing::info!("IMAP server listening on {:#}", bind_addr);
                self.run_tcp(tcp, implicit_tls, must_exit).await
            }
            ListenerKind::Unix { path, preauth_user } => {
                let _ = std::fs::remove_file(&path);
                let unix = UnixListener::bind(&path)?;
                tracing::info!("IMAP server listening on {}", path.display());
                self.run_unix(unix, preauth_user, must_exit).await
            }
        }
    }

    async fn run_tcp(
        self,
        tcp: TcpListener,
        implicit_tls: bool,
        mut must_exit: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut connections = FuturesUnordered::new();

        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (mut socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };

            // PROXY protocol comes first, before TLS.
            let mut peer = remote_addr;
            if self.params.proxy_protocol {
                match read_proxy_header(&mut socket).await {
                    Ok(header) => {
                        if let Some(source) = header.source {
                            peer = source;
                        }
                    }
                    Err(e) => {
                        tracing::error!(addr=%remote_addr, err=%e, "PROXY header rejected");
                        continue;
                    }
                }
            }
            tracing::info!("IMAP: accepted connection from {}", peer);

            let tls_active = implicit_tls;
            let stream: AnyStream = if implicit_tls {
                let acceptor = match self.params.tls.clone() {
                    Some(acceptor) => acceptor,
                    None => bail!("implicit TLS listener requires a TLS acceptor"),
                };
                match acceptor.accept(socket).await {
                    Ok(tls_stream) => any_stream(tls_stream),
                    Err(e) => {
                        tracing::error!(err=?e, "TLS negotiation failed");
                        continue;
                    }
                }
            } else {
                any_stream(socket)
            };

            let secure = tls_active || peer.ip().is_loopback();
            let client = ClientContext {
                addr: peer.to_string(),
                login_provider: self.login_provider.clone(),
                deliver_filter: self.deliver_filter.clone(),
                must_exit: must_exit.clone(),
                server_capabilities: self.capabilities.clone(),
                tls_acceptor: self.params.tls.clone(),
                info: SessionInfo {
                    tls_available: !tls_active && self.params.tls.is_some(),
                    secure,
                    external_allowed: false,
                },
                preauth_user: None,
                max_literal_size: self.params.max_literal_size,
                command_timeout: self.params.command_timeout,
                idle_timeout: self.params.idle_timeout,
            };
            connections.push(tokio::spawn(NetLoop::handler(client, stream)));
        }
        drop(tcp);

        self.drain(connections).await
    }

    async fn run_unix(
        self,
        unix: UnixListener,
        preauth_user: Option<String>,
        mut must_exit: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut connections = FuturesUnordered::new();

        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, _) = tokio::select! {
                a = unix.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::info!("IMAP: accepted UNIX socket connection");

            let client = ClientContext {
                addr: "unix".to_string(),
                login_provider: self.login_provider.clone(),
                deliver_filter: self.deliver_filter.clone(),
                must_exit: must_exit.clone(),
                server_capabilities: self.capabilities.clone(),
                tls_acceptor: None,
                info: SessionInfo {
                    tls_available: false,
                    // A local socket is as secure as the host.
                    secure: true,
                    external_allowed: true,
                },
                preauth_user: preauth_user.clone(),
                max_literal_size: self.params.max_literal_size,
                command_timeout: self.params.command_timeout,
                idle_timeout: self.params.idle_timeout,
            };
            connections.push(tokio::spawn(NetLoop::handler(client, any_stream(socket))));
        }
        drop(unix);

        self.drain(connections).await
    }

    async fn drain(
        &self,
        mut connections: FuturesUnordered<tokio::task::JoinHandle<()>>,
    ) -> Result<()> {
        tracing::info!("IMAP server shutting down, draining remaining connections...");
        let grace = self.params.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while connections.next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("grace period expired, aborting remaining connections");
            for conn in connections.iter() {
                conn.abort();
            }
        }
        Ok(())
    }
}

// ---- per-connection loop ----

enum LoopCtl {
    Continue,
    Exit,
}

struct NetLoop {
    ctx: ClientContext,
    framed: Option<Framed<AnyStream, ImapServerCodec>>,
    cmd_tx: Sender<Request>,
    resp_rx: UnboundedReceiver<ResponseOrIdle>,
    maybe_idle: Option<Arc<Notify>>,
    /// While a STARTTLS/COMPRESS command (this tag) is in flight, no
    /// byte may be consumed under the old transport.
    pause_tag: Option<missive_imap::core::Tag>,
}

impl NetLoop {
    async fn handler(ctx: ClientContext, stream: AnyStream) {
        let addr = ctx.addr.clone();

        let mut nl = match Self::new(ctx, stream).await {
            Ok(nl) => {
                tracing::debug!(addr=%addr, "netloop successfully initialized");
                nl
            }
            Err(e) => {
                tracing::error!(addr=%addr, err=?e, "netloop can not be initialized, closing session");
                return;
            }
        };

        match nl.core().await {
            Ok(()) => {
                tracing::debug!(addr=%addr, "closing successful netloop core");
            }
            Err(e) => {
                tracing::error!(addr=%addr, err=%e, "closing errored netloop core");
            }
        }
    }

    async fn new(ctx: ClientContext, stream: AnyStream) -> Result<Self> {
        let mut framed = Framed::new(stream, ImapServerCodec::new(ctx.max_literal_size));

        // Pre-authenticated listeners greet with PREAUTH.
        let preauth_store: Option<Arc<dyn MailStore>> = match &ctx.preauth_user {
            Some(user) => match ctx.login_provider.assume(user).await {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::error!(user=%user, err=%e, "preauth identity rejected");
                    let bye = WireResponse::Status(Status::bye(None, "Preauth failed")?);
                    framed.send(&bye).await?;
                    bail!("preauth identity rejected");
                }
            },
            None => None,
        };

        let greeting = match preauth_store.is_some() {
            true => Greeting::preauth(None, "Missive")?,
            false => Greeting::ok(
                Some(Code::Capability(ctx.server_capabilities.advertise(
                    ctx.info.tls_available,
                    ctx.info.secure,
                ))),
                "Missive",
            )?,
        };
        framed.send(&greeting).await?;

        // The session logic runs in its own task, joined by channels.
        let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(PIPELINABLE_COMMANDS);
        let (resp_tx, resp_rx) = mpsc::unbounded_channel::<ResponseOrIdle>();
        tokio::spawn(Self::session(ctx.clone(), preauth_store, cmd_rx, resp_tx));

        Ok(NetLoop {
            ctx,
            framed: Some(framed),
            cmd_tx,
            resp_rx,
            maybe_idle: None,
            pause_tag: None,
        })
    }

    async fn session(
        ctx: ClientContext,
        preauth_store: Option<Arc<dyn MailStore>>,
        mut cmd_rx: Receiver<Request>,
        resp_tx: UnboundedSender<ResponseOrIdle>,
    ) {
        let mut session = Instance::new(
            ctx.login_provider,
            ctx.server_capabilities,
            ctx.deliver_filter,
            ctx.info,
            preauth_store,
        );
        loop {
            let cmd = match cmd_rx.recv().await {
                None => break,
                Some(cmd_recv) => cmd_recv,
            };

            tracing::debug!(cmd=?cmd, sock=%ctx.addr, "command");
            let response = session.request(cmd).await;

            if resp_tx.send(response).is_err() {
                break;
            }
        }
        tracing::debug!(sock=%ctx.addr, "session task is quitting");
    }

    fn framed(&mut self) -> &mut Framed<AnyStream, ImapServerCodec> {
        self.framed.as_mut().expect("framed stream is present")
    }

    async fn core(&mut self) -> Result<()> {
        let mut deadline = Instant::now() + self.ctx.command_timeout;
        loop {
            let ctl = tokio::select! {
                event = self.framed.as_mut().expect("framed stream is present").next(),
                    if self.pause_tag.is_none() => {
                    let ctl = match event {
                        None => {
                            tracing::debug!(addr=%self.ctx.addr, "client closed the connection");
                            return Ok(());
                        }
                        Some(Err(ImapCodecError::Io(e))) => return Err(e.into()),
                        Some(Err(ImapCodecError::NotCrLf)) => {
                            self.send_bye("Line framing lost").await?;
                            return Ok(());
                        }
                        Some(Ok(event)) => self.handle_event(event).await?,
                    };
                    deadline = self.next_deadline();
                    ctl
                }
                maybe_msg = self.resp_rx.recv() => match maybe_msg {
                    Some(msg) => {
                        let ctl = self.handle_response(msg).await?;
                        deadline = self.next_deadline();
                        ctl
                    }
                    None => {
                        self.send_bye("Internal session exited").await?;
                        return Ok(());
                    }
                },
                _ = self.ctx.must_exit.changed() => {
                    self.send_bye("Server shutting down").await?;
                    return Ok(());
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(addr=%self.ctx.addr, "inactivity timeout");
                    self.send_bye("Autologout").await?;
                    return Ok(());
                }
            };

            if matches!(ctl, LoopCtl::Exit) {
                return Ok(());
            }
        }
    }

    fn next_deadline(&mut self) -> Instant {
        let timeout = match self.maybe_idle.is_some() {
            // RFC 2177 recommends re-issuing IDLE at least every 29 min.
            true => self.ctx.idle_timeout,
            false => self.ctx.command_timeout,
        };
        Instant::now() + timeout
    }

    async fn handle_event(&mut self, event: Event) -> Result<LoopCtl> {
        match event {
            Event::Command(cmd) => {
                let request = match &cmd.body {
                    CommandBody::Idle => Request::IdleStart(cmd.tag.clone()),
                    // Bytes following these belong to the upgraded
                    // transport; stop reading until it is installed (or
                    // the command is refused).
                    CommandBody::StartTls | CommandBody::Compress { .. } => {
                        self.pause_tag = Some(cmd.tag.clone());
                        Request::ImapCommand(cmd)
                    }
                    _ => Request::ImapCommand(cmd),
                };
                self.forward(request).await?;
            }
            Event::AuthenticateData(data) => {
                self.forward(Request::SaslAnswer(data)).await?;
            }
            Event::IdleDone => match self.maybe_idle.take() {
                Some(stop) => {
                    stop.notify_one();
                    self.framed().codec_mut().set_mode(ReadMode::Command);
                }
                None => {
                    self.send_bye("Received DONE while not idling").await?;
                    return Ok(LoopCtl::Exit);
                }
            },
            Event::ActionRequired(Action::SendLiteralAck) => {
                let cont = WireResponse::ContinuationRequest(ContinuationRequest::basic(
                    None, "OK",
                )?);
                self.framed().send(&cont).await?;
            }
            Event::ActionRequired(Action::RejectLiteral { tag, length, fatal }) => {
                let bad = WireResponse::Status(Status::bad(
                    Some(tag),
                    None,
                    &format!("Literal of {} bytes exceeds the budget", length),
                )?);
                self.framed().send(&bad).await?;
                if fatal {
                    // The bytes are already in flight; framing is gone.
                    self.send_bye("Non-synchronizing literal too large").await?;
                    return Ok(LoopCtl::Exit);
                }
            }
            Event::BadCommand { tag, reason } => {
                let bad = WireResponse::Status(Status::bad(tag, None, reason)?);
                self.framed().send(&bad).await?;
            }
        }
        Ok(LoopCtl::Continue)
    }

    async fn forward(&mut self, request: Request) -> Result<()> {
        match self.cmd_tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::error!(addr=%self.ctx.addr, "client is sending commands too fast");
                self.send_bye("Too fast").await?;
                bail!("client pipelined past the command budget");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.send_bye("Internal session exited").await?;
                bail!("session task exited");
            }
        }
    }

    async fn handle_response(&mut self, msg: ResponseOrIdle) -> Result<LoopCtl> {
        match msg {
            ResponseOrIdle::Response(response) => {
                if self.framed().codec_mut().mode() == ReadMode::Sasl {
                    self.framed().codec_mut().set_mode(ReadMode::Command);
                }
                // Responses come back in command order, so seeing the
                // paused tag here means the upgrade was refused.
                if self.pause_tag.as_ref() == response.completion.tag() {
                    self.pause_tag = None;
                }
                let was_bye = self.send_response(response).await?;
                if was_bye {
                    return Ok(LoopCtl::Exit);
                }
            }
            ResponseOrIdle::IdleAccept(stop) => {
                if self.maybe_idle.is_some() {
                    bail!("can't start IDLE if already idling");
                }
                let cont =
                    WireResponse::ContinuationRequest(ContinuationRequest::basic(None, "idling")?);
                self.framed().send(&cont).await?;
                self.framed().codec_mut().set_mode(ReadMode::Idle);
                self.maybe_idle = Some(stop);
                self.cmd_tx.try_send(Request::IdlePoll)?;
            }
            ResponseOrIdle::IdleReject(response) => {
                self.send_response(response).await?;
            }
            ResponseOrIdle::IdleEvent(elems) => {
                for body_elem in elems.into_iter() {
                    let wire = match body_elem {
                        Body::Data(d) => WireResponse::Data(d),
                        Body::Status(s) => WireResponse::Status(s),
                    };
                    self.framed().send(&wire).await?;
                }
                self.cmd_tx.try_send(Request::IdlePoll)?;
            }
            ResponseOrIdle::SaslChallenge(challenge) => {
                let cont =
                    WireResponse::ContinuationRequest(ContinuationRequest::base64(challenge));
                self.framed().send(&cont).await?;
                self.framed().codec_mut().set_mode(ReadMode::Sasl);
            }
            ResponseOrIdle::StartTls(response) => {
                self.send_response(response).await?;
                return self.upgrade_tls().await;
            }
            ResponseOrIdle::Compress(response) => {
                self.send_response(response).await?;
                self.upgrade_deflate();
            }
        }
        Ok(LoopCtl::Continue)
    }

    /// RFC 3501 §6.2.1: bytes pipelined behind STARTTLS can not be
    /// trusted; their presence is a protocol violation and the
    /// connection closes right after the tagged OK.
    async fn upgrade_tls(&mut self) -> Result<LoopCtl> {
        self.pause_tag = None;
        let framed = self.framed.take().expect("framed stream is present");
        if !framed.read_buffer().is_empty() {
            tracing::error!(addr=%self.ctx.addr, "pipelined bytes after STARTTLS, closing");
            return Ok(LoopCtl::Exit);
        }

        let acceptor = match self.ctx.tls_acceptor.clone() {
            Some(acceptor) => acceptor,
            None => bail!("STARTTLS accepted without a TLS acceptor"),
        };

        let parts = framed.into_parts();
        let tls_stream = acceptor
            .accept(parts.io)
            .await
            .context("STARTTLS handshake failed")?;

        self.framed = Some(Framed::new(
            any_stream(tls_stream),
            ImapServerCodec::new(self.ctx.max_literal_size),
        ));
        tracing::info!(addr=%self.ctx.addr, "TLS established");
        Ok(LoopCtl::Continue)
    }

    /// Bytes already buffered belong to the compressed stream and seed
    /// the decompressor; nothing may bypass it.
    fn upgrade_deflate(&mut self) {
        self.pause_tag = None;
        let framed = self.framed.take().expect("framed stream is present");
        let parts = framed.into_parts();
        let buffered = parts.read_buf.to_vec();
        let deflated = DeflateStream::with_buffered(parts.io, buffered);

        self.framed = Some(Framed::new(
            any_stream(deflated),
            ImapServerCodec::new(self.ctx.max_literal_size),
        ));
        tracing::info!(addr=%self.ctx.addr, "DEFLATE active");
    }

    async fn send_response(&mut self, response: Response) -> Result<bool> {
        let mut was_bye = matches!(response.completion, Status::Bye { .. });
        for body_elem in response.body.into_iter() {
            let wire = match body_elem {
                Body::Status(Status::Bye { code, text }) => {
                    was_bye = true;
                    WireResponse::Status(Status::Bye { code, text })
                }
                Body::Data(d) => WireResponse::Data(d),
                Body::Status(s) => WireResponse::Status(s),
            };
            self.framed().feed(&wire).await?;
        }

        let completion = WireResponse::Status(response.completion);
        self.framed().send(&completion).await?;

        Ok(was_bye)
    }

    async fn send_bye(&mut self, reason: &str) -> Result<()> {
        let bye = WireResponse::Status(Status::bye(None, reason)?);
        self.framed().send(&bye).await?;
        Ok(())
    }
}
