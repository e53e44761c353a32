use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use missive_backend::login::{hash_password, StaticLoginProvider, UserEntry};
use missive_backend::{ArcLoginProvider, DeliverFilter, IdentityFilter};
use missive_proto::imap::{self, ListenerKind, ServerParams};

use crate::config::{Config, ListenerConfig, UserManagement};

pub struct Server {
    listeners: Vec<imap::Server>,
}

pub async fn new(config: Config) -> Result<Server> {
    let login_provider: ArcLoginProvider = Arc::new(build_login_provider(&config)?);
    let deliver_filter: Arc<dyn DeliverFilter> = Arc::new(IdentityFilter);

    let mut listeners = Vec::new();
    for listener in config.listeners.iter() {
        let mut params = match listener {
            ListenerConfig::Tcp {
                bind_addr,
                tls,
                implicit_tls,
                proxy_protocol,
            } => {
                let acceptor = tls
                    .as_ref()
                    .map(|tls| imap::load_tls_acceptor(&tls.certs, &tls.key))
                    .transpose()
                    .context("loading TLS material")?;
                let mut params = ServerParams::new(ListenerKind::Tcp {
                    bind_addr: *bind_addr,
                    implicit_tls: *implicit_tls,
                });
                params.tls = acceptor;
                params.proxy_protocol = *proxy_protocol;
                params
            }
            ListenerConfig::Unix { path, preauth_user } => {
                ServerParams::new(ListenerKind::Unix {
                    path: path.clone(),
                    preauth_user: preauth_user.clone(),
                })
            }
        };

        let limits = &config.limits;
        if let Some(max) = limits.max_literal_size {
            params.max_literal_size = max;
        }
        if let Some(secs) = limits.command_timeout_secs {
            params.command_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = limits.idle_timeout_secs {
            params.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = limits.shutdown_grace_secs {
            params.shutdown_grace = Duration::from_secs(secs);
        }

        listeners.push(imap::new(
            params,
            login_provider.clone(),
            deliver_filter.clone(),
        ));
    }

    Ok(Server { listeners })
}

fn build_login_provider(config: &Config) -> Result<StaticLoginProvider> {
    let users = match &config.users {
        UserManagement::Static(source) => {
            let list: crate::config::UserList = crate::config::read_config(source.user_list.clone())
                .context("reading the user list")?;
            list.users
                .into_iter()
                .map(|(name, entry)| {
                    (
                        name,
                        UserEntry {
                            password_hash: entry.password,
                        },
                    )
                })
                .collect()
        }
        UserManagement::Dev => {
            tracing::warn!("dev mode: built-in account alice/hunter2");
            let mut users = HashMap::new();
            users.insert(
                "alice".to_string(),
                UserEntry {
                    password_hash: hash_password("hunter2")?,
                },
            );
            users
        }
    };

    Ok(StaticLoginProvider::new(users))
}

impl Server {
    pub async fn run(self) -> Result<()> {
        let (exit_tx, exit_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            };
            let _ = exit_tx.send(true);
        });

        futures::future::try_join_all(
            self.listeners
                .into_iter()
                .map(|listener| listener.run(exit_rx.clone())),
        )
        .await?;

        Ok(())
    }
}
