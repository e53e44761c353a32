use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,

    pub users: UserManagement,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ListenerConfig {
    Tcp {
        bind_addr: SocketAddr,
        #[serde(default)]
        tls: Option<TlsConfig>,
        /// Listen TLS-wrapped from the first byte (the 993 flavor).
        #[serde(default)]
        implicit_tls: bool,
        #[serde(default)]
        proxy_protocol: bool,
    },
    Unix {
        path: PathBuf,
        /// Greet with PREAUTH as this user.
        #[serde(default)]
        preauth_user: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    pub certs: PathBuf,
    pub key: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "user_driver", rename_all = "lowercase")]
pub enum UserManagement {
    /// A TOML user list on disk, one `[users.<name>]` table per user.
    Static(LoginStaticUser),
    /// The built-in development account (`alice` / `hunter2`).
    Dev,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginStaticUser {
    pub user_list: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LimitsConfig {
    /// Per-command literal budget, bytes.
    pub max_literal_size: Option<usize>,
    pub command_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserList {
    pub users: HashMap<String, UserEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserEntry {
    /// Argon2 PHC hash, `missive password-hash` emits one.
    pub password: String,
}

pub fn read_config<T: serde::de::DeserializeOwned>(config_file: PathBuf) -> Result<T> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

impl Config {
    /// `--dev`: a loopback listener and the built-in account. NOT
    /// INTENDED FOR PRODUCTION.
    pub fn dev() -> Self {
        Self {
            listeners: vec![ListenerConfig::Tcp {
                bind_addr: "[::1]:1143".parse().unwrap(),
                tls: None,
                implicit_tls: false,
                proxy_protocol: false,
            }],
            users: UserManagement::Dev,
            limits: LimitsConfig::default(),
        }
    }
}
