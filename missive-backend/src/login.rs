//! Login providers: credential verification in front of a store.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryAccount;
use crate::{LoginProvider, MailStore};

/// A fixed user list (TOML-sourced in the daemon) over the in-memory
/// backend. Accounts materialize on first successful login.
pub struct StaticLoginProvider {
    users: HashMap<String, UserEntry>,
    accounts: RwLock<HashMap<String, Arc<MemoryAccount>>>,
}

#[derive(Debug, Clone)]
pub struct UserEntry {
    /// Argon2 PHC string.
    pub password_hash: String,
}

impl StaticLoginProvider {
    pub fn new(users: HashMap<String, UserEntry>) -> Self {
        tracing::info!(count = users.len(), "user list loaded");
        Self {
            users,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    async fn account(&self, username: &str) -> Arc<MemoryAccount> {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(username.to_string())
            .or_insert_with(|| MemoryAccount::new(username))
            .clone()
    }
}

#[async_trait]
impl LoginProvider for StaticLoginProvider {
    async fn login(&self, username: &str, password: &str) -> StoreResult<Arc<dyn MailStore>> {
        tracing::debug!(user=%username, "login");
        let entry = self
            .users
            .get(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;

        match verify_password(password, &entry.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(user=%username, "wrong password");
                return Err(StoreError::NotFound(username.to_string()));
            }
            Err(e) => {
                tracing::error!(user=%username, err=%e, "unusable password hash");
                // A broken hash stays broken until the user list changes.
                return Err(StoreError::Transient {
                    reason: "password verification".to_string(),
                    reproducible: true,
                });
            }
        }

        tracing::info!(user=%username, "authenticated");
        let store: Arc<dyn MailStore> = self.account(username).await;
        Ok(store)
    }

    async fn assume(&self, username: &str) -> StoreResult<Arc<dyn MailStore>> {
        if !self.users.contains_key(username) {
            return Err(StoreError::NotFound(username.to_string()));
        }
        tracing::info!(user=%username, "identity assumed");
        let store: Arc<dyn MailStore> = self.account(username).await;
        Ok(store)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Argon2 error: {}", e))?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("Invalid hashed password: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with(username: &str, password: &str) -> StaticLoginProvider {
        let mut users = HashMap::new();
        users.insert(
            username.to_string(),
            UserEntry {
                password_hash: hash_password(password).unwrap(),
            },
        );
        StaticLoginProvider::new(users)
    }

    #[tokio::test]
    async fn test_login_roundtrip() {
        let provider = provider_with("alice", "hunter2");

        assert!(provider.login("alice", "hunter2").await.is_ok());
        assert!(provider.login("alice", "wrong").await.is_err());
        assert!(provider.login("bob", "hunter2").await.is_err());
    }

    #[tokio::test]
    async fn test_assume_known_user_only() {
        let provider = provider_with("alice", "hunter2");

        assert!(provider.assume("alice").await.is_ok());
        assert!(provider.assume("mallory").await.is_err());
    }

    #[tokio::test]
    async fn test_account_is_stable_across_logins() {
        let provider = provider_with("alice", "hunter2");

        let store = provider.login("alice", "hunter2").await.unwrap();
        store.create_mailbox("Archive").await.unwrap();

        let store2 = provider.login("alice", "hunter2").await.unwrap();
        assert!(store2.has_mailbox("Archive").await.unwrap());
    }
}
