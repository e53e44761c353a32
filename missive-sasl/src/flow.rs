//! The per-AUTHENTICATE state machine.

use futures::Future;

use crate::decode::auth_plain;
use crate::types::{Credentials, Mechanism};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRes {
    /// The verified identity.
    Success(String),
    Failed,
}

#[derive(Debug)]
pub enum State {
    Init(Mechanism),
    WaitingResponse(Mechanism),
    Done(AuthRes),
    Error,
}

const EMPTY_AUTHZ: &[u8] = &[];

impl State {
    pub fn new(mechanism: Mechanism) -> Self {
        Self::Init(mechanism)
    }

    /// The server-first challenge. PLAIN and EXTERNAL both use an empty
    /// one; the transition arms the state machine for the response.
    pub fn initial_challenge(&mut self) -> Option<Vec<u8>> {
        match std::mem::replace(self, State::Error) {
            Self::Init(mechanism) => {
                *self = Self::WaitingResponse(mechanism);
                Some(Vec::new())
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Feed one decoded client response. `verify` receives the extracted
    /// credentials and returns the established identity on success.
    pub async fn progress<X, F>(&mut self, data: &[u8], verify: X)
    where
        X: FnOnce(Credentials) -> F,
        F: Future<Output = Option<String>>,
    {
        let new_state = match std::mem::replace(self, State::Error) {
            Self::WaitingResponse(mechanism) => {
                let creds = match extract(mechanism, data) {
                    Some(creds) => creds,
                    None => {
                        tracing::warn!(mechanism=?mechanism, "malformed SASL response");
                        *self = Self::Done(AuthRes::Failed);
                        return;
                    }
                };
                match verify(creds).await {
                    Some(identity) => Self::Done(AuthRes::Success(identity)),
                    None => Self::Done(AuthRes::Failed),
                }
            }
            _ => {
                tracing::error!("SASL response received in an invalid state");
                Self::Error
            }
        };
        *self = new_state;
    }
}

fn extract(mechanism: Mechanism, data: &[u8]) -> Option<Credentials> {
    match mechanism {
        Mechanism::Plain => {
            let (user, pass) = match auth_plain(data) {
                Ok(([], (authzid, user, pass))) if authzid == user || authzid == EMPTY_AUTHZ => {
                    (user, pass)
                }
                Ok(_) => {
                    tracing::warn!("impersonation via authzid is not supported");
                    return None;
                }
                Err(_) => return None,
            };
            match (std::str::from_utf8(user), std::str::from_utf8(pass)) {
                (Ok(user), Ok(pass)) => Some(Credentials::Password {
                    username: user.to_string(),
                    password: pass.to_string(),
                }),
                _ => {
                    tracing::warn!("username or password is not valid UTF-8");
                    None
                }
            }
        }
        Mechanism::External => match std::str::from_utf8(data) {
            Ok(identity) => Some(Credentials::External {
                identity: identity.to_string(),
            }),
            Err(_) => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_success() {
        let mut state = State::new(Mechanism::Plain);
        assert_eq!(state.initial_challenge(), Some(Vec::new()));

        state
            .progress(b"\0alice\0hunter2", |creds| async move {
                match creds {
                    Credentials::Password { username, password }
                        if username == "alice" && password == "hunter2" =>
                    {
                        Some(username)
                    }
                    _ => None,
                }
            })
            .await;

        assert!(matches!(
            state,
            State::Done(AuthRes::Success(user)) if user == "alice"
        ));
    }

    #[tokio::test]
    async fn test_plain_rejects_impersonation() {
        let mut state = State::new(Mechanism::Plain);
        state.initial_challenge();

        state
            .progress(b"bob\0alice\0hunter2", |_| async move {
                panic!("verification must not run")
            })
            .await;

        assert!(matches!(state, State::Done(AuthRes::Failed)));
    }

    #[tokio::test]
    async fn test_external() {
        let mut state = State::new(Mechanism::External);
        state.initial_challenge();

        state
            .progress(b"alice", |creds| async move {
                match creds {
                    Credentials::External { identity } => Some(identity),
                    _ => None,
                }
            })
            .await;

        assert!(matches!(state, State::Done(AuthRes::Success(_))));
    }

    #[tokio::test]
    async fn test_response_without_challenge_is_an_error() {
        let mut state = State::new(Mechanism::Plain);
        state.progress(b"\0a\0b", |_| async move { None }).await;
        assert!(matches!(state, State::Error));
    }
}
