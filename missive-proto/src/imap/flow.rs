//! The five-state connection automaton (RFC 3501 §3).

use std::fmt;
use std::sync::Arc;

use missive_backend::MailStore;
use missive_imap::core::Tag;
use thiserror::Error;
use tokio::sync::Notify;

use crate::imap::mailbox_view::MailboxView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPerm {
    ReadOnly,
    ReadWrite,
}

pub enum State {
    NotAuthenticated,
    Authenticated(Arc<dyn MailStore>),
    Selected(Arc<dyn MailStore>, MailboxView, MailboxPerm),
    /// IDLE is its own state: commands are refused until DONE, which the
    /// connection loop signals through the notifier.
    Idle(
        Arc<dyn MailStore>,
        MailboxView,
        MailboxPerm,
        Tag,
        Arc<Notify>,
    ),
    Logout,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => f.write_str("NotAuthenticated"),
            Self::Authenticated(..) => f.write_str("Authenticated"),
            Self::Selected(..) => f.write_str("Selected"),
            Self::Idle(..) => f.write_str("Idle"),
            Self::Logout => f.write_str("Logout"),
        }
    }
}

pub enum Transition {
    None,
    Authenticate(Arc<dyn MailStore>),
    Select(MailboxView, MailboxPerm),
    Unselect,
    Idle(Tag, Notify),
    UnIdle,
    Logout,
    /// Transport upgrades; resolved by the connection loop, never by
    /// [`State::apply`].
    StartTls,
    Compress,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Authenticate(..) => f.write_str("Authenticate"),
            Self::Select(..) => f.write_str("Select"),
            Self::Unselect => f.write_str("Unselect"),
            Self::Idle(..) => f.write_str("Idle"),
            Self::UnIdle => f.write_str("UnIdle"),
            Self::Logout => f.write_str("Logout"),
            Self::StartTls => f.write_str("StartTls"),
            Self::Compress => f.write_str("Compress"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Forbidden state transition")]
    ForbiddenTransition,
}

impl State {
    pub fn apply(&mut self, tr: Transition) -> Result<(), Error> {
        let old = std::mem::replace(self, State::Logout);
        let new = match (old, tr) {
            (state, Transition::None) => state,
            (State::NotAuthenticated, Transition::Authenticate(store)) => {
                State::Authenticated(store)
            }
            // SELECT from Selected releases the previous view, without
            // an implicit expunge; dropping it is that release.
            (State::Authenticated(store), Transition::Select(view, perm))
            | (State::Selected(store, _, _), Transition::Select(view, perm)) => {
                State::Selected(store, view, perm)
            }
            (State::Selected(store, _, _), Transition::Unselect) => State::Authenticated(store),
            (State::Selected(store, view, perm), Transition::Idle(tag, notify)) => {
                State::Idle(store, view, perm, tag, Arc::new(notify))
            }
            (State::Idle(store, view, perm, _, _), Transition::UnIdle) => {
                State::Selected(store, view, perm)
            }
            (_, Transition::Logout) => State::Logout,
            (old, tr) => {
                tracing::error!(state=?old, transition=?tr, "forbidden transition");
                *self = old;
                return Err(Error::ForbiddenTransition);
            }
        };
        *self = new;
        Ok(())
    }

    /// The IDLE stop notifier, when idling.
    pub fn notify(&self) -> Option<Arc<Notify>> {
        match self {
            Self::Idle(.., stop) => Some(stop.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut state = State::NotAuthenticated;
        assert!(state.apply(Transition::Logout).is_ok());
        assert!(matches!(state, State::Logout));
    }

    #[test]
    fn test_forbidden_transition_keeps_state() {
        let mut state = State::NotAuthenticated;
        assert!(state.apply(Transition::Unselect).is_err());
        assert!(matches!(state, State::NotAuthenticated));
    }
}
