//! Capability advertisement.

use missive_imap::auth::AuthMechanism;
use missive_imap::command::{CapabilityEnable, Utf8Kind};
use missive_imap::core::{Atom, Vec1};
use missive_imap::response::Capability;

/// What this server implements. STARTTLS and LOGINDISABLED depend on the
/// connection, so the advertised list is computed per session.
#[derive(Debug, Clone)]
pub struct ServerCapability {
    base: Vec<Capability>,
}

impl Default for ServerCapability {
    fn default() -> Self {
        Self {
            base: vec![
                Capability::Imap4Rev1,
                Capability::LiteralPlus,
                Capability::Idle,
                Capability::UidPlus,
                Capability::Move,
                Capability::Enable,
                Capability::Id,
                Capability::Namespace,
                Capability::Unselect,
                Capability::Children,
                Capability::SaslIr,
                Capability::CompressDeflate,
                Capability::Auth(AuthMechanism::Plain),
                Capability::Auth(AuthMechanism::External),
            ],
        }
    }
}

impl ServerCapability {
    /// Extra capabilities declared by the backend.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = Atom>) -> Self {
        self.base.extend(extra.into_iter().map(Capability::Other));
        self
    }

    /// The list as seen from one connection.
    pub fn advertise(&self, tls_available: bool, secure: bool) -> Vec1<Capability> {
        let mut caps = self.base.clone();
        if tls_available {
            caps.push(Capability::StartTls);
        }
        if !secure {
            caps.push(Capability::Other(Atom::unvalidated("LOGINDISABLED")));
        }
        // Safety: the base list is never empty.
        Vec1::try_from(caps).unwrap()
    }

    pub fn supports_auth(&self, mechanism: &AuthMechanism) -> bool {
        self.base
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m == mechanism))
    }
}

/// Capabilities the client toggled with ENABLE (RFC 5161).
#[derive(Debug, Default)]
pub struct ClientCapability {
    pub utf8kind: Option<Utf8Kind>,
}

impl ClientCapability {
    pub fn try_enable(&mut self, caps: &[CapabilityEnable]) -> Vec<CapabilityEnable> {
        let mut enabled = vec![];
        for cap in caps {
            match cap {
                CapabilityEnable::Utf8(kind) if Some(kind) != self.utf8kind.as_ref() => {
                    self.utf8kind = Some(*kind);
                    enabled.push(cap.clone());
                }
                _ => (),
            }
        }
        enabled
    }
}
