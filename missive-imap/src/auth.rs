//! AUTHENTICATE mechanism names and continuation data (RFC 3501 §6.2.2,
//! SASL-IR per RFC 4959).

use std::fmt;

use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::{map, value},
    sequence::terminated,
};

use crate::core::{atom, base64, crlf, Atom, Secret};
use crate::decode::ImapResult;

/// `auth-type = atom`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    Plain,
    External,
    Other(Atom),
}

impl From<Atom> for AuthMechanism {
    fn from(atom: Atom) -> Self {
        match atom.inner().to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            _ => Self::Other(atom),
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("PLAIN"),
            Self::External => f.write_str("EXTERNAL"),
            Self::Other(a) => write!(f, "{}", a.inner().to_ascii_uppercase()),
        }
    }
}

/// One client line of a SASL exchange: base64 payload, or `*` to abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticateData {
    Continue(Secret<Vec<u8>>),
    Cancel,
}

// ----- parsers -----

/// `auth-type = atom`
pub(crate) fn auth_type(input: &[u8]) -> ImapResult<'_, AuthMechanism> {
    map(atom, AuthMechanism::from)(input)
}

/// `authenticate-data = (base64 / "*") CRLF`
pub(crate) fn authenticate_data(input: &[u8]) -> ImapResult<'_, AuthenticateData> {
    terminated(
        alt((
            value(AuthenticateData::Cancel, tag(b"*")),
            map(base64, |data| AuthenticateData::Continue(Secret::new(data))),
        )),
        crlf,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type() {
        let (_, mech) = auth_type(b"plain ").unwrap();
        assert_eq!(mech, AuthMechanism::Plain);

        let (_, mech) = auth_type(b"EXTERNAL ").unwrap();
        assert_eq!(mech, AuthMechanism::External);

        let (_, mech) = auth_type(b"SCRAM-SHA-1 ").unwrap();
        assert!(matches!(mech, AuthMechanism::Other(_)));
    }

    #[test]
    fn test_authenticate_data() {
        // "\0alice\0pass" in base64
        let (_, data) = authenticate_data(b"AGFsaWNlAHBhc3M=\r\n").unwrap();
        match data {
            AuthenticateData::Continue(secret) => {
                assert_eq!(secret.declassify().as_slice(), b"\0alice\0pass")
            }
            other => panic!("unexpected: {:?}", other),
        }

        let (_, data) = authenticate_data(b"*\r\n").unwrap();
        assert_eq!(data, AuthenticateData::Cancel);
    }
}
