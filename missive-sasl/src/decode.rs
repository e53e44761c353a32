//! Syntax of SASL client responses.

use nom::{
    bytes::complete::{tag, take_while},
    sequence::tuple,
    IResult,
};

fn is_not_null(b: u8) -> bool {
    b != 0x00
}

/// `message = [authzid] NUL authcid NUL passwd` (RFC 4616)
pub fn auth_plain(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, (authzid, _, authcid, _, passwd)) = tuple((
        take_while(is_not_null),
        tag(&[0x00][..]),
        take_while(is_not_null),
        tag(&[0x00][..]),
        take_while(is_not_null),
    ))(input)?;

    Ok((input, (authzid, authcid, passwd)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_plain() {
        let (rem, (authzid, authcid, passwd)) = auth_plain(b"\0alice\0hunter2").unwrap();
        assert!(rem.is_empty());
        assert_eq!(authzid, b"");
        assert_eq!(authcid, b"alice");
        assert_eq!(passwd, b"hunter2");
    }

    #[test]
    fn test_auth_plain_with_authzid() {
        let (_, (authzid, authcid, _)) = auth_plain(b"admin\0alice\0pw").unwrap();
        assert_eq!(authzid, b"admin");
        assert_eq!(authcid, b"alice");
    }

    #[test]
    fn test_auth_plain_missing_separator() {
        assert!(auth_plain(b"no-separators-here").is_err());
    }
}
