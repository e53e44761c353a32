//! The single place where backend errors turn into IMAP responses.

use anyhow::Result;
use missive_backend::StoreError;
use missive_imap::core::Tag;
use missive_imap::response::Code;

use crate::imap::response::Response;

/// Whether the failing operation addressed a mailbox that `[TRYCREATE]`
/// applies to (APPEND/COPY/MOVE destinations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Destination,
    Other,
}

pub fn store_error_response(err: &StoreError, tag: Tag, target: Target) -> Result<Response> {
    let builder = Response::build().tag(tag);
    match err {
        StoreError::NotFound(what) => match target {
            Target::Destination => builder
                .message("Mailbox does not exist")
                .code(Code::TryCreate)
                .no(),
            Target::Other => builder.message(format!("{} not found", what)).no(),
        },
        StoreError::AlreadyExists(_) => builder.message("Mailbox already exists").no(),
        StoreError::ReadOnly => builder
            .message("Mailbox is read-only")
            .code(Code::ReadOnly)
            .no(),
        StoreError::OverQuota => builder
            .message("Storage quota exceeded")
            .code(Code::OverQuota)
            .no(),
        StoreError::BadName(name) => builder.message(format!("Invalid name: {}", name)).no(),
        StoreError::Closed => builder
            .message("Backend closed the mailbox")
            .code(Code::ServerBug)
            .no(),
        // Reproducible means retrying cannot help.
        StoreError::Transient {
            reproducible: true, ..
        } => builder
            .message("Reproducible backend failure")
            .code(Code::ServerBug)
            .no(),
        StoreError::Transient {
            reproducible: false,
            ..
        } => builder.message("Try again").no(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use missive_imap::response::Status;

    fn tag() -> Tag {
        Tag::unvalidated("a1")
    }

    #[test]
    fn test_not_found_destination_is_trycreate() {
        let resp =
            store_error_response(&StoreError::NotFound("Sub".into()), tag(), Target::Destination)
                .unwrap();
        match resp.completion {
            Status::No {
                code: Some(Code::TryCreate),
                ..
            } => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_not_found_elsewhere_is_plain_no() {
        let resp =
            store_error_response(&StoreError::NotFound("Sub".into()), tag(), Target::Other)
                .unwrap();
        match resp.completion {
            Status::No { code: None, .. } => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reproducible_transient_is_serverbug() {
        let resp = store_error_response(
            &StoreError::Transient {
                reason: "index corrupt".into(),
                reproducible: true,
            },
            tag(),
            Target::Other,
        )
        .unwrap();
        match resp.completion {
            Status::No {
                code: Some(Code::ServerBug),
                ..
            } => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_passing_transient_suggests_retry() {
        let resp = store_error_response(
            &StoreError::Transient {
                reason: "backend overloaded".into(),
                reproducible: false,
            },
            tag(),
            Target::Other,
        )
        .unwrap();
        match resp.completion {
            Status::No {
                code: None,
                ref text,
                ..
            } => assert_eq!(text.inner(), "Try again"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
