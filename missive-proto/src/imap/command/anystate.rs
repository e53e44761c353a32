//! Command handlers valid whatever the connection state.

use anyhow::Result;
use missive_imap::core::{IString, NString, Tag, Vec1};
use missive_imap::response::{Capability, Data, Status};

use crate::imap::flow;
use crate::imap::response::Response;

pub(crate) fn capability(
    tag: Tag,
    caps: Vec1<Capability>,
) -> Result<(Response, flow::Transition)> {
    let res = Response::build()
        .tag(tag)
        .message("Server capabilities")
        .data(Data::Capability(caps))
        .ok()?;

    Ok((res, flow::Transition::None))
}

pub(crate) fn noop_nothing(tag: Tag) -> Result<(Response, flow::Transition)> {
    Ok((
        Response::build().tag(tag).message("Noop completed.").ok()?,
        flow::Transition::None,
    ))
}

/// `* BYE` first, then the tagged completion, then the connection
/// closes.
pub(crate) fn logout(tag: Tag) -> Result<(Response, flow::Transition)> {
    let bye = Status::bye(None, "Logging out")?;
    Ok((
        Response::build()
            .tag(tag)
            .message("LOGOUT completed")
            .set_body(vec![crate::imap::response::Body::Status(bye)])
            .ok()?,
        flow::Transition::Logout,
    ))
}

/// RFC 2971. Client parameters are logged, the server names itself.
pub(crate) fn id(
    tag: Tag,
    parameters: &Option<Vec<(IString, NString)>>,
) -> Result<(Response, flow::Transition)> {
    if let Some(parameters) = parameters {
        for (key, value) in parameters {
            tracing::debug!(
                key = %String::from_utf8_lossy(key.as_bytes()),
                value = %value
                    .0
                    .as_ref()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .unwrap_or_else(|| "NIL".into()),
                "client ID"
            );
        }
    }

    let server_id = vec![
        (
            IString::try_from("name")?,
            NString::try_from("Missive")?,
        ),
        (
            IString::try_from("version")?,
            NString::try_from(env!("CARGO_PKG_VERSION"))?,
        ),
    ];

    Ok((
        Response::build()
            .tag(tag)
            .message("ID completed")
            .data(Data::Id {
                parameters: Some(server_id),
            })
            .ok()?,
        flow::Transition::None,
    ))
}

pub(crate) fn wrong_state(tag: Tag) -> Result<(Response, flow::Transition)> {
    Ok((
        Response::build()
            .tag(tag)
            .message("Command not allowed in this state")
            .bad()?,
        flow::Transition::None,
    ))
}
