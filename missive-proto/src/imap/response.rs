//! Assembled command responses: untagged body plus the completion status.

use std::sync::Arc;

use anyhow::Result;
use missive_imap::command::Command;
use missive_imap::core::Tag;
use missive_imap::response::{Code, Data, Status, StatusKind};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusKind,
    tag: Option<Tag>,
    code: Option<Code>,
    text: String,
    body: Vec<Body>,
}

impl Default for ResponseBuilder {
    fn default() -> ResponseBuilder {
        ResponseBuilder {
            status: StatusKind::Bad,
            tag: None,
            code: None,
            text: "".to_string(),
            body: vec![],
        }
    }
}

impl ResponseBuilder {
    pub fn to_req(mut self, cmd: &Command) -> Self {
        self.tag = Some(cmd.tag.clone());
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn message(mut self, txt: impl Into<String>) -> Self {
        self.text = txt.into();
        self
    }

    pub fn code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    pub fn data(mut self, data: Data) -> Self {
        self.body.push(Body::Data(data));
        self
    }

    pub fn many_data(mut self, data: Vec<Data>) -> Self {
        for d in data.into_iter() {
            self = self.data(d);
        }
        self
    }

    pub fn set_body(mut self, body: Vec<Body>) -> Self {
        self.body = body;
        self
    }

    pub fn extend_body(mut self, mut body: Vec<Body>) -> Self {
        self.body.append(&mut body);
        self
    }

    pub fn ok(self) -> Result<Response> {
        self.build(StatusKind::Ok)
    }

    pub fn no(self) -> Result<Response> {
        self.build(StatusKind::No)
    }

    pub fn bad(self) -> Result<Response> {
        self.build(StatusKind::Bad)
    }

    fn build(self, status: StatusKind) -> Result<Response> {
        let text = if self.text.is_empty() {
            "completed".to_string()
        } else {
            self.text
        };
        Ok(Response {
            completion: Status::new(self.tag, status, self.code, text)?,
            body: self.body,
        })
    }
}

#[derive(Debug)]
pub struct Response {
    pub body: Vec<Body>,
    pub completion: Status,
}

impl Response {
    pub fn build() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    pub fn bye() -> Result<Response> {
        Ok(Response {
            completion: Status::bye(None, "bye")?,
            body: vec![],
        })
    }

    pub fn bye_with(text: &str) -> Result<Response> {
        Ok(Response {
            completion: Status::bye(None, text)?,
            body: vec![],
        })
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Data(Data),
    Status(Status),
}

impl Body {
    pub fn status(status: Status) -> Self {
        Self::Status(status)
    }
}

/// What the session hands back to the connection loop.
pub enum ResponseOrIdle {
    /// An ordinary command response.
    Response(Response),
    /// IDLE accepted; the notifier stops it when DONE arrives.
    IdleAccept(Arc<Notify>),
    /// Updates streamed while idling.
    IdleEvent(Vec<Body>),
    /// IDLE was not acceptable in this state.
    IdleReject(Response),
    /// Send `+ base64(challenge)` and switch the reader to SASL lines.
    SaslChallenge(Vec<u8>),
    /// Send the response, then upgrade the transport to TLS.
    StartTls(Response),
    /// Send the response, then wrap the transport in DEFLATE.
    Compress(Response),
}
