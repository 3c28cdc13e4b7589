//! Outbound response message.

use bytes::Bytes;

use super::{Headers, Message};

/// Canonical response, populated by a ROUTE, PRE, or ERROR filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    status: u16,
    headers: Headers,
    body: Option<Bytes>,
}

impl ResponseMessage {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: None,
        }
    }

    /// The minimal response the engine synthesizes when nothing else could:
    /// status 500 with no headers and no body.
    pub fn fallback() -> Self {
        Self::new(500)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Split into status, headers, and body for writing.
    pub fn into_parts(self) -> (u16, Headers, Option<Bytes>) {
        (self.status, self.headers, self.body)
    }
}

impl Message for ResponseMessage {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn body_slot(&self) -> &Option<Bytes> {
        &self.body
    }

    fn body_slot_mut(&mut self) -> &mut Option<Bytes> {
        &mut self.body
    }
}
