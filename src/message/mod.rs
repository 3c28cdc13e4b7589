//! Canonical request/response message model.
//!
//! # Data Flow
//! ```text
//! native request (axum/hyper)
//!     → http::adapter builds RequestMessage (headers, query, buffered body)
//!     → filters inspect / mutate via the Message trait
//!     → a ROUTE or ERROR filter populates ResponseMessage
//!     → http::adapter consumes ResponseMessage when writing
//! ```
//!
//! # Design Decisions
//! - Headers and query parameters share one ordered multi-map type
//! - Duplicate keys are distinct entries, never merged
//! - Writing takes the response by value, so nothing can mutate it afterwards

pub mod multimap;
pub mod request;
pub mod response;

pub use multimap::{Headers, MultiMap, QueryParams};
pub use request::RequestMessage;
pub use response::ResponseMessage;

use bytes::Bytes;

/// Behaviour shared by request and response messages: headers plus an
/// optional body that filters may replace wholesale.
pub trait Message {
    fn headers(&self) -> &Headers;

    fn headers_mut(&mut self) -> &mut Headers;

    fn body_slot(&self) -> &Option<Bytes>;

    fn body_slot_mut(&mut self) -> &mut Option<Bytes>;

    fn body(&self) -> Option<&Bytes> {
        self.body_slot().as_ref()
    }

    fn has_body(&self) -> bool {
        self.body_slot().as_ref().is_some_and(|b| !b.is_empty())
    }

    fn body_len(&self) -> usize {
        self.body_slot().as_ref().map_or(0, Bytes::len)
    }

    fn set_body(&mut self, body: impl Into<Bytes>)
    where
        Self: Sized,
    {
        *self.body_slot_mut() = Some(body.into());
    }

    fn take_body(&mut self) -> Option<Bytes> {
        self.body_slot_mut().take()
    }
}
