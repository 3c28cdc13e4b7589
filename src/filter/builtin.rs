//! Filters bundled with the gateway binary.

use crate::context::SessionContext;
use crate::error::FilterError;
use crate::filter::{BoxFuture, Filter, FilterPhase};
use crate::message::{Message, ResponseMessage};

/// ROUTE filter that answers every request with its own body.
///
/// The request's `content-type` is carried over; the method and path are
/// reported in `x-echo-method` and `x-echo-path`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoFilter;

impl EchoFilter {
    pub const NAME: &'static str = "echo";
}

impl<T: Send + 'static> Filter<T> for EchoFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> FilterPhase {
        FilterPhase::Route
    }

    fn order(&self) -> i32 {
        i32::MAX
    }

    fn apply<'a>(&'a self, ctx: &'a mut SessionContext<T>) -> BoxFuture<'a, Result<(), FilterError>> {
        Box::pin(async move {
            let request = ctx.request();
            let mut response = ResponseMessage::new(200)
                .with_header("x-echo-method", request.method())
                .with_header("x-echo-path", request.path());
            if let Some(content_type) = request.headers().get("content-type") {
                response.headers_mut().add("content-type", content_type);
            }
            if let Some(body) = request.body() {
                response.set_body(body.clone());
            }
            ctx.set_response(response);
            Ok(())
        })
    }
}
