//! The per-request session context.

use std::time::{Duration, Instant};

use super::Attributes;
use crate::error::{FilterError, GatewayError};
use crate::message::{RequestMessage, ResponseMessage};

/// Container for everything one request's filter chain works on.
///
/// Exactly one context exists per request. It is created at ingestion,
/// owned by a single chain execution, and dropped when that execution ends.
#[derive(Debug)]
pub struct SessionContext<T> {
    request_id: String,
    request: RequestMessage,
    response: Option<ResponseMessage>,
    state: T,
    stop_filter_processing: bool,
    error_flag: Option<FilterError>,
    failure: Option<GatewayError>,
    recovered: Vec<GatewayError>,
    attributes: Attributes,
    started_at: Instant,
}

impl<T> SessionContext<T> {
    pub fn new(request_id: impl Into<String>, request: RequestMessage, state: T) -> Self {
        Self {
            request_id: request_id.into(),
            request,
            response: None,
            state,
            stop_filter_processing: false,
            error_flag: None,
            failure: None,
            recovered: Vec::new(),
            attributes: Attributes::new(),
            started_at: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request(&self) -> &RequestMessage {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut RequestMessage {
        &mut self.request
    }

    pub fn response(&self) -> Option<&ResponseMessage> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut ResponseMessage> {
        self.response.as_mut()
    }

    /// Install the response, replacing any previous one.
    pub fn set_response(&mut self, response: ResponseMessage) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<ResponseMessage> {
        self.response.take()
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut T {
        &mut self.state
    }

    /// Skip the remaining PRE filters and ROUTE; POST still runs.
    ///
    /// Only meaningful from the PRE phase.
    pub fn stop_filter_processing(&mut self) {
        self.stop_filter_processing = true;
    }

    pub fn is_filter_processing_stopped(&self) -> bool {
        self.stop_filter_processing
    }

    /// Raise the error flag with a cause. The engine checks the flag after
    /// each filter and diverts to the ERROR phase.
    pub fn set_error_flag(&mut self, cause: impl Into<FilterError>) {
        self.error_flag = Some(cause.into());
    }

    pub fn error_flag(&self) -> Option<&FilterError> {
        self.error_flag.as_ref()
    }

    pub(crate) fn take_error_flag(&mut self) -> Option<FilterError> {
        self.error_flag.take()
    }

    /// The failure that sent this request into the ERROR phase.
    pub fn failure(&self) -> Option<&GatewayError> {
        self.failure.as_ref()
    }

    pub(crate) fn attach_failure(&mut self, cause: GatewayError) {
        self.failure = Some(cause);
    }

    /// POST-phase failures that were recovered locally.
    pub fn recovered_failures(&self) -> &[GatewayError] {
        &self.recovered
    }

    pub(crate) fn record_recovered(&mut self, failure: GatewayError) {
        self.recovered.push(failure);
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
