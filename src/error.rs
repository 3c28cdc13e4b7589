//! Request-level error taxonomy.
//!
//! Every failure a request can hit between ingestion and the final write is
//! one of these variants. The engine never lets one escape its public entry
//! point; the transport adapter maps whatever reaches it to a status code via
//! [`GatewayError::status_code`].

use std::time::Duration;
use thiserror::Error;

use crate::context::StateError;
use crate::filter::FilterPhase;

/// Failure reported by a filter's `apply`, or attached via the error flag.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FilterError {
    message: String,
    status: Option<u16>,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Attach a status hint that ERROR filters may use when shaping a response.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl From<&str> for FilterError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FilterError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors that can occur while processing a single request.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed native request or connection lost before the engine ran.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// The state factory could not produce per-request state.
    #[error("State factory failed: {0}")]
    StateFactory(#[from] StateError),

    /// Buffered body exceeded the configured maximum. `received` is the
    /// declared length, or a lower bound when the body was streamed.
    #[error("Request body exceeds maximum of {limit} bytes (received at least {received})")]
    BodyTooLarge { limit: usize, received: usize },

    /// A filter returned a failure, panicked, or raised the error flag.
    #[error("Filter '{filter}' failed in {phase} phase: {source}")]
    FilterFailure {
        filter: String,
        phase: FilterPhase,
        source: FilterError,
    },

    /// A filter exceeded its time budget.
    #[error("Filter '{filter}' timed out after {timeout:?} in {phase} phase")]
    FilterTimeout {
        filter: String,
        phase: FilterPhase,
        timeout: Duration,
    },

    /// No ROUTE filter's `should_filter` matched.
    #[error("No route filter claimed the request")]
    NoRouteClaimed,

    /// The chain finished without any filter populating a response.
    #[error("Filter chain completed without a response")]
    MissingResponse,

    /// ERROR filters failed or none produced a response.
    #[error("Error phase exhausted ({reason}) while handling: {cause}")]
    ErrorPhaseExhausted { cause: String, reason: String },

    /// Request-level deadline expired while buffering or filtering.
    #[error("Request deadline of {0:?} exceeded")]
    RequestDeadline(Duration),

    /// The response could not be converted to the native representation.
    #[error("Write error: {0}")]
    Write(String),
}

impl GatewayError {
    /// HTTP status code this failure maps to when surfaced to the client.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Ingestion(_) => 400,
            GatewayError::BodyTooLarge { .. } => 413,
            GatewayError::FilterTimeout { .. } | GatewayError::RequestDeadline(_) => 504,
            GatewayError::StateFactory(_)
            | GatewayError::FilterFailure { .. }
            | GatewayError::NoRouteClaimed
            | GatewayError::MissingResponse
            | GatewayError::ErrorPhaseExhausted { .. }
            | GatewayError::Write(_) => 500,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Ingestion(_) => "ingestion",
            GatewayError::StateFactory(_) => "state_factory",
            GatewayError::BodyTooLarge { .. } => "body_too_large",
            GatewayError::FilterFailure { .. } => "filter_failure",
            GatewayError::FilterTimeout { .. } => "filter_timeout",
            GatewayError::NoRouteClaimed => "no_route_claimed",
            GatewayError::MissingResponse => "missing_response",
            GatewayError::ErrorPhaseExhausted { .. } => "error_phase_exhausted",
            GatewayError::RequestDeadline(_) => "request_deadline",
            GatewayError::Write(_) => "write",
        }
    }

    /// True for failures raised before the filter chain was entered.
    pub fn is_ingestion(&self) -> bool {
        matches!(
            self,
            GatewayError::Ingestion(_)
                | GatewayError::StateFactory(_)
                | GatewayError::BodyTooLarge { .. }
        )
    }
}
