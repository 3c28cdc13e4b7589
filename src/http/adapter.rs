//! Transport adapter between axum/hyper and the filter chain.
//!
//! # Responsibilities
//! - Convert the native request into a RequestMessage
//! - Buffer the body under the configured limit before the chain runs
//! - Run the chain under the request deadline
//! - Convert the resulting ResponseMessage back into a native response
//!
//! # Design Decisions
//! - Ingestion failures never reach the engine; they map straight to a status
//! - Dropping the in-flight future is the cancellation mechanism: a client
//!   disconnect or deadline drops buffered chunks and the running filter
//! - The native response is produced exactly once per request

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::connect_info::{ConnectInfo, Connected};
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::serve::IncomingStream;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::config::RuntimeSettings;
use crate::engine::{ChainOutcome, FilterChain};
use crate::error::GatewayError;
use crate::http::body::{buffer_body, declared_length};
use crate::message::request::parse_query;
use crate::message::{Headers, Message, RequestMessage, ResponseMessage};
use crate::observability::metrics;

/// Header used to propagate the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Socket addresses of the connection a request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionAddrs {
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
}

impl ConnectionAddrs {
    /// IP of the local address, else the remote one, else empty.
    pub fn client_ip(&self) -> String {
        self.local
            .or(self.remote)
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            local: stream.io().local_addr().ok(),
            remote: Some(*stream.remote_addr()),
        }
    }
}

/// Bridges native requests into the filter chain and back.
pub struct TransportAdapter<T> {
    chain: Arc<FilterChain<T>>,
}

impl<T: Send + 'static> TransportAdapter<T> {
    pub fn new(chain: Arc<FilterChain<T>>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<FilterChain<T>> {
        &self.chain
    }

    /// Process one native request end to end. Always yields a response.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let started = Instant::now();
        let settings = self.chain.settings().load_full();
        let request_id = request_id_for(request.headers());
        let method = request.method().to_string();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %request.uri().path()
        );

        async move {
            let work = self.process(request, &request_id, &settings);
            let result = match settings.request_deadline {
                Some(deadline) => tokio::time::timeout(deadline, work)
                    .await
                    .unwrap_or_else(|_| Err(GatewayError::RequestDeadline(deadline))),
                None => work.await,
            };

            let mut message = match result {
                Ok(outcome) => outcome.into_response(),
                Err(err) => {
                    tracing::warn!(error = %err, kind = err.kind(), "Request rejected before completion");
                    if err.is_ingestion() {
                        metrics::record_ingestion_rejection(err.kind());
                    }
                    ResponseMessage::new(err.status_code())
                }
            };
            if !message.headers().contains(X_REQUEST_ID) {
                message.headers_mut().add(X_REQUEST_ID, request_id.as_str());
            }

            let response = match self.write(message) {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to write response");
                    let mut response = Response::new(Body::empty());
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    response
                }
            };

            metrics::record_request(&method, response.status().as_u16(), started);
            tracing::debug!(status = response.status().as_u16(), elapsed = ?started.elapsed(), "Request finished");
            response
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: Request<Body>,
        request_id: &str,
        settings: &RuntimeSettings,
    ) -> Result<ChainOutcome, GatewayError> {
        let message = self.create(request, settings.max_body_bytes).await?;
        let ctx = self.chain.create_context(request_id, message)?;
        Ok(self.chain.run_with_policy(ctx, &settings.chain).await)
    }

    /// Build a RequestMessage from the native request, buffering the body.
    pub async fn create(
        &self,
        request: Request<Body>,
        max_body_bytes: usize,
    ) -> Result<RequestMessage, GatewayError> {
        let (parts, body) = request.into_parts();

        if let Some(declared) = declared_length(&parts.headers) {
            if declared > max_body_bytes as u64 {
                return Err(GatewayError::BodyTooLarge {
                    limit: max_body_bytes,
                    received: usize::try_from(declared).unwrap_or(usize::MAX),
                });
            }
        }

        let client_ip = parts
            .extensions
            .get::<ConnectInfo<ConnectionAddrs>>()
            .map(|ConnectInfo(addrs)| addrs.client_ip())
            .unwrap_or_default();
        let uri = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

        let mut message = RequestMessage::new(parts.method.as_str(), uri)
            .with_protocol(format!("{:?}", parts.version))
            .with_query_params(parts.uri.query().map(parse_query).unwrap_or_default())
            .with_headers(copy_headers(&parts.headers))
            .with_client_ip(client_ip)
            .with_scheme(parts.uri.scheme_str().unwrap_or("http"));

        let body = buffer_body(body, max_body_bytes).await?;
        if !body.is_empty() {
            message.set_body(body);
        }
        Ok(message)
    }

    /// Convert the final ResponseMessage into the native response.
    ///
    /// Every header entry is copied, so multi-valued keys stay multi-valued.
    pub fn write(&self, message: ResponseMessage) -> Result<Response<Body>, GatewayError> {
        let (code, headers, body) = message.into_parts();
        let status = StatusCode::from_u16(code)
            .map_err(|e| GatewayError::Write(format!("invalid status {code}: {e}")))?;

        let mut response = Response::new(body.map(Body::from).unwrap_or_else(Body::empty));
        *response.status_mut() = status;

        let native = response.headers_mut();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::Write(format!("invalid header name '{name}': {e}")))?;
            let header_value = encode_header_value(&value)
                .map_err(|e| GatewayError::Write(format!("invalid value for header '{name}': {e}")))?;
            native.append(header_name, header_value);
        }

        Ok(response)
    }
}

fn request_id_for(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn copy_headers(native: &HeaderMap) -> Headers {
    let mut headers = Headers::with_capacity(native.len());
    for (name, value) in native {
        headers.add(name.as_str(), decode_header_value(value));
    }
    headers
}

/// Header values may carry obs-text (0x80-0xFF); those bytes decode as Latin-1.
fn decode_header_value(value: &HeaderValue) -> String {
    match value.to_str() {
        Ok(ascii) => ascii.to_string(),
        Err(_) => value.as_bytes().iter().map(|&b| char::from(b)).collect(),
    }
}

fn encode_header_value(value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    if value.is_ascii() {
        return HeaderValue::from_str(value);
    }
    let latin1: Option<Vec<u8>> = value.chars().map(|c| u8::try_from(c).ok()).collect();
    match latin1 {
        Some(bytes) => HeaderValue::from_bytes(&bytes),
        None => HeaderValue::from_str(value),
    }
}
