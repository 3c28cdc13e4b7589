//! Bounded request body buffering.
//!
//! # Responsibilities
//! - Reject a declared `Content-Length` over the limit before reading
//! - Collect the body while enforcing the limit
//! - Tell an oversize body apart from a broken stream
//!
//! # Design Decisions
//! - Chunks are owned `Bytes`; every exit path drops them exactly once

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use http_body_util::LengthLimitError;

use crate::error::GatewayError;

/// `Content-Length` if present and well-formed.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read the whole body, failing with `BodyTooLarge` once more than
/// `limit` bytes have arrived.
pub async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            tracing::debug!(limit, "Request body limit exceeded");
            GatewayError::BodyTooLarge {
                limit,
                received: limit.saturating_add(1),
            }
        } else {
            GatewayError::Ingestion(format!("failed to read request body: {inner}"))
        }
    })
}
