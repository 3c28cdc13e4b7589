//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, concurrency limit, tracing)
//!     → adapter.rs (request id, Content-Length check, header/query copy)
//!     → body.rs (bounded buffering)
//!     → FilterChain::run
//!     → adapter.rs (ResponseMessage → native response)
//!     → Send to client
//! ```

pub mod adapter;
pub mod body;
pub mod server;

pub use adapter::{ConnectionAddrs, TransportAdapter, X_REQUEST_ID};
pub use server::GatewayServer;
