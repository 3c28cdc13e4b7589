//! Edge gateway filter-chain runtime.
//!
//! Inbound HTTP requests are normalized into a [`message::RequestMessage`],
//! run through ordered PRE, ROUTE, and POST filters (ERROR on failure), and
//! the resulting [`message::ResponseMessage`] is written back exactly once.

// Core subsystems
pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod message;

// Transport
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use context::SessionContext;
pub use engine::FilterChain;
pub use error::{FilterError, GatewayError};
pub use filter::{Filter, FilterPhase, FilterRegistry};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
