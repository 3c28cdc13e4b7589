//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! adapter / engine / registry produce:
//!     → logging.rs (structured tracing events, request_id on every span)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing`, format chosen by config
//! - Metric updates go through the `metrics` facade; without an installed
//!   recorder they are no-ops, so library users and tests pay nothing

pub mod logging;
pub mod metrics;
