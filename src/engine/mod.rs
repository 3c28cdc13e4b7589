//! Filter-chain execution engine.
//!
//! # Data Flow
//! ```text
//! SessionContext<T> + registry snapshot + ChainPolicy
//!     → PRE   (in order; stop flag jumps to POST, failure jumps to ERROR)
//!     → ROUTE (first matching filter claims the phase; none → ERROR)
//!     → POST  (in order; failures recovered unless policy escalates)
//!     → Completed(response) | ERROR
//! ERROR
//!     → error filters in order
//!     → Completed(error response) | Failed(500, empty body)
//! ```
//!
//! # Design Decisions
//! - Filters run strictly one after another; each gets `&mut` context
//! - One registry snapshot and one policy per run, fixed until it ends
//! - Timeouts drop the filter future; its effects past the last `.await` are lost
//! - The engine never returns an error, only an outcome carrying a response

pub mod chain;
pub mod policy;

pub use chain::{ChainOutcome, FilterChain};
pub use policy::{ChainPolicy, PostFailurePolicy};
