//! Per-request session context and generic state.
//!
//! # Data Flow
//! ```text
//! http::adapter builds RequestMessage
//!     → StateFactory::create() (exactly once per request)
//!     → SessionContext<T> { request, state, flags, attributes }
//!     → owned by one chain execution, dropped when the chain finishes
//! ```
//!
//! # Design Decisions
//! - State `T` is created once and never replaced; filters get `&mut T`
//! - `stop_filter_processing` is the one control signal the engine reads
//!   besides the error flag; everything else is data for other filters

pub mod session;
pub mod state;

pub use session::SessionContext;
pub use state::{Attributes, DefaultStateFactory, FnStateFactory, StateError, StateFactory};
