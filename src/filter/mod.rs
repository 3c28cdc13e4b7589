//! Filters and the hot-swappable filter registry.
//!
//! # Data Flow
//! ```text
//! FilterLoader::load() → Vec<SharedFilter<T>>
//!     → FilterSet::build (validate names, drop disabled, stable sort per phase)
//!     → FilterRegistry::reload (atomic ArcSwap of the whole set)
//!     → engine takes one snapshot per request and keeps it to the end
//! ```
//!
//! # Design Decisions
//! - A FilterSet is immutable once built; reload replaces it wholesale
//! - Readers never lock: `snapshot()` is a single atomic load
//! - Equal `order` values keep registration order (stable sort)

pub mod builtin;
pub mod contract;
pub mod registry;
pub mod reload;

pub use builtin::EchoFilter;
pub use contract::{BoxFuture, Filter, FilterPhase, SharedFilter};
pub use registry::{FilterRegistry, FilterSet, RegistryError};
pub use reload::{reload_now, run_reloader, FilterLoader, ReloadTrigger};
