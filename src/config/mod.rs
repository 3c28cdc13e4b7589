//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → live.rs RuntimeSettings (what the adapter/engine read per request)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps LiveSettings and triggers a filter reload
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Settings are passed into constructors, never read from a global

pub mod live;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live::{LiveSettings, RuntimeSettings};
pub use loader::{load_config, ConfigError};
pub use schema::{FilterConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, RequestConfig};
pub use watcher::ConfigWatcher;
