//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to server, reloader, signal task → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!     SIGHUP         → ReloadTrigger::Signal to the filter reloader
//! ```
//!
//! # Design Decisions
//! - Every long-running task subscribes to the same broadcast channel
//! - SIGHUP reloads filters, it never shuts anything down

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
