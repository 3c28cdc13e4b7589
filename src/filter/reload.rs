//! Background filter reloading.
//!
//! # Responsibilities
//! - Receive reload triggers (manual, config change, SIGHUP)
//! - Ask the loader for a fresh filter list
//! - Swap it into the registry, keeping the current set on failure

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use super::{FilterRegistry, RegistryError, SharedFilter};
use crate::observability::metrics;

/// Source of the complete filter list for a reload.
pub trait FilterLoader<T>: Send + Sync + 'static {
    fn load(&self) -> Result<Vec<SharedFilter<T>>, RegistryError>;
}

impl<T, F> FilterLoader<T> for F
where
    F: Fn() -> Result<Vec<SharedFilter<T>>, RegistryError> + Send + Sync + 'static,
{
    fn load(&self) -> Result<Vec<SharedFilter<T>>, RegistryError> {
        self()
    }
}

/// Why a reload was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    Manual,
    ConfigChange,
    Signal,
}

impl ReloadTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::Manual => "manual",
            ReloadTrigger::ConfigChange => "config_change",
            ReloadTrigger::Signal => "signal",
        }
    }
}

/// Load and install a new filter set once.
pub fn reload_now<T: 'static>(
    registry: &FilterRegistry<T>,
    loader: &dyn FilterLoader<T>,
    trigger: ReloadTrigger,
) -> Result<u64, RegistryError> {
    let result = loader.load().and_then(|filters| registry.reload(filters));
    match &result {
        Ok(generation) => {
            tracing::info!(trigger = trigger.as_str(), generation, "Filters reloaded");
            metrics::record_filter_reload(true);
        }
        Err(e) => {
            tracing::error!(
                trigger = trigger.as_str(),
                error = %e,
                "Filter reload failed. Keeping current filter set."
            );
            metrics::record_filter_reload(false);
        }
    }
    result
}

/// Run until shutdown or until every trigger sender is dropped.
pub async fn run_reloader<T: 'static>(
    registry: Arc<FilterRegistry<T>>,
    loader: Arc<dyn FilterLoader<T>>,
    mut triggers: mpsc::UnboundedReceiver<ReloadTrigger>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Filter reloader starting");

    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                match trigger {
                    Some(trigger) => {
                        let _ = reload_now(&registry, loader.as_ref(), trigger);
                    }
                    None => break,
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Filter reloader received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
