//! Reloadable runtime settings.
//!
//! The transport adapter and the engine load one [`RuntimeSettings`]
//! snapshot per request; a config reload swaps in a new one without
//! affecting requests already in flight.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};

use super::schema::{GatewayConfig, DEFAULT_MAX_BODY_BYTES};
use crate::engine::ChainPolicy;

/// Values read on the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub max_body_bytes: usize,
    pub request_deadline: Option<Duration>,
    pub chain: ChainPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_deadline: Some(Duration::from_secs(30)),
            chain: ChainPolicy::default(),
        }
    }
}

impl From<&GatewayConfig> for RuntimeSettings {
    fn from(config: &GatewayConfig) -> Self {
        let non_zero = |value: u64, unit: fn(u64) -> Duration| (value > 0).then(|| unit(value));
        Self {
            max_body_bytes: config.request.max_body_bytes,
            request_deadline: non_zero(config.request.deadline_secs, Duration::from_secs),
            chain: ChainPolicy {
                filter_timeout: non_zero(config.filters.timeout_ms, Duration::from_millis),
                post_failure: config.filters.post_failure_policy,
            },
        }
    }
}

/// Atomically swappable [`RuntimeSettings`].
#[derive(Debug)]
pub struct LiveSettings {
    inner: ArcSwap<RuntimeSettings>,
}

impl LiveSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: ArcSwap::from_pointee(settings),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(RuntimeSettings::from(config))
    }

    /// Cheap read of the current settings.
    pub fn load(&self) -> Guard<Arc<RuntimeSettings>> {
        self.inner.load()
    }

    pub fn load_full(&self) -> Arc<RuntimeSettings> {
        self.inner.load_full()
    }

    pub fn store(&self, settings: RuntimeSettings) {
        self.inner.store(Arc::new(settings));
    }

    /// Replace the settings with those derived from `config`.
    pub fn apply(&self, config: &GatewayConfig) {
        let settings = RuntimeSettings::from(config);
        tracing::info!(
            max_body_bytes = settings.max_body_bytes,
            request_deadline = ?settings.request_deadline,
            filter_timeout = ?settings.chain.filter_timeout,
            post_failure = ?settings.chain.post_failure,
            "Runtime settings updated"
        );
        self.store(settings);
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::new(RuntimeSettings::default())
    }
}
