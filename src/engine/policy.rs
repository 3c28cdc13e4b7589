//! Per-run execution policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens when a POST filter fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostFailurePolicy {
    /// Skip the filter, record the cause on the context, keep going.
    #[default]
    Recover,
    /// Treat it like a PRE/ROUTE failure and enter the ERROR phase.
    Escalate,
}

/// Policy applied to one chain execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainPolicy {
    /// Time budget for each filter, unless the filter overrides it.
    pub filter_timeout: Option<Duration>,
    pub post_failure: PostFailurePolicy,
}

impl ChainPolicy {
    /// Effective timeout for a filter with the given override.
    pub fn timeout_for(&self, filter_override: Option<Duration>) -> Option<Duration> {
        filter_override.or(self.filter_timeout)
    }
}
