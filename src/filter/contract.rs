//! The filter contract implemented by filter authors.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::SessionContext;
use crate::error::FilterError;

/// A boxed future, as returned by [`Filter::apply`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A filter shared between registry snapshots and in-flight chains.
pub type SharedFilter<T> = Arc<dyn Filter<T>>;

/// Pipeline phase a filter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPhase {
    Pre,
    Route,
    Post,
    Error,
}

impl FilterPhase {
    pub const ALL: [FilterPhase; 4] = [
        FilterPhase::Pre,
        FilterPhase::Route,
        FilterPhase::Post,
        FilterPhase::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterPhase::Pre => "pre",
            FilterPhase::Route => "route",
            FilterPhase::Post => "post",
            FilterPhase::Error => "error",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            FilterPhase::Pre => 0,
            FilterPhase::Route => 1,
            FilterPhase::Post => 2,
            FilterPhase::Error => 3,
        }
    }
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of request/response processing.
///
/// # Invariants
///
/// - `apply` is never called concurrently with another filter of the same request
/// - `apply` may be dropped before completion (timeout, deadline, disconnect);
///   it must not leave shared state half-written across an `.await`
///
/// # Example
///
/// ```
/// use edge_gateway::context::{Attributes, SessionContext};
/// use edge_gateway::error::FilterError;
/// use edge_gateway::filter::{BoxFuture, Filter, FilterPhase};
///
/// struct TagRequest;
///
/// impl Filter<Attributes> for TagRequest {
///     fn name(&self) -> &str { "tag-request" }
///     fn phase(&self) -> FilterPhase { FilterPhase::Pre }
///     fn order(&self) -> i32 { 10 }
///
///     fn apply<'a>(
///         &'a self,
///         ctx: &'a mut SessionContext<Attributes>,
///     ) -> BoxFuture<'a, Result<(), FilterError>> {
///         Box::pin(async move {
///             ctx.state_mut().insert("tagged".into(), true.into());
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Filter<T>: Send + Sync + 'static {
    /// Unique name within a filter set, used in logs, metrics, and disable lists.
    fn name(&self) -> &str;

    fn phase(&self) -> FilterPhase;

    /// Position within the phase, ascending. Ties keep registration order.
    fn order(&self) -> i32;

    /// Whether this filter applies to the current request.
    fn should_filter(&self, _ctx: &SessionContext<T>) -> bool {
        true
    }

    /// Per-filter override of the chain-wide filter timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn apply<'a>(&'a self, ctx: &'a mut SessionContext<T>) -> BoxFuture<'a, Result<(), FilterError>>;
}
