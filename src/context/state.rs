//! Per-request state factories.

use std::collections::HashMap;
use thiserror::Error;

/// Free-form key/value mapping. Used both as the default state type and
/// for inter-filter attributes on every context.
pub type Attributes = HashMap<String, serde_json::Value>;

/// The state factory could not produce a value for this request.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StateError(pub String);

/// Produces a fresh state value for each inbound request.
pub trait StateFactory<T>: Send + Sync + 'static {
    fn create(&self) -> Result<T, StateError>;
}

/// Factory for the built-in [`Attributes`] state.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStateFactory;

impl StateFactory<Attributes> for DefaultStateFactory {
    fn create(&self) -> Result<Attributes, StateError> {
        Ok(HashMap::new())
    }
}

/// Adapts a closure into a [`StateFactory`].
///
/// ```
/// use edge_gateway::context::{FnStateFactory, StateError, StateFactory};
///
/// let factory = FnStateFactory::new(|| Ok::<_, StateError>(Vec::<String>::new()));
/// assert!(factory.create().unwrap().is_empty());
/// ```
pub struct FnStateFactory<F> {
    f: F,
}

impl<F> FnStateFactory<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F> StateFactory<T> for FnStateFactory<F>
where
    F: Fn() -> Result<T, StateError> + Send + Sync + 'static,
{
    fn create(&self) -> Result<T, StateError> {
        (self.f)()
    }
}
