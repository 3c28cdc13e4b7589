//! Phase-partitioned filter sets and the atomically swapped registry.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use super::{FilterPhase, SharedFilter};

/// Errors raised while building or reloading a filter set.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Two filters in one set share a name.
    #[error("Duplicate filter name: {0}")]
    DuplicateFilter(String),

    /// A loader could not produce the filter list.
    #[error("Filter load failed: {0}")]
    Load(String),
}

/// An immutable, order-sorted arrangement of filters per phase.
pub struct FilterSet<T> {
    phases: [Vec<SharedFilter<T>>; 4],
    generation: u64,
}

impl<T: 'static> FilterSet<T> {
    pub fn empty() -> Self {
        Self {
            phases: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            generation: 0,
        }
    }

    /// Build a set from filters in registration order.
    pub fn new(filters: Vec<SharedFilter<T>>) -> Result<Self, RegistryError> {
        Self::build(filters, &[])
    }

    /// Build a set, skipping any filter whose name is in `disabled`.
    ///
    /// Each phase is sorted by `order` ascending. The sort is stable, so
    /// filters with equal order keep their registration order.
    pub fn build(filters: Vec<SharedFilter<T>>, disabled: &[String]) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(filters.len());
        let mut set = Self::empty();

        for filter in filters {
            let name = filter.name().to_string();
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateFilter(name));
            }
            if disabled.iter().any(|d| *d == name) {
                tracing::debug!(filter = %name, "Filter disabled by configuration");
                continue;
            }
            set.phases[filter.phase().index()].push(filter);
        }

        for phase in set.phases.iter_mut() {
            phase.sort_by_key(|f| f.order());
        }

        Ok(set)
    }

    /// Filters for `phase`, in execution order.
    pub fn for_phase(&self, phase: FilterPhase) -> &[SharedFilter<T>] {
        &self.phases[phase.index()]
    }

    /// Reload generation this set was installed under (0 for the initial set).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filter names per phase in execution order.
    pub fn names(&self, phase: FilterPhase) -> Vec<String> {
        self.for_phase(phase)
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }
}

impl<T: 'static> Default for FilterSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: 'static> fmt::Debug for FilterSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("FilterSet");
        out.field("generation", &self.generation);
        for phase in FilterPhase::ALL {
            out.field(phase.as_str(), &self.names(phase));
        }
        out.finish()
    }
}

/// Holder of the current [`FilterSet`], shared read-only by every request.
///
/// Lookups are a single atomic load and never block on a concurrent reload.
/// A reload either installs a complete new set or leaves the old one intact.
pub struct FilterRegistry<T> {
    current: ArcSwap<FilterSet<T>>,
    disabled: ArcSwap<Vec<String>>,
    generation: AtomicU64,
    reload_lock: Mutex<()>,
}

impl<T: 'static> FilterRegistry<T> {
    pub fn new(filters: Vec<SharedFilter<T>>) -> Result<Self, RegistryError> {
        Ok(Self::from_set(FilterSet::new(filters)?))
    }

    pub fn empty() -> Self {
        Self::from_set(FilterSet::empty())
    }

    fn from_set(set: FilterSet<T>) -> Self {
        Self {
            current: ArcSwap::from_pointee(set),
            disabled: ArcSwap::from_pointee(Vec::new()),
            generation: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        }
    }

    /// The current set. Hold on to the returned `Arc` for the whole chain
    /// execution; later reloads do not affect it.
    pub fn snapshot(&self) -> Arc<FilterSet<T>> {
        self.current.load_full()
    }

    /// Filters for `phase` from the current snapshot.
    pub fn filters_for_phase(&self, phase: FilterPhase) -> Vec<SharedFilter<T>> {
        self.current.load().for_phase(phase).to_vec()
    }

    /// Replace the whole filter set.
    ///
    /// Returns the new generation. On error the previous set stays active.
    pub fn reload(&self, filters: Vec<SharedFilter<T>>) -> Result<u64, RegistryError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());

        let disabled = self.disabled.load();
        let mut set = FilterSet::build(filters, &disabled)?;
        let generation = self.generation.load(Ordering::Acquire) + 1;
        set.generation = generation;

        let count = set.len();
        self.current.store(Arc::new(set));
        self.generation.store(generation, Ordering::Release);

        tracing::info!(generation, filters = count, "Filter registry reloaded");
        Ok(generation)
    }

    /// Names to exclude when the next set is built.
    pub fn set_disabled(&self, names: Vec<String>) {
        self.disabled.store(Arc::new(names));
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T: 'static> fmt::Debug for FilterRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("current", &*self.current.load())
            .finish()
    }
}
