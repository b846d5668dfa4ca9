//! Contracts between recursively-defined series and the engines that serve them.

use crate::continuous::ContinuousRecursiveQuery;
use crate::unstable::UnstableRecursiveQuery;
use pitcache_core::{CacheData, CacheValue, HistoryResult, KeyNavigator, TimeKey};
use std::sync::Arc;

/// A series where each value is computed from the one before it.
pub trait RecursiveFunction<V>: Send + Sync {
    /// Seed value at `key`, used where no previous value exists or the
    /// lookback window starts.
    fn initial_value(&self, key: TimeKey) -> Option<V>;

    /// Value at `key` given the value at the previous key.
    fn next_value(&self, key: TimeKey, previous: &V) -> HistoryResult<Option<V>>;

    /// Shape the value takes when written to the owning cache.
    fn to_cache_value(&self, key: TimeKey, value: V) -> CacheValue<V> {
        CacheValue::entry(key, value)
    }
}

/// Closure-backed [`RecursiveFunction`].
pub struct FnRecursion<I, N> {
    initial: I,
    next: N,
}

impl<I, N> FnRecursion<I, N> {
    pub fn new(initial: I, next: N) -> Self {
        Self { initial, next }
    }
}

impl<V, I, N> RecursiveFunction<V> for FnRecursion<I, N>
where
    I: Fn(TimeKey) -> Option<V> + Send + Sync,
    N: Fn(TimeKey, &V) -> HistoryResult<Option<V>> + Send + Sync,
{
    fn initial_value(&self, key: TimeKey) -> Option<V> {
        (self.initial)(key)
    }

    fn next_value(&self, key: TimeKey, previous: &V) -> HistoryResult<Option<V>> {
        (self.next)(key, previous)
    }
}

/// What an engine knows about the value preceding a key.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviousValue<V> {
    Available(V),
    /// No history at all.
    Absent,
    /// Stateless engines: recompute from `initial_value` at the first key
    /// and fold forward through the rest, ascending, ending at the previous key.
    RecomputeWindow(Vec<TimeKey>),
}

impl<V> PreviousValue<V> {
    pub fn available(value: Option<V>) -> Self {
        value.map_or(Self::Absent, Self::Available)
    }
}

/// The owning cache as seen by an engine.
pub trait RecursionParent<V> {
    /// Value already stored at exactly `key`.
    fn cached_value(&self, key: TimeKey) -> Option<V>;

    /// Value at `key`, computing and storing it if needed.
    fn load_value(&self, key: TimeKey) -> HistoryResult<Option<V>>;

    fn initial_value(&self, key: TimeKey) -> Option<V>;

    /// Navigation over the keys the series is defined on, within the boundary.
    fn navigator(&self) -> &dyn KeyNavigator;
}

pub trait RecursiveQuery<V>: Send + Sync {
    fn previous_value(
        &self,
        parent: &dyn RecursionParent<V>,
        key: TimeKey,
        previous_key: TimeKey,
    ) -> HistoryResult<PreviousValue<V>>;

    fn clear(&self);

    fn recursion_count(&self) -> usize;
}

/// The strategy an owning cache was built with.
pub enum RecursionEngine<V> {
    Continuous(Arc<ContinuousRecursiveQuery<V>>),
    Unstable(UnstableRecursiveQuery),
}

impl<V: CacheData> RecursionEngine<V> {
    pub fn as_query(&self) -> &dyn RecursiveQuery<V> {
        match self {
            RecursionEngine::Continuous(query) => query.as_ref(),
            RecursionEngine::Unstable(query) => query,
        }
    }

    pub fn as_continuous(&self) -> Option<&Arc<ContinuousRecursiveQuery<V>>> {
        match self {
            RecursionEngine::Continuous(query) => Some(query),
            RecursionEngine::Unstable(_) => None,
        }
    }
}
