//! Owning cache for recursively-defined series.

use crate::continuous::{ContinuousRecursiveQuery, ContinuousStats};
use crate::engine::{PreviousValue, RecursionEngine, RecursionParent, RecursiveFunction};
use crate::unstable::UnstableRecursiveQuery;
use pitcache_core::{
    AdjustKeyProvider, CacheData, ClearListener, Clearable, Entry, FilteringQuery, HistoricalCache,
    HistoryConfig, HistoryResult, KeyNavigator, MemoryHistoricalCache, QueryKey, RecursionStrategy,
    ShiftDelegate, ShiftKeyProvider, TimeKey,
};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Values are computed on demand from the previous value and stored in an
/// in-memory cache keyed like the series it follows (e.g. price bars).
///
/// The previous value comes from the configured engine: continuous engines
/// extend a shared window, unstable ones name a fixed window to refold.
pub struct RecursiveHistoricalCache<V> {
    store: Arc<MemoryHistoricalCache<V>>,
    shift: ShiftKeyProvider<V>,
    function: Arc<dyn RecursiveFunction<V>>,
    engine: RecursionEngine<V>,
}

impl<V: CacheData> RecursiveHistoricalCache<V> {
    /// `keys` is the navigation source the series is defined on; `adjust` the
    /// look-ahead boundary the cache answers to.
    pub fn new(
        name: impl Into<String>,
        keys: ShiftDelegate,
        adjust: Arc<dyn AdjustKeyProvider>,
        function: Arc<dyn RecursiveFunction<V>>,
        config: &HistoryConfig,
    ) -> HistoryResult<Self> {
        config.validate()?;
        let store = MemoryHistoricalCache::with_config(name, Arc::clone(&adjust), &config.cache);
        let owner: Arc<dyn HistoricalCache<V>> = store.clone();
        let shift = ShiftKeyProvider::new(&owner, keys);

        let recursion = &config.recursion;
        let engine = match recursion.strategy {
            RecursionStrategy::Continuous => {
                let query: Arc<ContinuousRecursiveQuery<V>> = Arc::new(ContinuousRecursiveQuery::new(
                    recursion.recursion_count,
                    &config.diagnostics,
                )?);
                let weak: Weak<ContinuousRecursiveQuery<V>> = Arc::downgrade(&query);
                let listener: Weak<dyn ClearListener> = weak;
                store.register_on_clear_listener(listener);
                store.increase_maximum_size(
                    query.window_capacity().saturating_mul(2),
                    "continuous recursion window",
                );
                RecursionEngine::Continuous(query)
            }
            RecursionStrategy::Unstable => RecursionEngine::Unstable(UnstableRecursiveQuery::new(
                recursion.recursion_count,
                recursion.unstable_recursion_count,
            )?),
        };

        // values computed before the boundary resolves may have seen the future
        let dependent: Arc<dyn Clearable> = store.clone();
        adjust.register_dependent_cache(&dependent);

        Ok(Self {
            store,
            shift,
            function,
            engine,
        })
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn get(&self, key: impl Into<QueryKey>) -> HistoryResult<Option<V>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Value at the floor of `key` within the boundary.
    pub fn get_entry(&self, key: impl Into<QueryKey>) -> HistoryResult<Option<Entry<V>>> {
        let Some(target) = self.shift.floor_key(key.into()) else {
            return Ok(None);
        };
        Ok(self
            .load_value(target)?
            .map(|value| Entry::new(target, value)))
    }

    /// Value at the key before the floor of `key`.
    pub fn previous_value(&self, key: impl Into<QueryKey>) -> HistoryResult<Option<V>> {
        let Some(target) = self.shift.floor_key(key.into()) else {
            return Ok(None);
        };
        let Some(previous) = self.shift.calculate_previous_key(QueryKey::Indexed(target)) else {
            return Ok(None);
        };
        match self
            .engine
            .as_query()
            .previous_value(self, target, previous.key())?
        {
            PreviousValue::Available(value) => Ok(Some(value)),
            PreviousValue::Absent => Ok(None),
            PreviousValue::RecomputeWindow(window) => self.fold_window(&window),
        }
    }

    /// Boundary-enforcing query over values computed so far.
    pub fn query(&self) -> FilteringQuery<V> {
        self.store.query()
    }

    pub fn clear(&self) {
        self.store.clear();
        self.shift.clear();
    }

    pub fn stats(&self) -> Option<ContinuousStats> {
        self.engine.as_continuous().map(|engine| engine.stats())
    }

    pub fn store(&self) -> &Arc<MemoryHistoricalCache<V>> {
        &self.store
    }

    pub fn engine(&self) -> &RecursionEngine<V> {
        &self.engine
    }

    pub fn shift_key_provider(&self) -> &ShiftKeyProvider<V> {
        &self.shift
    }

    /// Folds `initial_value` at the first key through the rest of `window`.
    fn fold_window(&self, window: &[TimeKey]) -> HistoryResult<Option<V>> {
        let Some((&first, rest)) = window.split_first() else {
            return Ok(None);
        };
        let Some(mut value) = self.function.initial_value(first) else {
            return Ok(None);
        };
        for &key in rest {
            match self.function.next_value(key, &value)? {
                Some(next) => value = next,
                None => return Ok(None),
            }
        }
        Ok(Some(value))
    }
}

impl<V: CacheData> RecursionParent<V> for RecursiveHistoricalCache<V> {
    fn cached_value(&self, key: TimeKey) -> Option<V> {
        self.store.get_exact(key)
    }

    fn load_value(&self, key: TimeKey) -> HistoryResult<Option<V>> {
        if let Some(value) = self.store.get_exact(key) {
            return Ok(Some(value));
        }
        let previous = self.shift.calculate_previous_key(QueryKey::Indexed(key));
        let value = match previous {
            None => self.function.initial_value(key),
            Some(previous_key) => {
                match self
                    .engine
                    .as_query()
                    .previous_value(self, key, previous_key.key())?
                {
                    PreviousValue::Available(prev) => self.function.next_value(key, &prev)?,
                    PreviousValue::Absent => None,
                    PreviousValue::RecomputeWindow(window) => match self.fold_window(&window)? {
                        Some(prev) => self.function.next_value(key, &prev)?,
                        None => None,
                    },
                }
            }
        };

        if let Some(value) = &value {
            let cache_value = self.function.to_cache_value(key, value.clone());
            let stored = self
                .shift
                .put(previous, QueryKey::Indexed(key), cache_value, None, None);
            if stored.is_none() {
                debug!(cache = %self.store.name(), key = %key, "owner dropped, value not stored");
            }
        }
        Ok(value)
    }

    fn initial_value(&self, key: TimeKey) -> Option<V> {
        self.function.initial_value(key)
    }

    fn navigator(&self) -> &dyn KeyNavigator {
        &self.shift
    }
}
