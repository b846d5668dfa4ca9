//! "The last N keys visible as of key K" as a recursively maintained series.

use crate::cache::RecursiveHistoricalCache;
use crate::continuous::ContinuousStats;
use crate::engine::RecursiveFunction;
use pitcache_core::{
    AdjustKeyProvider, CacheValue, HistoryConfig, HistoryError, HistoryResult, KeyExtractable,
    KeyNavigator, QueryKey, RecursionStrategy, ShiftDelegate, TimeKey,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::error;

/// Sliding window of up to `full_recursion_count` keys, ascending, ending at
/// the anchor `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullRecursionKeysResult {
    key: TimeKey,
    keys: VecDeque<TimeKey>,
    full_recursion_count: usize,
}

impl FullRecursionKeysResult {
    /// Builds the window from scratch. `None` when `key` has no floor.
    pub fn rebuild(
        navigator: &dyn KeyNavigator,
        key: TimeKey,
        full_recursion_count: usize,
    ) -> Option<Self> {
        let keys: VecDeque<TimeKey> = navigator
            .previous_keys(QueryKey::Indexed(key), full_recursion_count)
            .into();
        let anchor = *keys.back()?;
        Some(Self {
            key: anchor,
            keys,
            full_recursion_count,
        })
    }

    /// Advances the window to the floor of `new_key`.
    ///
    /// Moving to the same canonical key returns an unchanged copy. Moving
    /// backwards is an [`HistoryError::IllegalState`]. A jump of a full window
    /// or more rebuilds; anything shorter appends the gap and drops from the
    /// front.
    pub fn push_to_next(&self, navigator: &dyn KeyNavigator, new_key: TimeKey) -> HistoryResult<Self> {
        let Some(canonical) = navigator.floor_key(QueryKey::Indexed(new_key)) else {
            error!(anchor = %self.key, key = %new_key, "no key at or before the push target");
            return Err(HistoryError::illegal_state(format!(
                "cannot push {new_key}: no key at or before it"
            )));
        };
        if canonical == self.key {
            return Ok(self.clone());
        }
        if canonical < self.key {
            error!(anchor = %self.key, key = %canonical, "push target before anchor");
            return Err(HistoryError::illegal_state(format!(
                "push target {canonical} is not after anchor {}",
                self.key
            )));
        }

        let gap = navigator.keys_between(self.key.plus_millis(1), canonical);
        if gap.len() >= self.full_recursion_count || gap.last() != Some(&canonical) {
            return Self::rebuild(navigator, canonical, self.full_recursion_count).ok_or_else(|| {
                HistoryError::illegal_state(format!("rebuild at {canonical} found no keys"))
            });
        }

        let mut keys = self.keys.clone();
        keys.extend(gap);
        while keys.len() > self.full_recursion_count {
            keys.pop_front();
        }
        Ok(Self {
            key: canonical,
            keys,
            full_recursion_count: self.full_recursion_count,
        })
    }

    pub fn key(&self) -> TimeKey {
        self.key
    }

    pub fn keys(&self) -> &VecDeque<TimeKey> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn full_recursion_count(&self) -> usize {
        self.full_recursion_count
    }

    pub fn first_key(&self) -> Option<TimeKey> {
        self.keys.front().copied()
    }
}

impl KeyExtractable for FullRecursionKeysResult {
    fn extract_key(&self) -> TimeKey {
        self.key
    }
}

struct KeysWindow {
    navigator: Arc<dyn KeyNavigator>,
    full_recursion_count: usize,
}

impl RecursiveFunction<FullRecursionKeysResult> for KeysWindow {
    fn initial_value(&self, key: TimeKey) -> Option<FullRecursionKeysResult> {
        FullRecursionKeysResult::rebuild(self.navigator.as_ref(), key, self.full_recursion_count)
    }

    fn next_value(
        &self,
        key: TimeKey,
        previous: &FullRecursionKeysResult,
    ) -> HistoryResult<Option<FullRecursionKeysResult>> {
        previous.push_to_next(self.navigator.as_ref(), key).map(Some)
    }

    fn to_cache_value(
        &self,
        _key: TimeKey,
        value: FullRecursionKeysResult,
    ) -> CacheValue<FullRecursionKeysResult> {
        CacheValue::extractable(value)
    }
}

/// Cache of [`FullRecursionKeysResult`]s over a key series, always served by
/// the continuous engine.
pub struct FullRecursionKeysCache {
    inner: RecursiveHistoricalCache<FullRecursionKeysResult>,
    full_recursion_count: usize,
}

impl FullRecursionKeysCache {
    pub fn new(
        name: impl Into<String>,
        keys: ShiftDelegate,
        adjust: Arc<dyn AdjustKeyProvider>,
        full_recursion_count: usize,
        config: &HistoryConfig,
    ) -> HistoryResult<Self> {
        if full_recursion_count == 0 {
            return Err(HistoryError::illegal_argument(
                "full_recursion_count must be > 0",
            ));
        }
        let function = Arc::new(KeysWindow {
            navigator: keys.clone().into_raw(),
            full_recursion_count,
        });
        let mut config = config.clone();
        config.recursion.strategy = RecursionStrategy::Continuous;
        let inner = RecursiveHistoricalCache::new(name, keys, adjust, function, &config)?;
        Ok(Self {
            inner,
            full_recursion_count,
        })
    }

    /// The window ending at the floor of `key` within the boundary.
    pub fn get(&self, key: impl Into<QueryKey>) -> HistoryResult<Option<FullRecursionKeysResult>> {
        self.inner.get(key)
    }

    pub fn full_recursion_count(&self) -> usize {
        self.full_recursion_count
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn stats(&self) -> Option<ContinuousStats> {
        self.inner.stats()
    }

    pub fn inner(&self) -> &RecursiveHistoricalCache<FullRecursionKeysResult> {
        &self.inner
    }
}
