//! Query decorators enforcing the look-ahead boundary.
//!
//! `FilteringQuery` intercepts raw lookups through the owning cache's
//! highest-allowed-value hook and clamps every result to the request bounds,
//! whatever the delegate returned. `FilteringQueryWithFuture` keeps the bound
//! checks but skips interception and clamping to the boundary.

use super::HistoricalQuery;
use crate::key::{QueryKey, TimeKey};
use crate::provider::AdjustKeyProvider;
use crate::store::HighestAllowedValue;
use crate::value::{CacheData, Entry};
use std::sync::Arc;

/// Predicate applied to every entry a filtering query returns.
pub type ElementFilter<V> = Arc<dyn Fn(&Entry<V>) -> bool + Send + Sync>;

struct FilterCore<V> {
    delegate: Arc<dyn HistoricalQuery<V>>,
    element_filter: Option<ElementFilter<V>>,
}

impl<V> Clone for FilterCore<V> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
            element_filter: self.element_filter.clone(),
        }
    }
}

// Single results on the wrong side of the pivot collapse to the pivot (keys)
// or to None (entries). Sequences drop offending elements.
impl<V: CacheData> FilterCore<V> {
    fn accepts(&self, entry: &Entry<V>) -> bool {
        self.element_filter.as_ref().map_or(true, |f| f(entry))
    }

    fn accept(&self, entry: Option<Entry<V>>) -> Option<Entry<V>> {
        entry.filter(|e| self.accepts(e))
    }

    fn key(&self, pivot: QueryKey) -> Option<TimeKey> {
        let p = pivot.key();
        self.delegate.get_key(pivot).map(|k| k.min(p))
    }

    fn entry(&self, pivot: QueryKey) -> Option<Entry<V>> {
        let p = pivot.key();
        self.accept(self.delegate.get_entry(pivot).filter(|e| e.key <= p))
    }

    fn previous_key(&self, pivot: QueryKey, shift: usize) -> Option<TimeKey> {
        let p = pivot.key();
        self.delegate.get_previous_key(pivot, shift).map(|k| k.min(p))
    }

    fn next_key(&self, pivot: QueryKey, shift: usize) -> Option<TimeKey> {
        if shift == 0 {
            return self.key(pivot);
        }
        let p = pivot.key();
        self.delegate.get_next_key(pivot, shift).map(|k| k.max(p))
    }

    fn previous_entry(&self, pivot: QueryKey, shift: usize) -> Option<Entry<V>> {
        let p = pivot.key();
        self.accept(
            self.delegate
                .get_previous_entry(pivot, shift)
                .filter(|e| e.key <= p),
        )
    }

    fn next_entry(&self, pivot: QueryKey, shift: usize) -> Option<Entry<V>> {
        if shift == 0 {
            return self.entry(pivot);
        }
        let p = pivot.key();
        self.accept(
            self.delegate
                .get_next_entry(pivot, shift)
                .filter(|e| e.key >= p),
        )
    }

    fn previous_keys(&self, pivot: QueryKey, count: usize) -> Vec<TimeKey> {
        let p = pivot.key();
        let mut keys = self.delegate.get_previous_keys(pivot, count);
        keys.retain(|k| *k <= p);
        keys
    }

    fn previous_entries(&self, pivot: QueryKey, count: usize) -> Vec<Entry<V>> {
        let p = pivot.key();
        let mut entries = self.delegate.get_previous_entries(pivot, count);
        entries.retain(|e| e.key <= p && self.accepts(e));
        entries
    }

    fn next_keys(&self, pivot: QueryKey, count: usize, limit: TimeKey) -> Vec<TimeKey> {
        let p = pivot.key();
        let mut keys = self.delegate.get_next_keys(pivot, count);
        keys.retain(|k| *k >= p && *k <= limit);
        keys
    }

    fn next_entries(&self, pivot: QueryKey, count: usize, limit: TimeKey) -> Vec<Entry<V>> {
        let p = pivot.key();
        let mut entries = self.delegate.get_next_entries(pivot, count);
        entries.retain(|e| e.key >= p && e.key <= limit && self.accepts(e));
        entries
    }

    fn keys(&self, from: TimeKey, to: TimeKey, cached: bool) -> Vec<TimeKey> {
        if from > to {
            return Vec::new();
        }
        let mut keys = if cached {
            self.delegate.get_keys_cached(from, to)
        } else {
            self.delegate.get_keys(from, to)
        };
        keys.retain(|k| *k >= from && *k <= to);
        keys
    }

    fn entries(&self, from: TimeKey, to: TimeKey, cached: bool) -> Vec<Entry<V>> {
        if from > to {
            return Vec::new();
        }
        let mut entries = if cached {
            self.delegate.get_entries_cached(from, to)
        } else {
            self.delegate.get_entries(from, to)
        };
        entries.retain(|e| e.key >= from && e.key <= to && self.accepts(e));
        entries
    }

    fn future(&self) -> Self {
        Self {
            delegate: Arc::from(self.delegate.future()),
            element_filter: self.element_filter.clone(),
        }
    }
}

/// Boundary-enforcing query handed out by `HistoricalCache::query`.
pub struct FilteringQuery<V> {
    core: FilterCore<V>,
    adjust: Arc<dyn AdjustKeyProvider>,
    interceptor: Option<Arc<dyn HighestAllowedValue<V>>>,
}

impl<V> Clone for FilteringQuery<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            adjust: Arc::clone(&self.adjust),
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<V: CacheData> FilteringQuery<V> {
    pub fn new(delegate: Arc<dyn HistoricalQuery<V>>, adjust: Arc<dyn AdjustKeyProvider>) -> Self {
        Self {
            core: FilterCore {
                delegate,
                element_filter: None,
            },
            adjust,
            interceptor: None,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn HighestAllowedValue<V>>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_element_filter(mut self, filter: ElementFilter<V>) -> Self {
        self.core.element_filter = Some(filter);
        self
    }

    pub fn with_future(&self) -> FilteringQueryWithFuture<V> {
        FilteringQueryWithFuture {
            core: self.core.future(),
        }
    }

    pub fn adjust_key_provider(&self) -> &Arc<dyn AdjustKeyProvider> {
        &self.adjust
    }

    fn intercept(&self, key: QueryKey) -> Option<Entry<V>> {
        if !key.is_raw() {
            return None;
        }
        let interceptor = self.interceptor.as_ref()?;
        self.core
            .accept(interceptor.highest_allowed_entry(key.key()))
    }

    fn pivot(&self, key: QueryKey) -> QueryKey {
        self.adjust.adjust_query_key(key)
    }

    fn limit(&self, to: TimeKey) -> TimeKey {
        self.adjust.adjust_key(to)
    }

    fn visible(&self, key: TimeKey) -> bool {
        self.adjust.adjust_key(key) == key
    }
}

impl<V: CacheData> HistoricalQuery<V> for FilteringQuery<V> {
    fn get_key(&self, key: QueryKey) -> Option<TimeKey> {
        if let Some(entry) = self.intercept(key) {
            return Some(entry.key);
        }
        self.core.key(self.pivot(key))
    }

    fn get_entry(&self, key: QueryKey) -> Option<Entry<V>> {
        if let Some(entry) = self.intercept(key) {
            return Some(entry);
        }
        self.core.entry(self.pivot(key))
    }

    fn get_previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        self.core.previous_key(self.pivot(key), shift)
    }

    fn get_next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        if shift == 0 {
            return self.get_key(key);
        }
        let pivot = self.pivot(key);
        self.core
            .next_key(pivot, shift)
            .filter(|k| self.visible(*k))
    }

    fn get_previous_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        self.core.previous_entry(self.pivot(key), shift)
    }

    fn get_next_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        if shift == 0 {
            return self.get_entry(key);
        }
        let pivot = self.pivot(key);
        self.core
            .next_entry(pivot, shift)
            .filter(|e| self.visible(e.key))
    }

    fn get_previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        self.core.previous_keys(self.pivot(key), count)
    }

    fn get_previous_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        self.core.previous_entries(self.pivot(key), count)
    }

    fn get_next_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        let pivot = self.pivot(key);
        self.core.next_keys(pivot, count, self.limit(TimeKey::MAX))
    }

    fn get_next_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        let pivot = self.pivot(key);
        self.core.next_entries(pivot, count, self.limit(TimeKey::MAX))
    }

    fn get_keys(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.core.keys(from, self.limit(to), false)
    }

    fn get_entries(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        self.core.entries(from, self.limit(to), false)
    }

    fn get_keys_cached(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.core.keys(from, self.limit(to), true)
    }

    fn get_entries_cached(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        self.core.entries(from, self.limit(to), true)
    }

    fn future(&self) -> Box<dyn HistoricalQuery<V>> {
        Box::new(self.with_future())
    }
}

/// Filtering query that may see past the look-ahead boundary.
pub struct FilteringQueryWithFuture<V> {
    core: FilterCore<V>,
}

impl<V> Clone for FilteringQueryWithFuture<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<V: CacheData> FilteringQueryWithFuture<V> {
    pub fn new(delegate: Arc<dyn HistoricalQuery<V>>) -> Self {
        Self {
            core: FilterCore {
                delegate,
                element_filter: None,
            },
        }
    }

    pub fn with_element_filter(mut self, filter: ElementFilter<V>) -> Self {
        self.core.element_filter = Some(filter);
        self
    }

    /// Already a future query: returns itself.
    pub fn with_future(self) -> Self {
        self
    }
}

impl<V: CacheData> HistoricalQuery<V> for FilteringQueryWithFuture<V> {
    fn get_key(&self, key: QueryKey) -> Option<TimeKey> {
        self.core.key(key)
    }

    fn get_entry(&self, key: QueryKey) -> Option<Entry<V>> {
        self.core.entry(key)
    }

    fn get_previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        self.core.previous_key(key, shift)
    }

    fn get_next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        self.core.next_key(key, shift)
    }

    fn get_previous_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        self.core.previous_entry(key, shift)
    }

    fn get_next_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        self.core.next_entry(key, shift)
    }

    fn get_previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        self.core.previous_keys(key, count)
    }

    fn get_previous_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        self.core.previous_entries(key, count)
    }

    fn get_next_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        self.core.next_keys(key, count, TimeKey::MAX)
    }

    fn get_next_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        self.core.next_entries(key, count, TimeKey::MAX)
    }

    fn get_keys(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.core.keys(from, to, false)
    }

    fn get_entries(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        self.core.entries(from, to, false)
    }

    fn get_keys_cached(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.core.keys(from, to, true)
    }

    fn get_entries_cached(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        self.core.entries(from, to, true)
    }

    fn future(&self) -> Box<dyn HistoricalQuery<V>> {
        Box::new(self.clone())
    }
}
