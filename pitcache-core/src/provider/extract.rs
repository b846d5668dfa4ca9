//! Canonical key extraction for values entering a cache.

use super::AdjustKeyProvider;
use crate::key::{QueryKey, TimeKey};
use crate::query::{FilteringQueryWithFuture, HistoricalQuery};
use crate::store::HistoricalCache;
use crate::value::{CacheData, CacheValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// Derives where a value belongs.
///
/// Self-describing values (`Entry`, `Extractable`) use their own key. Bare
/// values are looked up in reverse: the entry serving the requested key, seen
/// without the look-ahead boundary, decides. With no such entry the requested
/// key is used as is.
pub struct ExtractKeyProvider<V> {
    adjust: Arc<dyn AdjustKeyProvider>,
    future_query: FilteringQueryWithFuture<V>,
}

impl<V: CacheData> ExtractKeyProvider<V> {
    pub fn new(cache: &dyn HistoricalCache<V>) -> Self {
        Self {
            adjust: cache.adjust_key_provider(),
            future_query: cache.query().with_future(),
        }
    }

    pub fn extract_key(&self, requested: QueryKey, value: &CacheValue<V>) -> QueryKey {
        let extracted = value
            .embedded_key()
            .unwrap_or_else(|| self.reverse_lookup(requested.key()));
        if extracted == requested.key() && !requested.is_raw() {
            requested
        } else {
            self.adjust.new_already_adjusted_key(extracted)
        }
    }

    fn reverse_lookup(&self, requested: TimeKey) -> TimeKey {
        self.future_query
            .get_entry(QueryKey::Adjusted(requested))
            .map_or(requested, |entry| entry.key)
    }

    pub fn is_parented_by(&self, adjust: &Arc<dyn AdjustKeyProvider>) -> bool {
        Arc::as_ptr(&self.adjust) as *const () == Arc::as_ptr(adjust) as *const ()
    }
}

/// One extract provider per owning cache, rebuilt when the cache's
/// adjust-key provider changes.
pub struct ExtractKeyProviderCache<V> {
    slot: Mutex<Option<Arc<ExtractKeyProvider<V>>>>,
}

impl<V: CacheData> ExtractKeyProviderCache<V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_create(&self, cache: &dyn HistoricalCache<V>) -> Arc<ExtractKeyProvider<V>> {
        let adjust = cache.adjust_key_provider();
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            if existing.is_parented_by(&adjust) {
                return Arc::clone(existing);
            }
        }
        let provider = Arc::new(ExtractKeyProvider::new(cache));
        *slot = Some(Arc::clone(&provider));
        provider
    }
}

impl<V: CacheData> Default for ExtractKeyProviderCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
