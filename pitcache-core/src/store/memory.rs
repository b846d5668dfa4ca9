//! `BTreeMap`-backed historical cache.

use super::{ClearListener, Clearable, HighestAllowedValue, HistoricalCache, KeyEviction};
use crate::config::CacheConfig;
use crate::key::{QueryKey, TimeKey};
use crate::provider::{AdjustKeyProvider, ExtractKeyProvider, ExtractKeyProviderCache, KeyNavigator};
use crate::query::{FilteringQuery, HistoricalQuery};
use crate::value::{CacheData, CacheValue, Entry};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

type Map<V> = BTreeMap<TimeKey, V>;

// ── Navigation over the ordered map ──

fn floor_at<V>(map: &Map<V>, key: TimeKey) -> Option<(&TimeKey, &V)> {
    map.range(..=key).next_back()
}

fn previous_at<V>(map: &Map<V>, key: TimeKey, shift: usize) -> Option<(&TimeKey, &V)> {
    map.range(..=key).rev().nth(shift)
}

fn next_at<V>(map: &Map<V>, key: TimeKey, shift: usize) -> Option<(&TimeKey, &V)> {
    match floor_at(map, key) {
        Some((floor, _)) => map.range(*floor..).nth(shift),
        None => shift.checked_sub(1).and_then(|n| map.iter().nth(n)),
    }
}

fn previous_run<V>(map: &Map<V>, key: TimeKey, count: usize) -> Vec<(&TimeKey, &V)> {
    let mut run: Vec<_> = map.range(..=key).rev().take(count).collect();
    run.reverse();
    run
}

fn next_run<V>(map: &Map<V>, key: TimeKey, count: usize, limit: TimeKey) -> Vec<(&TimeKey, &V)> {
    map.range(key..)
        .take(count)
        .take_while(|(k, _)| **k <= limit)
        .collect()
}

fn between<V>(map: &Map<V>, from: TimeKey, to: TimeKey) -> Vec<(&TimeKey, &V)> {
    if from > to {
        return Vec::new();
    }
    map.range(from..=to).collect()
}

fn to_entry<V: Clone>((key, value): (&TimeKey, &V)) -> Entry<V> {
    Entry::new(*key, value.clone())
}

fn to_key<V>((key, _): (&TimeKey, &V)) -> TimeKey {
    *key
}

struct StoreInner<V> {
    entries: RwLock<Map<V>>,
    /// 0 means unbounded.
    maximum_size: AtomicUsize,
}

impl<V: CacheData> StoreInner<V> {
    fn insert(&self, key: TimeKey, value: V) {
        let max = self.maximum_size.load(Ordering::Acquire);
        let mut map = self.entries.write();
        map.insert(key, value);
        if max > 0 {
            while map.len() > max {
                map.pop_first();
            }
        }
    }
}

/// Direct map query. With `adjust` set, raw keys are clamped and nothing past
/// the boundary is returned; without it this is the future view.
struct StoreQuery<V> {
    inner: Arc<StoreInner<V>>,
    adjust: Option<Arc<dyn AdjustKeyProvider>>,
}

// Boundary lookups may evict from this store, so they run before the map lock.
impl<V: CacheData> StoreQuery<V> {
    fn anchor(&self, key: QueryKey) -> TimeKey {
        match &self.adjust {
            Some(adjust) => adjust.adjust_query_key(key).key(),
            None => key.key(),
        }
    }

    fn limit(&self) -> TimeKey {
        self.adjust
            .as_ref()
            .map_or(TimeKey::MAX, |adjust| adjust.adjust_key(TimeKey::MAX))
    }
}

impl<V: CacheData> HistoricalQuery<V> for StoreQuery<V> {
    fn get_key(&self, key: QueryKey) -> Option<TimeKey> {
        let anchor = self.anchor(key);
        floor_at(&self.inner.entries.read(), anchor).map(to_key)
    }

    fn get_entry(&self, key: QueryKey) -> Option<Entry<V>> {
        let anchor = self.anchor(key);
        floor_at(&self.inner.entries.read(), anchor).map(to_entry)
    }

    fn get_previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        let anchor = self.anchor(key);
        previous_at(&self.inner.entries.read(), anchor, shift).map(to_key)
    }

    fn get_next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        let (anchor, limit) = (self.anchor(key), self.limit());
        next_at(&self.inner.entries.read(), anchor, shift)
            .map(to_key)
            .filter(|k| *k <= limit)
    }

    fn get_previous_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        let anchor = self.anchor(key);
        previous_at(&self.inner.entries.read(), anchor, shift).map(to_entry)
    }

    fn get_next_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>> {
        let (anchor, limit) = (self.anchor(key), self.limit());
        next_at(&self.inner.entries.read(), anchor, shift)
            .map(to_entry)
            .filter(|e| e.key <= limit)
    }

    fn get_previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        let anchor = self.anchor(key);
        let map = self.inner.entries.read();
        previous_run(&map, anchor, count).into_iter().map(to_key).collect()
    }

    fn get_previous_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        let anchor = self.anchor(key);
        let map = self.inner.entries.read();
        previous_run(&map, anchor, count).into_iter().map(to_entry).collect()
    }

    fn get_next_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        let (anchor, limit) = (self.anchor(key), self.limit());
        let map = self.inner.entries.read();
        next_run(&map, anchor, count, limit).into_iter().map(to_key).collect()
    }

    fn get_next_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>> {
        let (anchor, limit) = (self.anchor(key), self.limit());
        let map = self.inner.entries.read();
        next_run(&map, anchor, count, limit).into_iter().map(to_entry).collect()
    }

    fn get_keys(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        let to = to.min(self.limit());
        let map = self.inner.entries.read();
        between(&map, from, to).into_iter().map(to_key).collect()
    }

    fn get_entries(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        let to = to.min(self.limit());
        let map = self.inner.entries.read();
        between(&map, from, to).into_iter().map(to_entry).collect()
    }

    fn future(&self) -> Box<dyn HistoricalQuery<V>> {
        Box::new(StoreQuery {
            inner: Arc::clone(&self.inner),
            adjust: None,
        })
    }
}

/// Raw navigation over the stored keys, ignoring any boundary.
struct StoreNavigator<V> {
    inner: Arc<StoreInner<V>>,
}

impl<V: CacheData> KeyNavigator for StoreNavigator<V> {
    fn previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        previous_at(&self.inner.entries.read(), key.key(), shift).map(to_key)
    }

    fn next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        next_at(&self.inner.entries.read(), key.key(), shift).map(to_key)
    }

    fn previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        let map = self.inner.entries.read();
        previous_run(&map, key.key(), count)
            .into_iter()
            .map(to_key)
            .collect()
    }

    fn keys_between(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        let map = self.inner.entries.read();
        between(&map, from, to).into_iter().map(to_key).collect()
    }
}

/// Serves the floor of the boundary for raw keys beyond it.
struct StoreInterceptor<V> {
    inner: Arc<StoreInner<V>>,
    adjust: Arc<dyn AdjustKeyProvider>,
}

impl<V: CacheData> HighestAllowedValue<V> for StoreInterceptor<V> {
    fn highest_allowed_entry(&self, key: TimeKey) -> Option<Entry<V>> {
        let adjusted = self.adjust.adjust_key(key);
        if adjusted == key {
            return None;
        }
        floor_at(&self.inner.entries.read(), adjusted).map(to_entry)
    }
}

/// In-memory historical cache with oldest-first eviction.
pub struct MemoryHistoricalCache<V> {
    name: String,
    inner: Arc<StoreInner<V>>,
    adjust: RwLock<Arc<dyn AdjustKeyProvider>>,
    extract: ExtractKeyProviderCache<V>,
    listeners: Mutex<Vec<Weak<dyn ClearListener>>>,
    this: Weak<Self>,
}

impl<V: CacheData> MemoryHistoricalCache<V> {
    pub fn new(name: impl Into<String>, adjust: Arc<dyn AdjustKeyProvider>) -> Arc<Self> {
        Self::build(name.into(), adjust, None)
    }

    pub fn with_config(
        name: impl Into<String>,
        adjust: Arc<dyn AdjustKeyProvider>,
        config: &CacheConfig,
    ) -> Arc<Self> {
        Self::build(name.into(), adjust, config.maximum_size)
    }

    fn build(name: String, adjust: Arc<dyn AdjustKeyProvider>, maximum_size: Option<usize>) -> Arc<Self> {
        let cache = Arc::new_cyclic(|this| Self {
            name,
            inner: Arc::new(StoreInner {
                entries: RwLock::new(BTreeMap::new()),
                maximum_size: AtomicUsize::new(maximum_size.unwrap_or(0)),
            }),
            adjust: RwLock::new(Arc::clone(&adjust)),
            extract: ExtractKeyProviderCache::new(),
            listeners: Mutex::new(Vec::new()),
            this: this.clone(),
        });
        cache.attach(&adjust);
        cache
    }

    fn attach(&self, adjust: &Arc<dyn AdjustKeyProvider>) {
        let owner: Weak<dyn KeyEviction> = self.this.clone();
        adjust.attach_owner(owner);
    }

    /// Swaps the boundary this cache answers to. Extract providers built for
    /// the old one are rebuilt on next use.
    pub fn set_adjust_key_provider(&self, adjust: Arc<dyn AdjustKeyProvider>) {
        self.attach(&adjust);
        *self.adjust.write() = adjust;
    }

    /// Boundary-free navigation over this cache's keys.
    pub fn navigator(&self) -> Arc<dyn KeyNavigator> {
        Arc::new(StoreNavigator {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn extract_key_provider(&self) -> Arc<ExtractKeyProvider<V>> {
        self.extract.get_or_create(self)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<TimeKey> {
        self.inner.entries.read().keys().copied().collect()
    }

    /// Value stored at exactly `key`, bypassing boundary and floor lookup.
    pub fn get_exact(&self, key: TimeKey) -> Option<V> {
        self.inner.entries.read().get(&key).cloned()
    }
}

impl<V: CacheData> HistoricalCache<V> for MemoryHistoricalCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: QueryKey) -> Option<V> {
        self.query().get_value(key)
    }

    fn put(&self, key: TimeKey, value: V) {
        self.inner.insert(key, value);
    }

    fn put_value(&self, key: QueryKey, value: CacheValue<V>) -> TimeKey {
        let canonical = self.extract_key_provider().extract_key(key, &value).key();
        self.put(canonical, value.into_value());
        canonical
    }

    fn remove(&self, key: TimeKey) -> Option<V> {
        self.inner.entries.write().remove(&key)
    }

    fn contains_key(&self, key: TimeKey) -> bool {
        self.inner.entries.read().contains_key(&key)
    }

    fn query(&self) -> FilteringQuery<V> {
        let adjust = self.adjust_key_provider();
        let store = StoreQuery {
            inner: Arc::clone(&self.inner),
            adjust: Some(Arc::clone(&adjust)),
        };
        let interceptor = StoreInterceptor {
            inner: Arc::clone(&self.inner),
            adjust: Arc::clone(&adjust),
        };
        FilteringQuery::new(Arc::new(store), adjust).with_interceptor(Arc::new(interceptor))
    }

    fn adjust_key_provider(&self) -> Arc<dyn AdjustKeyProvider> {
        Arc::clone(&self.adjust.read())
    }

    fn register_on_clear_listener(&self, listener: Weak<dyn ClearListener>) {
        self.listeners.lock().push(listener);
    }

    fn increase_maximum_size(&self, size: usize, reason: &str) {
        let updated = self
            .inner
            .maximum_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != 0 && size > current).then_some(size)
            });
        if let Ok(previous) = updated {
            debug!(cache = %self.name, previous, size, reason, "increased maximum size");
        }
    }

    fn maximum_size(&self) -> Option<usize> {
        match self.inner.maximum_size.load(Ordering::Acquire) {
            0 => None,
            size => Some(size),
        }
    }
}

impl<V: CacheData> Clearable for MemoryHistoricalCache<V> {
    fn clear(&self) {
        self.inner.entries.write().clear();
        self.adjust_key_provider().clear();

        let listeners: Vec<Arc<dyn ClearListener>> = {
            let mut registered = self.listeners.lock();
            registered.retain(|l| l.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_clear();
        }
    }
}

impl<V: CacheData> KeyEviction for MemoryHistoricalCache<V> {
    fn evict(&self, key: TimeKey) {
        if self.inner.entries.write().remove(&key).is_some() {
            trace!(cache = %self.name, key = %key, "evicted key");
        }
    }
}
