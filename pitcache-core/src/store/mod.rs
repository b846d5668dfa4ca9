//! The time-keyed store boundary and its in-memory implementation.

pub mod memory;

pub use memory::MemoryHistoricalCache;

use crate::key::{QueryKey, TimeKey};
use crate::provider::AdjustKeyProvider;
use crate::query::FilteringQuery;
use crate::value::{CacheValue, Entry};
use std::sync::{Arc, Weak};

pub trait Clearable: Send + Sync {
    fn clear(&self);
}

/// Notified after the cache it is registered on has been cleared.
pub trait ClearListener: Send + Sync {
    fn on_clear(&self);
}

/// Removal of a single key, used to drop values served past the boundary.
pub trait KeyEviction: Send + Sync {
    fn evict(&self, key: TimeKey);
}

/// Override consulted before ordinary lookups of raw keys.
pub trait HighestAllowedValue<V>: Send + Sync {
    /// `Some` when `key` lies beyond the boundary: the entry the consumer is
    /// allowed to see instead.
    fn highest_allowed_entry(&self, key: TimeKey) -> Option<Entry<V>>;
}

pub trait HistoricalCache<V>: Clearable {
    fn name(&self) -> &str;

    /// Value serving `key` through the boundary-enforcing query.
    fn get(&self, key: QueryKey) -> Option<V>;

    fn put(&self, key: TimeKey, value: V);

    /// Stores a value at the key its shape resolves to. Returns that key.
    fn put_value(&self, key: QueryKey, value: CacheValue<V>) -> TimeKey;

    fn remove(&self, key: TimeKey) -> Option<V>;

    fn contains_key(&self, key: TimeKey) -> bool;

    fn query(&self) -> FilteringQuery<V>;

    fn adjust_key_provider(&self) -> Arc<dyn AdjustKeyProvider>;

    fn register_on_clear_listener(&self, listener: Weak<dyn ClearListener>);

    /// Grows the maximum size to at least `size`. Never shrinks it.
    fn increase_maximum_size(&self, size: usize, reason: &str);

    /// `None` when unbounded.
    fn maximum_size(&self) -> Option<usize>;
}
