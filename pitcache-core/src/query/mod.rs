//! Key/value navigation over a historical cache.
//!
//! Every navigation call is anchored on `floor(key)`, the greatest stored key
//! not after `key`. Shifts count stored keys, not time.

pub mod filtering;

pub use filtering::{ElementFilter, FilteringQuery, FilteringQueryWithFuture};

use crate::key::{QueryKey, TimeKey};
use crate::value::Entry;

pub trait HistoricalQuery<V>: Send + Sync {
    /// The stored key serving `key`, i.e. its floor.
    fn get_key(&self, key: QueryKey) -> Option<TimeKey>;

    fn get_entry(&self, key: QueryKey) -> Option<Entry<V>>;

    fn get_value(&self, key: QueryKey) -> Option<V> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// The key `shift` steps before the floor of `key`; shift 0 is the floor.
    fn get_previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey>;

    /// The key `shift` steps after the floor of `key`. Without a floor the
    /// first stored key counts as step 1.
    fn get_next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey>;

    fn get_previous_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>>;

    fn get_next_entry(&self, key: QueryKey, shift: usize) -> Option<Entry<V>>;

    /// Up to `count` keys ascending, ending at the floor of `key`.
    fn get_previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey>;

    fn get_previous_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>>;

    /// Up to `count` keys ascending, starting at the first key at or after `key`.
    fn get_next_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey>;

    fn get_next_entries(&self, key: QueryKey, count: usize) -> Vec<Entry<V>>;

    /// Stored keys in `[from, to]`, ascending.
    fn get_keys(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey>;

    fn get_entries(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>>;

    fn get_values(&self, from: TimeKey, to: TimeKey) -> Vec<V> {
        self.get_entries(from, to)
            .into_iter()
            .map(|entry| entry.value)
            .collect()
    }

    /// Range over values already materialized; never triggers computation.
    fn get_keys_cached(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.get_keys(from, to)
    }

    fn get_entries_cached(&self, from: TimeKey, to: TimeKey) -> Vec<Entry<V>> {
        self.get_entries(from, to)
    }

    fn get_values_cached(&self, from: TimeKey, to: TimeKey) -> Vec<V> {
        self.get_entries_cached(from, to)
            .into_iter()
            .map(|entry| entry.value)
            .collect()
    }

    /// A view of the same data that ignores the look-ahead boundary.
    fn future(&self) -> Box<dyn HistoricalQuery<V>>;
}
