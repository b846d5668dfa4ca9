//! Stored entries and the shapes a value can take when it enters a cache.

use crate::key::TimeKey;
use serde::{Deserialize, Serialize};

/// Bound shared by every cached value type.
pub trait CacheData: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CacheData for T {}

/// A stored `(key, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<V> {
    pub key: TimeKey,
    pub value: V,
}

impl<V> Entry<V> {
    pub fn new(key: TimeKey, value: V) -> Self {
        Self { key, value }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Entry<U> {
        Entry {
            key: self.key,
            value: f(self.value),
        }
    }
}

/// Values that know the key they belong to.
pub trait KeyExtractable {
    fn extract_key(&self) -> TimeKey;
}

/// A value on its way into a cache, classified once by shape.
///
/// `Entry` and `Extractable` carry their own canonical key. `Bare` values
/// need a reverse lookup to find where they belong.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue<V> {
    Entry(Entry<V>),
    Extractable { key: TimeKey, value: V },
    Bare(V),
}

impl<V> CacheValue<V> {
    pub fn entry(key: TimeKey, value: V) -> Self {
        Self::Entry(Entry::new(key, value))
    }

    pub fn bare(value: V) -> Self {
        Self::Bare(value)
    }

    pub fn extractable(value: V) -> Self
    where
        V: KeyExtractable,
    {
        Self::Extractable {
            key: value.extract_key(),
            value,
        }
    }

    /// The key the value describes itself with, if any.
    pub fn embedded_key(&self) -> Option<TimeKey> {
        match self {
            Self::Entry(entry) => Some(entry.key),
            Self::Extractable { key, .. } => Some(*key),
            Self::Bare(_) => None,
        }
    }

    pub fn value(&self) -> &V {
        match self {
            Self::Entry(entry) => &entry.value,
            Self::Extractable { value, .. } | Self::Bare(value) => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Self::Entry(entry) => entry.value,
            Self::Extractable { value, .. } | Self::Bare(value) => value,
        }
    }
}

impl<V> From<Entry<V>> for CacheValue<V> {
    fn from(entry: Entry<V>) -> Self {
        Self::Entry(entry)
    }
}
