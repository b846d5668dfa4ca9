use pitcache_core::TimeKey;
use std::collections::BTreeMap;

/// Ordered map that keeps only the `capacity` highest keys.
#[derive(Debug, Clone)]
pub struct BoundedAscMap<V> {
    map: BTreeMap<TimeKey, V>,
    capacity: usize,
}

impl<V> BoundedAscMap<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts and evicts from the low end until within capacity.
    pub fn insert(&mut self, key: TimeKey, value: V) {
        self.map.insert(key, value);
        while self.map.len() > self.capacity {
            self.map.pop_first();
        }
    }

    pub fn get(&self, key: &TimeKey) -> Option<&V> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &TimeKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn first_key(&self) -> Option<TimeKey> {
        self.map.keys().next().copied()
    }

    pub fn last_key(&self) -> Option<TimeKey> {
        self.map.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
