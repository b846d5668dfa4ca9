//! Previous/next key resolution for caches whose keys follow another series.

use super::AdjustKeyProvider;
use crate::key::{QueryKey, TimeKey};
use crate::store::HistoricalCache;
use crate::value::{CacheData, CacheValue, Entry};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Navigation over an ordered key set. Semantics match
/// [`HistoricalQuery`](crate::query::HistoricalQuery): everything is anchored
/// on the floor of the requested key.
pub trait KeyNavigator: Send + Sync {
    fn previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey>;

    fn next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey>;

    /// Up to `count` keys ascending, ending at the floor of `key`.
    fn previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey>;

    /// Keys in `[from, to]`, ascending.
    fn keys_between(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey>;

    fn first_key(&self) -> Option<TimeKey> {
        self.next_key(QueryKey::Indexed(TimeKey::MIN), 1)
    }

    fn floor_key(&self, key: QueryKey) -> Option<TimeKey> {
        self.previous_key(key, 0)
    }

    /// Hook for navigators that track keys written through them.
    fn remember(&self, _key: TimeKey) {}
}

/// A navigator that wraps another and can hand out the unwrapped one.
pub trait ShiftedNavigator: KeyNavigator {
    fn raw_delegate(&self) -> Arc<dyn KeyNavigator>;
}

/// The navigation source of a shift provider.
#[derive(Clone)]
pub enum ShiftDelegate {
    Raw(Arc<dyn KeyNavigator>),
    Shifted(Arc<dyn ShiftedNavigator>),
}

impl ShiftDelegate {
    /// Unwraps one level so shift providers never chain.
    pub fn into_raw(self) -> Arc<dyn KeyNavigator> {
        match self {
            ShiftDelegate::Raw(navigator) => navigator,
            ShiftDelegate::Shifted(shifted) => shifted.raw_delegate(),
        }
    }
}

/// Resolves previous/next keys through a raw navigator and re-normalizes the
/// results through the owning cache's boundary.
///
/// Wrapping another shift provider keeps that provider's raw delegate and
/// re-parents to the new owner.
pub struct ShiftKeyProvider<V> {
    delegate: Arc<dyn KeyNavigator>,
    adjust: Arc<dyn AdjustKeyProvider>,
    owner: Weak<dyn HistoricalCache<V>>,
}

impl<V: CacheData> ShiftKeyProvider<V> {
    pub fn new(owner: &Arc<dyn HistoricalCache<V>>, delegate: ShiftDelegate) -> Self {
        Self {
            delegate: delegate.into_raw(),
            adjust: owner.adjust_key_provider(),
            owner: Arc::downgrade(owner),
        }
    }

    pub fn adjust_key_provider(&self) -> &Arc<dyn AdjustKeyProvider> {
        &self.adjust
    }

    pub fn raw(&self) -> &Arc<dyn KeyNavigator> {
        &self.delegate
    }

    /// The key stored immediately before the floor of `key`, within the boundary.
    ///
    /// Resolved against the delegate on every call: keys arriving between the
    /// floor and `key` move the answer.
    pub fn calculate_previous_key(&self, key: QueryKey) -> Option<QueryKey> {
        let pivot = self.adjust.adjust_query_key(key).key();
        self.delegate
            .previous_key(QueryKey::Adjusted(pivot), 1)
            .map(|k| self.adjust.new_already_adjusted_key(self.adjust.adjust_key(k)))
    }

    /// The key stored immediately after the floor of `key`. `None` when that
    /// key lies beyond the boundary.
    pub fn calculate_next_key(&self, key: QueryKey) -> Option<QueryKey> {
        let pivot = self.adjust.adjust_query_key(key).key();
        let next = self.delegate.next_key(QueryKey::Adjusted(pivot), 1)?;
        (next > pivot && self.adjust.adjust_key(next) == next)
            .then(|| self.adjust.new_already_adjusted_key(next))
    }

    /// Stores `value` in the owning cache unless `existing` already holds it
    /// at the same key. Returns the canonical key, or `None` when the owner
    /// is gone.
    pub fn put(
        &self,
        previous: Option<QueryKey>,
        value_key: QueryKey,
        value: CacheValue<V>,
        existing: Option<&Entry<V>>,
        next: Option<QueryKey>,
    ) -> Option<TimeKey> {
        let owner = self.owner.upgrade()?;
        let target = value.embedded_key().unwrap_or(value_key.key());
        debug_assert!(previous.map_or(true, |p| p.key() < target));
        debug_assert!(next.map_or(true, |n| n.key() > target));

        let stored = match existing {
            Some(entry) if entry.key == target => entry.key,
            _ => owner.put_value(value_key, value),
        };
        trace!(key = %stored, "stored shifted value");
        self.delegate.remember(stored);
        Some(stored)
    }

    /// No navigation state is kept between calls; only logs.
    pub fn clear(&self) {
        trace!("cleared shift provider");
    }
}

impl<V: CacheData> KeyNavigator for ShiftKeyProvider<V> {
    fn previous_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        let pivot = self.adjust.adjust_query_key(key);
        self.delegate
            .previous_key(pivot, shift)
            .map(|k| self.adjust.adjust_key(k))
    }

    fn next_key(&self, key: QueryKey, shift: usize) -> Option<TimeKey> {
        let pivot = self.adjust.adjust_query_key(key);
        self.delegate
            .next_key(pivot, shift)
            .filter(|k| self.adjust.adjust_key(*k) == *k)
    }

    fn previous_keys(&self, key: QueryKey, count: usize) -> Vec<TimeKey> {
        let pivot = self.adjust.adjust_query_key(key);
        let mut keys = self.delegate.previous_keys(pivot, count);
        keys.retain(|k| *k <= pivot.key());
        keys
    }

    fn keys_between(&self, from: TimeKey, to: TimeKey) -> Vec<TimeKey> {
        self.delegate.keys_between(from, self.adjust.adjust_key(to))
    }

    fn remember(&self, key: TimeKey) {
        self.delegate.remember(key);
    }
}

impl<V: CacheData> ShiftedNavigator for ShiftKeyProvider<V> {
    fn raw_delegate(&self) -> Arc<dyn KeyNavigator> {
        Arc::clone(&self.delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulationClock;
    use crate::provider::{NonRecursiveAdjustKeyProvider, RecursiveAdjustKeyProvider};
    use crate::store::MemoryHistoricalCache;

    fn k(day: i64) -> TimeKey {
        TimeKey::from_millis(0).plus_days(day)
    }

    fn prices(days: &[i64]) -> Arc<MemoryHistoricalCache<f64>> {
        let cache = MemoryHistoricalCache::<f64>::new(
            "prices",
            Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
        );
        for d in days {
            cache.put(k(*d), *d as f64);
        }
        cache
    }

    fn owner_with_clock(clock: Arc<SimulationClock>) -> Arc<dyn HistoricalCache<f64>> {
        MemoryHistoricalCache::<f64>::new("derived", Arc::new(RecursiveAdjustKeyProvider::new(clock)))
    }

    #[test]
    fn previous_and_next_follow_raw_keys() {
        let source = prices(&[1, 2, 5, 8]);
        let owner = owner_with_clock(Arc::new(SimulationClock::starting_at(k(100))));
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));

        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(5))),
            Some(QueryKey::Adjusted(k(2)))
        );
        // between keys: anchored on the floor
        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(6))),
            Some(QueryKey::Adjusted(k(2)))
        );
        assert_eq!(
            shift.calculate_next_key(QueryKey::Raw(k(5))),
            Some(QueryKey::Adjusted(k(8)))
        );
        assert_eq!(shift.calculate_previous_key(QueryKey::Raw(k(1))), None);
        assert_eq!(shift.calculate_next_key(QueryKey::Raw(k(8))), None);
    }

    #[test]
    fn next_beyond_boundary_is_hidden() {
        let source = prices(&[1, 2, 5, 8]);
        let owner = owner_with_clock(Arc::new(SimulationClock::starting_at(k(6))));
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));

        assert_eq!(shift.calculate_next_key(QueryKey::Raw(k(5))), None);
        assert_eq!(KeyNavigator::next_key(&shift, QueryKey::Raw(k(2)), 1), Some(k(5)));
        assert_eq!(KeyNavigator::next_key(&shift, QueryKey::Raw(k(2)), 2), None);
        // a raw key past the boundary is clamped before navigating
        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(9))),
            Some(QueryKey::Adjusted(k(2)))
        );
    }

    #[test]
    fn wrapping_a_shift_provider_keeps_the_raw_delegate() {
        let source = prices(&[1, 2, 3]);
        let raw = source.navigator();
        let clock = Arc::new(SimulationClock::starting_at(k(100)));
        let first_owner = owner_with_clock(clock.clone());
        let first: Arc<ShiftKeyProvider<f64>> = Arc::new(ShiftKeyProvider::new(
            &first_owner,
            ShiftDelegate::Raw(raw.clone()),
        ));

        let second_owner = owner_with_clock(clock);
        let second = ShiftKeyProvider::new(&second_owner, ShiftDelegate::Shifted(first));
        assert!(Arc::ptr_eq(second.raw(), &raw));
    }

    #[test]
    fn put_skips_existing_entry_and_writes_missing() {
        let source = prices(&[1, 2, 3]);
        let owner_store = MemoryHistoricalCache::<f64>::new(
            "derived",
            Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
        );
        let owner: Arc<dyn HistoricalCache<f64>> = owner_store.clone();
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));

        let stored = shift.put(
            Some(QueryKey::Adjusted(k(1))),
            QueryKey::Adjusted(k(2)),
            CacheValue::entry(k(2), 20.0),
            None,
            Some(QueryKey::Adjusted(k(3))),
        );
        assert_eq!(stored, Some(k(2)));
        assert_eq!(owner_store.get_exact(k(2)), Some(20.0));

        let existing = Entry::new(k(2), 20.0);
        shift.put(
            None,
            QueryKey::Adjusted(k(2)),
            CacheValue::entry(k(2), 99.0),
            Some(&existing),
            None,
        );
        assert_eq!(owner_store.get_exact(k(2)), Some(20.0));
    }

    #[test]
    fn previous_key_follows_keys_arriving_later() {
        let source = prices(&[1, 2]);
        let owner = owner_with_clock(Arc::new(SimulationClock::starting_at(k(5))));
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));

        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(5))),
            Some(QueryKey::Adjusted(k(1)))
        );
        // the bar at "now" lands after the first lookup
        source.put(k(5), 5.0);
        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(5))),
            Some(QueryKey::Adjusted(k(2)))
        );

        // a key between the floor and the pivot
        let source = prices(&[1, 2, 8]);
        let owner = owner_with_clock(Arc::new(SimulationClock::starting_at(k(100))));
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));
        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(8))),
            Some(QueryKey::Adjusted(k(2)))
        );
        source.put(k(5), 5.0);
        assert_eq!(
            shift.calculate_previous_key(QueryKey::Raw(k(8))),
            Some(QueryKey::Adjusted(k(5)))
        );
    }

    #[test]
    fn round_trip_stays_at_or_before_key() {
        let source = prices(&[1, 3, 4, 9, 12]);
        let owner = owner_with_clock(Arc::new(SimulationClock::starting_at(k(100))));
        let shift = ShiftKeyProvider::new(&owner, ShiftDelegate::Raw(source.navigator()));
        for day in [3, 4, 9, 12] {
            let previous = shift.calculate_previous_key(QueryKey::Raw(k(day))).unwrap();
            let back = shift.calculate_next_key(previous).unwrap();
            assert!(back.key() <= k(day));
        }
    }
}
