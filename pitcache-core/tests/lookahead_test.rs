//! Look-ahead contamination tests for historical caches.
//!
//! Invariant:
//! A query issued while the simulation clock reads T never observes a value
//! stored at a key after T, even when that value is already in the store.
//!
//! Method: fill a cache with a full year of daily values up front, then walk
//! the clock forward and check every consumer-facing path against the clock.

use chrono::NaiveDate;
use pitcache_core::{
    HistoricalCache, HistoricalQuery, MemoryHistoricalCache, NonRecursiveAdjustKeyProvider,
    QueryKey, SimulationClock, TimeKey,
};
use std::sync::Arc;

fn day(y: i32, m: u32, d: u32) -> TimeKey {
    TimeKey::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

/// Daily closes for every calendar day starting at `base`; value = day index.
fn make_daily_cache(
    base: NaiveDate,
    days: usize,
    clock: Arc<SimulationClock>,
) -> Arc<MemoryHistoricalCache<f64>> {
    let cache = MemoryHistoricalCache::<f64>::new(
        "closes",
        Arc::new(NonRecursiveAdjustKeyProvider::new(clock)),
    );
    for i in 0..days {
        let date = base + chrono::Duration::days(i as i64);
        cache.put(TimeKey::from_date(date), i as f64);
    }
    cache
}

// ── Scenario from the 2021 replay ────────────────────────────────────

#[test]
fn query_past_boundary_returns_boundary_value() {
    let clock = Arc::new(SimulationClock::starting_at(day(2021, 1, 10)));
    let cache = make_daily_cache(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), 31, clock);

    // the 15th is in the store but lies in the future
    assert!(cache.contains_key(day(2021, 1, 15)));
    let value = cache.get(QueryKey::Raw(day(2021, 1, 15)));
    assert_eq!(value, Some(9.0), "must serve 2021-01-10, not 2021-01-15");

    let entry = cache.query().get_entry(QueryKey::Raw(day(2021, 1, 15))).unwrap();
    assert_eq!(entry.key, day(2021, 1, 10));
}

#[test]
fn navigation_never_crosses_boundary() {
    let clock = Arc::new(SimulationClock::starting_at(day(2021, 1, 10)));
    let cache = make_daily_cache(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), 31, clock);
    let q = cache.query();

    assert_eq!(q.get_next_key(QueryKey::Raw(day(2021, 1, 9)), 1), Some(day(2021, 1, 10)));
    assert_eq!(q.get_next_key(QueryKey::Raw(day(2021, 1, 9)), 2), None);
    assert_eq!(q.get_previous_key(QueryKey::Raw(day(2021, 1, 20)), 0), Some(day(2021, 1, 10)));
    assert!(q
        .get_next_entries(QueryKey::Raw(day(2021, 1, 5)), 20)
        .iter()
        .all(|e| e.key <= day(2021, 1, 10)));
    assert_eq!(q.get_values(day(2021, 1, 1), day(2021, 1, 31)).len(), 10);
    assert_eq!(q.get_values_cached(day(2021, 1, 1), day(2021, 1, 31)).len(), 10);
}

#[test]
fn future_query_sees_everything() {
    let clock = Arc::new(SimulationClock::starting_at(day(2021, 1, 10)));
    let cache = make_daily_cache(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), 31, clock);
    let future = cache.query().with_future();

    assert_eq!(
        future.get_key(QueryKey::Raw(day(2021, 1, 15))),
        Some(day(2021, 1, 15))
    );
    assert_eq!(future.get_keys(day(2021, 1, 1), day(2021, 1, 31)).len(), 31);
    // idempotent
    let again = future.clone().with_future();
    assert_eq!(again.get_keys(day(2021, 1, 1), day(2021, 1, 31)).len(), 31);
}

// ── Walking the clock ────────────────────────────────────────────────

#[test]
fn every_step_of_a_replay_is_point_in_time() {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let clock = Arc::new(SimulationClock::new());
    let cache = make_daily_cache(base, 366, clock.clone());
    let far_future = day(2030, 1, 1);

    for i in 0..366 {
        let now = TimeKey::from_date(base + chrono::Duration::days(i));
        clock.advance_to(now);

        let seen = cache.query().get_entry(QueryKey::Raw(far_future)).unwrap();
        assert_eq!(seen.key, now, "step {i}: served {} while clock at {now}", seen.key);
        assert_eq!(seen.value, i as f64);
    }
}

#[test]
fn rewinding_the_clock_does_not_rewind_the_boundary() {
    let clock = Arc::new(SimulationClock::starting_at(day(2021, 1, 20)));
    let cache = make_daily_cache(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), 31, clock.clone());
    assert_eq!(cache.get(QueryKey::Raw(day(2021, 1, 31))), Some(19.0));

    clock.set(day(2021, 1, 5));
    assert_eq!(cache.get(QueryKey::Raw(day(2021, 1, 31))), Some(19.0));
    assert_eq!(
        cache.adjust_key_provider().highest_allowed_key(),
        Some(day(2021, 1, 20))
    );
}
