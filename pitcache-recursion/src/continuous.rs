//! Continuous recursion: extends a cached window forward instead of
//! recomputing the lookback on every call.
//!
//! State machine per engine: Idle -> Resolving -> Idle. At most one
//! materialization runs per engine; other threads wait on the engine lock and
//! then find their value already stored. Re-entrant calls from the same
//! thread (the parent computing a walk key) are answered from the window, the
//! LRU, or the initial value when the key lies inside the span being walked.

use crate::engine::{PreviousValue, RecursionParent, RecursiveQuery};
use crate::window::BoundedAscMap;
use lru::LruCache;
use parking_lot::ReentrantMutex;
use pitcache_core::key::MILLIS_PER_DAY;
use pitcache_core::{
    CacheData, ClearListener, DiagnosticsConfig, HistoryError, HistoryResult, QueryKey, TimeKey,
};
use serde::Serialize;
use std::cell::RefCell;
use tracing::{debug, error, trace, warn};

/// Iterative series need roughly ten times their nominal lookback to converge.
const AMPLIFICATION: usize = 10;
const MINIMUM_RECURSION_COUNT: usize = 100;

/// Counters describing how an engine has been serving requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContinuousStats {
    pub materializations: u64,
    pub continuations: u64,
    pub full_recalculations: u64,
    pub large_recalculations: u64,
    pub values_computed: u64,
    pub skipped_invalidations: u64,
}

/// Keys covered by the materialization in progress.
#[derive(Debug, Clone, Copy)]
struct RecursionSpan {
    from: TimeKey,
    target: TimeKey,
    request: TimeKey,
}

impl RecursionSpan {
    fn covers(&self, key: TimeKey) -> bool {
        (self.from <= key && key <= self.target) || key == self.request
    }
}

struct State<V> {
    window: BoundedAscMap<V>,
    cached: LruCache<TimeKey, V>,
    cached_capacity: usize,
    first_available_key: Option<TimeKey>,
    last_recursion_key: Option<TimeKey>,
    span: Option<RecursionSpan>,
    stats: ContinuousStats,
}

impl<V: Clone> State<V> {
    fn known(&mut self, key: TimeKey) -> Option<V> {
        if let Some(value) = self.window.get(&key) {
            return Some(value.clone());
        }
        self.cached.get(&key).cloned()
    }

    fn holds(&self, key: TimeKey) -> bool {
        self.window.contains_key(&key) || self.cached.contains(&key)
    }

    fn record(&mut self, key: TimeKey, value: V) {
        self.window.insert(key, value.clone());
        self.cached.put(key, value);
        while self.cached.len() > self.cached_capacity {
            self.cached.pop_lru();
        }
        self.last_recursion_key = Some(key);
        self.stats.values_computed += 1;
    }
}

/// Ends the span when a materialization finishes or fails.
struct SpanGuard<'a, V> {
    state: &'a RefCell<State<V>>,
}

impl<V> Drop for SpanGuard<'_, V> {
    fn drop(&mut self) {
        self.state.borrow_mut().span = None;
    }
}

pub struct ContinuousRecursiveQuery<V> {
    recursion_count: usize,
    large_span_millis: i64,
    log_every: u64,
    // RefCell borrows are never held across calls into the parent.
    state: ReentrantMutex<RefCell<State<V>>>,
}

impl<V: CacheData> ContinuousRecursiveQuery<V> {
    /// `recursion_count` is the nominal lookback; it is amplified x10 with a
    /// floor of 100.
    pub fn new(recursion_count: usize, diagnostics: &DiagnosticsConfig) -> HistoryResult<Self> {
        if recursion_count == 0 {
            return Err(HistoryError::illegal_argument(
                "recursion_count must be > 0",
            ));
        }
        if diagnostics.large_recalculation_log_every == 0 {
            return Err(HistoryError::illegal_argument(
                "large_recalculation_log_every must be > 0",
            ));
        }
        let amplified = recursion_count
            .saturating_mul(AMPLIFICATION)
            .max(MINIMUM_RECURSION_COUNT);

        Ok(Self {
            recursion_count: amplified,
            large_span_millis: diagnostics
                .large_recalculation_span_days
                .saturating_mul(MILLIS_PER_DAY),
            log_every: diagnostics.large_recalculation_log_every,
            state: ReentrantMutex::new(RefCell::new(State {
                window: BoundedAscMap::new(amplified),
                // sized lazily; counts from config can be arbitrarily large
                cached: LruCache::unbounded(),
                cached_capacity: amplified,
                first_available_key: None,
                last_recursion_key: None,
                span: None,
                stats: ContinuousStats::default(),
            })),
        })
    }

    pub fn window_len(&self) -> usize {
        self.state.lock().borrow().window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.state.lock().borrow().window.capacity()
    }

    pub fn stats(&self) -> ContinuousStats {
        self.state.lock().borrow().stats.clone()
    }

    pub fn is_recursing(&self) -> bool {
        self.state.lock().borrow().span.is_some()
    }

    fn first_available_key(
        &self,
        cell: &RefCell<State<V>>,
        parent: &dyn RecursionParent<V>,
    ) -> Option<TimeKey> {
        let cached = cell.borrow().first_available_key;
        if cached.is_some() {
            return cached;
        }
        let first = parent.navigator().first_key()?;
        cell.borrow_mut().first_available_key = Some(first);
        Some(first)
    }

    /// Index into `lookback` (excluding its last key, the target) of the
    /// latest key whose value is already known. Only after a first
    /// materialization.
    fn resume_point(
        &self,
        cell: &RefCell<State<V>>,
        parent: &dyn RecursionParent<V>,
        lookback: &[TimeKey],
    ) -> Option<usize> {
        let last = cell.borrow().last_recursion_key?;
        let candidates = &lookback[..lookback.len().saturating_sub(1)];
        let known = |key: TimeKey| {
            let held = cell.borrow().holds(key);
            held || parent.cached_value(key).is_some()
        };

        if let Some(pos) = candidates.iter().position(|k| *k == last) {
            if known(last) {
                return Some(pos);
            }
        }
        (0..candidates.len()).rev().find(|&i| known(candidates[i]))
    }

    fn note_large_recalculation(&self, cell: &RefCell<State<V>>, from: TimeKey, target: TimeKey) {
        if target.millis_since(from) <= self.large_span_millis {
            return;
        }
        let occurrences = {
            let mut state = cell.borrow_mut();
            state.stats.large_recalculations += 1;
            state.stats.large_recalculations
        };
        if (occurrences - 1) % self.log_every == 0 {
            warn!(
                from = %from,
                target = %target,
                occurrences,
                "large recursive recalculation"
            );
        }
    }

    fn materialize(
        &self,
        cell: &RefCell<State<V>>,
        parent: &dyn RecursionParent<V>,
        key: TimeKey,
        previous_key: TimeKey,
    ) -> HistoryResult<PreviousValue<V>> {
        let navigator = parent.navigator();
        let target = navigator
            .floor_key(QueryKey::Indexed(previous_key))
            .unwrap_or(previous_key);
        let lookback = navigator.previous_keys(
            QueryKey::Indexed(target),
            self.recursion_count.saturating_add(1),
        );
        let Some(&start) = lookback.first() else {
            return Ok(PreviousValue::available(parent.initial_value(previous_key)));
        };

        let (from, walk) = match self.resume_point(cell, parent, &lookback) {
            Some(pos) => {
                cell.borrow_mut().stats.continuations += 1;
                trace!(from = %lookback[pos], target = %target, "continuing recursion window");
                (lookback[pos], &lookback[pos + 1..])
            }
            None => {
                cell.borrow_mut().stats.full_recalculations += 1;
                let seed = navigator
                    .previous_key(QueryKey::Indexed(start), 1)
                    .unwrap_or(start);
                self.note_large_recalculation(cell, seed, target);
                (seed, &lookback[..])
            }
        };

        {
            let mut state = cell.borrow_mut();
            state.stats.materializations += 1;
            state.span = Some(RecursionSpan {
                from,
                target,
                request: key,
            });
        }
        let span = SpanGuard { state: cell };
        debug!(from = %from, target = %target, keys = walk.len(), "materializing recursion");

        for &walk_key in walk {
            if let Some(value) = parent.load_value(walk_key)? {
                cell.borrow_mut().record(walk_key, value);
            }
        }
        drop(span);

        let known = cell.borrow_mut().known(target);
        Ok(PreviousValue::available(
            known.or_else(|| parent.cached_value(target)),
        ))
    }
}

impl<V: CacheData> RecursiveQuery<V> for ContinuousRecursiveQuery<V> {
    fn previous_value(
        &self,
        parent: &dyn RecursionParent<V>,
        key: TimeKey,
        previous_key: TimeKey,
    ) -> HistoryResult<PreviousValue<V>> {
        if let Some(value) = parent.cached_value(previous_key) {
            return Ok(PreviousValue::Available(value));
        }
        let guard = self.state.lock();
        let cell: &RefCell<State<V>> = &guard;
        // another thread may have stored it while we waited
        if let Some(value) = parent.cached_value(previous_key) {
            return Ok(PreviousValue::Available(value));
        }

        let Some(first) = self.first_available_key(cell, parent) else {
            return Ok(PreviousValue::Absent);
        };
        if previous_key <= first {
            return Ok(PreviousValue::available(parent.initial_value(previous_key)));
        }

        let known = cell.borrow_mut().known(previous_key);
        if let Some(value) = known {
            return Ok(PreviousValue::Available(value));
        }

        let span = cell.borrow().span;
        if let Some(span) = span {
            if span.covers(previous_key) {
                trace!(key = %previous_key, "seeding from initial value inside recursion span");
                return Ok(PreviousValue::available(parent.initial_value(previous_key)));
            }
            error!(
                key = %key,
                previous_key = %previous_key,
                from = %span.from,
                target = %span.target,
                "value missing outside the recursion in progress"
            );
            return Err(HistoryError::illegal_state(format!(
                "previous value at {previous_key} for {key} is not cached and lies outside \
                 the recursion in progress ({} ..= {})",
                span.from, span.target
            )));
        }

        self.materialize(cell, parent, key, previous_key)
    }

    /// Drops the window unless a materialization is running.
    fn clear(&self) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.span.is_some() {
            state.stats.skipped_invalidations += 1;
            debug!("recursion in progress, skipping invalidation");
            return;
        }
        state.window.clear();
        state.cached.clear();
        state.first_available_key = None;
        state.last_recursion_key = None;
    }

    fn recursion_count(&self) -> usize {
        self.recursion_count
    }
}

impl<V: CacheData> ClearListener for ContinuousRecursiveQuery<V> {
    fn on_clear(&self) {
        RecursiveQuery::clear(self);
    }
}
