//! Stateless fixed-window recursion.

use crate::engine::{PreviousValue, RecursionParent, RecursiveQuery};
use pitcache_core::{HistoryError, HistoryResult, QueryKey, TimeKey};

/// Recomputes `recursion_count + unstable_recursion_count` points on every
/// call instead of keeping state.
///
/// `previous_value` never returns a value: it names the window the caller
/// must fold from `initial_value`.
#[derive(Debug, Clone)]
pub struct UnstableRecursiveQuery {
    recursion_count: usize,
    unstable_recursion_count: usize,
}

impl UnstableRecursiveQuery {
    pub fn new(recursion_count: usize, unstable_recursion_count: usize) -> HistoryResult<Self> {
        if recursion_count == 0 {
            return Err(HistoryError::illegal_argument(
                "recursion_count must be > 0",
            ));
        }
        Ok(Self {
            recursion_count,
            unstable_recursion_count,
        })
    }

    pub fn unstable_recursion_count(&self) -> usize {
        self.unstable_recursion_count
    }

    pub fn window_size(&self) -> usize {
        self.recursion_count
            .saturating_add(self.unstable_recursion_count)
    }
}

impl<V> RecursiveQuery<V> for UnstableRecursiveQuery {
    fn previous_value(
        &self,
        parent: &dyn RecursionParent<V>,
        _key: TimeKey,
        previous_key: TimeKey,
    ) -> HistoryResult<PreviousValue<V>> {
        let window = parent
            .navigator()
            .previous_keys(QueryKey::Indexed(previous_key), self.window_size());
        if window.is_empty() {
            return Ok(PreviousValue::Absent);
        }
        Ok(PreviousValue::RecomputeWindow(window))
    }

    fn clear(&self) {}

    fn recursion_count(&self) -> usize {
        self.recursion_count
    }
}
