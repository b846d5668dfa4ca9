//! Simulated "now" for backtests.

use crate::key::TimeKey;
use crate::provider::BoundarySource;
use std::sync::atomic::{AtomicI64, Ordering};

const UNSET: i64 = i64::MIN;

/// Atomic simulation clock a backtest advances bar by bar.
///
/// Acts as the boundary source for adjust-key providers: caches never serve
/// a key later than the clock. `TimeKey::MIN` cannot be stored; it reads as unset.
#[derive(Debug)]
pub struct SimulationClock {
    now: AtomicI64,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self {
            now: AtomicI64::new(UNSET),
        }
    }

    pub fn starting_at(key: TimeKey) -> Self {
        Self {
            now: AtomicI64::new(key.millis()),
        }
    }

    pub fn now(&self) -> Option<TimeKey> {
        match self.now.load(Ordering::Acquire) {
            UNSET => None,
            millis => Some(TimeKey::from_millis(millis)),
        }
    }

    /// Moves the clock forward. Earlier keys are ignored.
    pub fn advance_to(&self, key: TimeKey) {
        self.now.fetch_max(key.millis(), Ordering::AcqRel);
    }

    /// Sets the clock unconditionally. Adjust-key boundaries never move back,
    /// so rewinding only affects sources read for the first time afterwards.
    pub fn set(&self, key: TimeKey) {
        self.now.store(key.millis(), Ordering::Release);
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundarySource for SimulationClock {
    fn highest_allowed_key(&self) -> Option<TimeKey> {
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_until_first_advance() {
        let clock = SimulationClock::new();
        assert_eq!(clock.now(), None);
        clock.advance_to(TimeKey::from_millis(100));
        assert_eq!(clock.now(), Some(TimeKey::from_millis(100)));
    }

    #[test]
    fn advance_never_moves_back() {
        let clock = SimulationClock::starting_at(TimeKey::from_millis(100));
        clock.advance_to(TimeKey::from_millis(50));
        assert_eq!(clock.now(), Some(TimeKey::from_millis(100)));
        clock.set(TimeKey::from_millis(50));
        assert_eq!(clock.now(), Some(TimeKey::from_millis(50)));
    }
}
