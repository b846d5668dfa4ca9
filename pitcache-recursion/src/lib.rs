//! pitcache recursion: caches whose values depend on the value before them.
//!
//! This crate contains:
//! - The engine contracts (`RecursiveFunction`, `RecursiveQuery`, `RecursionParent`)
//! - The continuous engine, which extends a bounded window forward
//! - The unstable engine, which names a fixed window to recompute
//! - `RecursiveHistoricalCache`, the owning cache that wires them to a store
//! - `FullRecursionKeysCache` and an exponential moving average series

pub mod cache;
pub mod continuous;
pub mod ema;
pub mod engine;
pub mod full_keys;
pub mod unstable;
pub mod window;

pub use cache::RecursiveHistoricalCache;
pub use continuous::{ContinuousRecursiveQuery, ContinuousStats};
pub use ema::{ema_cache, ema_of_series, ExponentialAverage};
pub use engine::{
    FnRecursion, PreviousValue, RecursionEngine, RecursionParent, RecursiveFunction,
    RecursiveQuery,
};
pub use full_keys::{FullRecursionKeysCache, FullRecursionKeysResult};
pub use unstable::UnstableRecursiveQuery;
pub use window::BoundedAscMap;

#[cfg(test)]
mod tests {
    use super::*;

    /// Engines and caches are shared across worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<ContinuousRecursiveQuery<f64>>();
        require_sync::<ContinuousRecursiveQuery<f64>>();
        require_send::<UnstableRecursiveQuery>();
        require_sync::<UnstableRecursiveQuery>();
        require_send::<RecursiveHistoricalCache<f64>>();
        require_sync::<RecursiveHistoricalCache<f64>>();
        require_send::<FullRecursionKeysCache>();
        require_sync::<FullRecursionKeysCache>();
        require_send::<ExponentialAverage>();
        require_sync::<ExponentialAverage>();
    }
}
