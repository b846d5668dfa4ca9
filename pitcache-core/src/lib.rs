//! pitcache core: point-in-time historical caches.
//!
//! This crate contains the look-ahead-safe query layer:
//! - Time keys and their origin tags (raw, adjusted, indexed)
//! - The historical cache boundary and an in-memory store
//! - Boundary adjustment, key shifting and key extraction providers
//! - Filtering queries that clamp every result to the request bounds
//! - Configuration and the error taxonomy

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod provider;
pub mod query;
pub mod store;
pub mod value;

pub use clock::SimulationClock;
pub use config::{CacheConfig, DiagnosticsConfig, HistoryConfig, RecursionConfig, RecursionStrategy};
pub use error::{HistoryError, HistoryResult};
pub use key::{QueryKey, TimeKey};
pub use provider::{
    AdjustKeyProvider, BoundarySource, ExtractKeyProvider, FnBoundary, KeyNavigator,
    NonRecursiveAdjustKeyProvider, RecursiveAdjustKeyProvider, ShiftDelegate, ShiftKeyProvider,
    ShiftedNavigator,
};
pub use query::{FilteringQuery, FilteringQueryWithFuture, HistoricalQuery};
pub use store::{ClearListener, Clearable, HistoricalCache, MemoryHistoricalCache};
pub use value::{CacheData, CacheValue, Entry, KeyExtractable};
