//! TOML configuration for caches and recursive engines.
//!
//! Every field has a default, so an empty document is a valid configuration.

use crate::error::{HistoryError, HistoryResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub cache: CacheConfig,
    pub recursion: RecursionConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum stored entries; `None` means unbounded.
    pub maximum_size: Option<usize>,
}

/// Which recursive query engine an owning cache uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecursionStrategy {
    /// Incremental sliding window, amortized O(1) per sequential step.
    #[default]
    Continuous,
    /// Stateless fixed-window recompute on every call.
    Unstable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecursionConfig {
    pub strategy: RecursionStrategy,
    /// Nominal lookback. The continuous engine amplifies it x10 with a floor of 100.
    pub recursion_count: usize,
    /// Extra lookback for numerical convergence (unstable engine only).
    pub unstable_recursion_count: usize,
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            strategy: RecursionStrategy::Continuous,
            recursion_count: 20,
            unstable_recursion_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// A full recalculation spanning more than this many days counts as large.
    pub large_recalculation_span_days: i64,
    /// Log one of every N large recalculations.
    pub large_recalculation_log_every: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            large_recalculation_span_days: 365,
            large_recalculation_log_every: 100,
        }
    }
}

impl HistoryConfig {
    pub fn from_toml_str(s: &str) -> HistoryResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> HistoryResult<()> {
        if self.cache.maximum_size == Some(0) {
            return Err(HistoryError::illegal_argument(
                "cache.maximum_size must be > 0",
            ));
        }
        if self.recursion.recursion_count == 0 {
            return Err(HistoryError::illegal_argument(
                "recursion.recursion_count must be > 0",
            ));
        }
        if self.diagnostics.large_recalculation_span_days <= 0 {
            return Err(HistoryError::illegal_argument(
                "diagnostics.large_recalculation_span_days must be > 0",
            ));
        }
        if self.diagnostics.large_recalculation_log_every == 0 {
            return Err(HistoryError::illegal_argument(
                "diagnostics.large_recalculation_log_every must be > 0",
            ));
        }
        Ok(())
    }
}
