//! Exponential Moving Average as a recursively-defined series.
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: the close at the first key of whatever window is being walked.

use crate::cache::RecursiveHistoricalCache;
use crate::engine::RecursiveFunction;
use pitcache_core::{
    AdjustKeyProvider, HistoricalCache, HistoryConfig, HistoryError, HistoryResult,
    MemoryHistoricalCache, QueryKey, ShiftDelegate, TimeKey,
};
use std::sync::Arc;

pub struct ExponentialAverage {
    period: usize,
    alpha: f64,
    prices: Arc<dyn HistoricalCache<f64>>,
}

impl ExponentialAverage {
    pub fn new(period: usize, prices: Arc<dyn HistoricalCache<f64>>) -> HistoryResult<Self> {
        if period == 0 {
            return Err(HistoryError::illegal_argument("EMA period must be >= 1"));
        }
        Ok(Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            prices,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn close(&self, key: TimeKey) -> Option<f64> {
        self.prices
            .get(QueryKey::Indexed(key))
            .filter(|close| !close.is_nan())
    }
}

impl RecursiveFunction<f64> for ExponentialAverage {
    fn initial_value(&self, key: TimeKey) -> Option<f64> {
        self.close(key)
    }

    fn next_value(&self, key: TimeKey, previous: &f64) -> HistoryResult<Option<f64>> {
        Ok(self
            .close(key)
            .map(|close| self.alpha * close + (1.0 - self.alpha) * previous))
    }
}

/// EMA cache keyed like `prices`, answering to `adjust`.
pub fn ema_cache(
    prices: &Arc<MemoryHistoricalCache<f64>>,
    period: usize,
    adjust: Arc<dyn AdjustKeyProvider>,
    config: &HistoryConfig,
) -> HistoryResult<RecursiveHistoricalCache<f64>> {
    let source: Arc<dyn HistoricalCache<f64>> = prices.clone();
    let function = Arc::new(ExponentialAverage::new(period, source)?);
    RecursiveHistoricalCache::new(
        format!("ema_{period}({})", prices.name()),
        ShiftDelegate::Raw(prices.navigator()),
        adjust,
        function,
        config,
    )
}

/// Direct EMA over a slice, seeded with the first value.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period.max(1) as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &value in values {
        let ema = match prev {
            None => value,
            Some(p) => alpha * value + (1.0 - alpha) * p,
        };
        result.push(ema);
        prev = Some(ema);
    }
    result
}
