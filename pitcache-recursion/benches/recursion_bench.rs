//! Criterion benchmarks for recursive cache hot paths.
//!
//! Benchmarks:
//! 1. Sequential walk (the backtest access pattern, continuation-friendly)
//! 2. Random access (forces full recalculations)
//! 3. Unstable engine walk (fixed-window refold per key)
//! 4. Key window advance (FullRecursionKeysResult::push_to_next)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pitcache_core::{
    HistoricalCache, HistoryConfig, MemoryHistoricalCache, NonRecursiveAdjustKeyProvider,
    QueryKey, RecursionStrategy, TimeKey,
};
use pitcache_recursion::{ema_cache, FullRecursionKeysResult};
use rand::{Rng, SeedableRng};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────

fn k(i: usize) -> TimeKey {
    TimeKey::from_millis(0).plus_days(i as i64)
}

fn make_prices(n: usize) -> Arc<MemoryHistoricalCache<f64>> {
    let cache = MemoryHistoricalCache::<f64>::new(
        "closes",
        Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
    );
    for i in 0..n {
        cache.put(k(i), 100.0 + (i as f64 * 0.1).sin() * 10.0);
    }
    cache
}

fn config(strategy: RecursionStrategy) -> HistoryConfig {
    let mut config = HistoryConfig::default();
    config.recursion.strategy = strategy;
    config.recursion.recursion_count = 20;
    config.recursion.unstable_recursion_count = 20;
    config
}

// ── 1. Sequential ────────────────────────────────────────────────────

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("ema_sequential");
    for n in [1_000_usize, 5_000] {
        let prices = make_prices(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let ema = ema_cache(
                    &prices,
                    20,
                    Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
                    &config(RecursionStrategy::Continuous),
                )
                .unwrap();
                for i in 0..n {
                    black_box(ema.get(QueryKey::Raw(k(i))).unwrap());
                }
            })
        });
    }
    group.finish();
}

// ── 2. Random access ─────────────────────────────────────────────────

fn bench_random(c: &mut Criterion) {
    let n = 5_000;
    let prices = make_prices(n);
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let keys: Vec<usize> = (0..200).map(|_| rng.gen_range(0..n)).collect();

    c.bench_function("ema_random_200_of_5000", |b| {
        b.iter(|| {
            let ema = ema_cache(
                &prices,
                20,
                Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
                &config(RecursionStrategy::Continuous),
            )
            .unwrap();
            for &i in &keys {
                black_box(ema.get(QueryKey::Raw(k(i))).unwrap());
            }
        })
    });
}

// ── 3. Unstable ──────────────────────────────────────────────────────

fn bench_unstable(c: &mut Criterion) {
    let n = 1_000;
    let prices = make_prices(n);
    c.bench_function("ema_unstable_walk_1000", |b| {
        b.iter(|| {
            let ema = ema_cache(
                &prices,
                20,
                Arc::new(NonRecursiveAdjustKeyProvider::unbounded()),
                &config(RecursionStrategy::Unstable),
            )
            .unwrap();
            for i in (0..n).step_by(7) {
                black_box(ema.get(QueryKey::Raw(k(i))).unwrap());
            }
        })
    });
}

// ── 4. Key window ────────────────────────────────────────────────────

fn bench_key_window(c: &mut Criterion) {
    let n = 2_000;
    let prices = make_prices(n);
    let nav = prices.navigator();
    c.bench_function("key_window_push_2000", |b| {
        b.iter(|| {
            let mut window = FullRecursionKeysResult::rebuild(nav.as_ref(), k(0), 200).unwrap();
            for i in 1..n {
                window = window.push_to_next(nav.as_ref(), k(i)).unwrap();
            }
            black_box(window.len())
        })
    });
}

criterion_group!(
    benches,
    bench_sequential,
    bench_random,
    bench_unstable,
    bench_key_window
);
criterion_main!(benches);
