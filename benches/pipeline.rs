//! Benchmarks for the leverage → portfolio → peaks → forward-return chain.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use leveraged_highs::{aggregate, compose, detect, simulate, HoldingPeriods, PeakMode, PriceSeries};

/// Deterministic daily series with drift and cycles
fn generate_series(symbol: &str, n: usize, drift: f64) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
    let prices = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 * (1.0 + drift).powf(t) * (1.0 + 0.1 * (t / 90.0).sin() + 0.02 * (t / 7.0).cos())
        })
        .collect();
    PriceSeries::from_daily(symbol, start, prices)
}

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    for n in [1_000, 10_000] {
        let s = generate_series("QQQ", n, 0.0004);
        group.bench_with_input(BenchmarkId::from_parameter(n), &s, |b, s| {
            b.iter(|| simulate(black_box(s), 3.0))
        });
    }
    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let series = vec![
        generate_series("QQQ", 10_000, 0.0004),
        generate_series("TLT", 10_000, 0.0001),
        generate_series("GLD", 10_000, 0.0002),
    ];
    c.bench_function("compose_3x10k", |b| {
        b.iter(|| compose(black_box(&series), &[3.0, 3.0, 2.0], &[0.5, 0.3, 0.2]))
    });
}

fn bench_detect(c: &mut Criterion) {
    let s = generate_series("QQQ", 10_000, 0.0004);
    let mut group = c.benchmark_group("detect");
    for mode in [PeakMode::RunningMax, PeakMode::RollingWindowMax] {
        group.bench_with_input(BenchmarkId::new(mode.as_str(), 20), &mode, |b, &mode| {
            b.iter(|| detect(black_box(&s), mode, 20))
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let s = generate_series("QQQ", 10_000, 0.0004);
    let horizons = HoldingPeriods::default();
    c.bench_function("aggregate_4_windows", |b| {
        b.iter(|| aggregate(black_box(&s), &[0, 5, 20, 60], PeakMode::RollingWindowMax, &horizons))
    });
}

criterion_group!(benches, bench_simulate, bench_compose, bench_detect, bench_aggregate);
criterion_main!(benches);
