//! Statistical core benchmarks
//!
//! Bootstrap resampling dominates analysis cost (10k resamples per cell by
//! default), so it gets the closest look; the hypothesis tests are here to
//! catch accidental quadratic regressions in the rank machinery.
//!
//! Run with: cargo bench --bench stats_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bakeoff::stats::bootstrap::{BootstrapAggregator, Estimator};
use bakeoff::stats::effect::{cliffs_delta_point, cohens_d_point};
use bakeoff::stats::hypothesis::{kruskal_wallis, mann_whitney_u};

fn lognormal_samples(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let z: f64 = rng.gen_range(-3.0..3.0);
            (z * 0.5 + 10.0).exp()
        })
        .collect()
}

fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap_mean_ci");
    for n in [10usize, 25, 100] {
        let samples = lognormal_samples(n, 1);
        let aggregator = BootstrapAggregator::new(10_000, 0.95, 0x5eed);
        group.bench_with_input(BenchmarkId::from_parameter(n), &samples, |b, samples| {
            b.iter(|| aggregator.aggregate(black_box(samples), Estimator::Mean));
        });
    }
    group.finish();
}

fn bench_rank_tests(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_tests");
    for n in [25usize, 200] {
        let a = lognormal_samples(n, 2);
        let b_samples = lognormal_samples(n, 3);
        group.bench_with_input(
            BenchmarkId::new("mann_whitney_u", n),
            &(a.clone(), b_samples.clone()),
            |b, (x, y)| {
                b.iter(|| mann_whitney_u(black_box(x), black_box(y)));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("kruskal_wallis_2g", n),
            &(a, b_samples),
            |b, (x, y)| {
                b.iter(|| kruskal_wallis(black_box(&[x.as_slice(), y.as_slice()])));
            },
        );
    }
    group.finish();
}

fn bench_effect_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_size_points");
    let a = lognormal_samples(100, 4);
    let b_samples = lognormal_samples(100, 5);
    group.bench_function("cohens_d_point", |b| {
        b.iter(|| cohens_d_point(black_box(&a), black_box(&b_samples)));
    });
    group.bench_function("cliffs_delta_point", |b| {
        b.iter(|| cliffs_delta_point(black_box(&a), black_box(&b_samples)));
    });
    group.finish();
}

criterion_group!(benches, bench_bootstrap, bench_rank_tests, bench_effect_sizes);
criterion_main!(benches);
