use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::SeedableRng;
use rand_distr::{Distribution, Pareto};
use streamhist::{Histogram, HistogramConfig};

fn make_points(size: usize) -> Vec<f64> {
    // Latency-like samples in microseconds: a big hump at the beginning with a long tail, limited to values between 15
    // milliseconds and 10 seconds.
    let distribution = Pareto::new(1.0, 1.0).expect("pareto distribution should be valid");
    let seed = 0xC0FFEE;

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    distribution
        .sample_iter(&mut rng)
        // Scale by 10,000 to get microseconds.
        .map(|n| n * 10_000.0)
        .filter(|n| *n > 15_000.0 && *n < 10_000_000.0)
        .take(size)
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let sizes = [1, 10, 100, 1_000, 10_000];
    let configs = [
        ("default", HistogramConfig::new()),
        ("weighted", HistogramConfig::new().with_weighted(true)),
        ("frozen", HistogramConfig::new().with_freeze(1_000)),
    ];

    for (name, config) in configs {
        let mut group = c.benchmark_group(format!("Histogram/insert-{}", name));
        for size in sizes.iter() {
            group.throughput(Throughput::Elements(*size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
                let vals = make_points(size);
                b.iter(|| {
                    let mut histogram = Histogram::with_config(config);
                    histogram.insert_many(&vals);
                    histogram
                });
            });
        }
        group.finish();
    }
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Histogram/merge");
    for size in [10usize, 100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size);

            let mut h1 = Histogram::new();
            let mut h2 = Histogram::new();
            h1.insert_many(&vals[..size / 2]);
            h2.insert_many(&vals[size / 2..]);

            b.iter(|| {
                let mut target = h1.clone();
                target.merge(&h2);
                target
            });
        });
    }
    group.finish();
}

fn bench_quantile(c: &mut Criterion) {
    let mut group = c.benchmark_group("Histogram/quantile");
    for size in [10usize, 100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size);

            let mut histogram = Histogram::new();
            histogram.insert_many(&vals);

            b.iter(|| histogram.quantile(0.5));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_merge, bench_quantile);
criterion_main!(benches);
