use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use streamhist::{Histogram, HistogramConfig};

pub const SEED: u64 = 0xC0FFEE;

pub fn make_normal_points(size: usize, mean: f64, std_dev: f64) -> Vec<f64> {
    let distribution = Normal::new(mean, std_dev).expect("normal distribution should be valid");

    let mut rng = rand::rngs::SmallRng::seed_from_u64(SEED);
    distribution.sample_iter(&mut rng).take(size).collect::<Vec<_>>()
}

pub fn histogram_from(config: HistogramConfig, values: &[f64]) -> Histogram {
    let mut histogram = Histogram::with_config(config);
    histogram.insert_many(values);
    histogram
}

#[allow(dead_code)]
pub fn assert_within(actual: f64, expected: f64, tolerance: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{}: expected {} (+/- {}), got {}",
        what,
        expected,
        tolerance,
        actual
    );
}
