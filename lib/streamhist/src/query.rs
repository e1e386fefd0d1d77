//! Queries over the bins of a histogram.
//!
//! Quantile and cumulative count estimates interpolate between adjacent bins, treating the weight of each bin as being
//! spread linearly towards its neighbors: the estimated density between two bins varies linearly from the count of the
//! lower bin to the count of the upper bin. Each bin contributes half of its weight to either side of its mean, which is
//! why the cumulative count of a bin (`cumn`) only includes half of the bin's own weight.
//!
//! The recorded minimum and maximum act as zero-weight anchors at either end of the bins, so that estimates below the
//! first bin or above the last bin interpolate towards the true extremes of the data.

use serde::Serialize;

use crate::bin::Bin;
use crate::sketch::Histogram;

/// Offset used to evaluate the density on either side of a bin's mean.
const DENSITY_EPSILON: f64 = 10.0 * f64::EPSILON;

/// A point in the cumulative count index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Anchor {
    mean: f64,
    count: f64,
    cumn: f64,
}

impl Anchor {
    const fn new(mean: f64, count: f64, cumn: f64) -> Self {
        Self { mean, count, cumn }
    }
}

/// Cumulative count index over the bins of a histogram.
///
/// Holds the bins in ascending order of mean, annotated with their cumulative count, and bracketed by a zero-weight
/// anchor at the minimum (with a cumulative count of zero) and at the maximum (with a cumulative count equal to the
/// total count). As the cumulative count is monotonic in the mean, the index can be searched by either.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CumulativeIndex {
    anchors: Vec<Anchor>,
}

impl CumulativeIndex {
    fn build(histogram: &Histogram) -> Self {
        let mut anchors = Vec::with_capacity(histogram.size() + 2);
        anchors.push(Anchor::new(histogram.min, 0.0, 0.0));

        let mut running = 0.0;
        for bin in histogram.bins() {
            anchors.push(Anchor::new(bin.mean, bin.count, running + bin.count / 2.0));
            running += bin.count;
        }

        anchors.push(Anchor::new(histogram.max, 0.0, histogram.count));

        Self { anchors }
    }

    /// Returns the bins of the index, excluding the minimum and maximum anchors.
    fn bins(&self) -> &[Anchor] {
        &self.anchors[1..self.anchors.len() - 1]
    }

    /// Returns the anchors bracketing the cumulative count `s`, such that `lower.cumn <= s <= upper.cumn`.
    fn bracket_by_cumn(&self, s: f64) -> (&Anchor, &Anchor) {
        let idx = self
            .anchors
            .partition_point(|anchor| anchor.cumn < s)
            .clamp(1, self.anchors.len() - 1);

        (&self.anchors[idx - 1], &self.anchors[idx])
    }

    /// Returns the anchors bracketing `value`, such that `lower.mean <= value <= upper.mean`.
    ///
    /// The minimum and maximum anchors are only used when they lie strictly outside the first and last bin,
    /// respectively. `value` must lie within the recorded minimum and maximum.
    fn bracket_by_mean(&self, value: f64) -> (&Anchor, &Anchor) {
        let anchors = self.usable_anchors();
        let upper_idx = anchors
            .partition_point(|anchor| anchor.mean < value)
            .min(anchors.len() - 1);
        let lower_idx = anchors
            .partition_point(|anchor| anchor.mean <= value)
            .saturating_sub(1)
            .min(upper_idx);

        (&anchors[lower_idx], &anchors[upper_idx])
    }

    /// Returns the anchors neighboring the bin at exactly `value`, if any.
    ///
    /// The result holds the anchor before the bin, the bin itself, and the anchor after the bin, where the neighbors
    /// are `None` if the bin is the first or last usable anchor.
    fn neighbors_of(&self, value: f64) -> Option<(Option<&Anchor>, &Anchor, Option<&Anchor>)> {
        let anchors = self.usable_anchors();
        let idx = anchors.iter().position(|anchor| anchor.mean == value)?;

        let before = idx.checked_sub(1).map(|i| &anchors[i]);
        Some((before, &anchors[idx], anchors.get(idx + 1)))
    }

    fn usable_anchors(&self) -> &[Anchor] {
        let bins = self.bins();
        let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
            return &self.anchors;
        };

        let start = if self.anchors[0].mean < first.mean { 0 } else { 1 };
        let end = if self.anchors[self.anchors.len() - 1].mean > last.mean {
            self.anchors.len()
        } else {
            self.anchors.len() - 1
        };

        &self.anchors[start..end]
    }
}

/// Summary statistics of a histogram.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// Total weight of all observations.
    pub count: f64,

    /// Mean of all observations.
    pub mean: f64,

    /// Standard deviation of all observations, or `None` if there are too few observations.
    pub std: Option<f64>,

    /// Minimum value of all observations.
    pub min: f64,

    /// Estimated first quartile.
    pub q1: f64,

    /// Estimated median.
    pub q2: f64,

    /// Estimated third quartile.
    pub q3: f64,

    /// Maximum value of all observations.
    pub max: f64,
}

impl Histogram {
    /// Gets the cumulative count index, rebuilding it if it is stale.
    fn cumulative_index(&self) -> &CumulativeIndex {
        self.cumulative.get_or_init(|| CumulativeIndex::build(self))
    }

    /// Gets the estimated value at the given quantile.
    ///
    /// Quantiles at or below 0 return the minimum value, and quantiles at or above 1 return the maximum value.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.is_empty() || q.is_nan() {
            return None;
        }

        if q <= 0.0 {
            return Some(self.min);
        }

        if q >= 1.0 {
            return Some(self.max);
        }

        let index = self.cumulative_index();
        let s = self.count * q;
        let (lower, upper) = index.bracket_by_cumn(s);

        let d = lower.cumn - s;
        let a = upper.count - lower.count;

        let z = if a == 0.0 {
            let width = upper.cumn - lower.cumn;
            if width == 0.0 {
                0.0
            } else {
                (s - lower.cumn) / width
            }
        } else {
            // Positive root of `a*z^2 + 2*lower.count*z + 2*d = 0`, rationalized to avoid cancellation when `a` is small
            // relative to the lower count.
            let b = 2.0 * lower.count;
            let discriminant = (b * b - 8.0 * a * d).max(0.0);
            let denominator = b + discriminant.sqrt();
            if denominator == 0.0 {
                0.0
            } else {
                -4.0 * d / denominator
            }
        };

        let z = z.clamp(0.0, 1.0);
        Some(lower.mean + (upper.mean - lower.mean) * z)
    }

    /// Gets the estimated values at each of the given quantiles.
    pub fn quantiles(&self, qs: &[f64]) -> Vec<Option<f64>> {
        qs.iter().map(|q| self.quantile(*q)).collect()
    }

    /// Gets the estimated total weight of observations less than or equal to `value`.
    ///
    /// Values below the minimum return 0, and values at or above the maximum return the total count.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn sum(&self, value: f64) -> Option<f64> {
        if self.is_empty() || value.is_nan() {
            return None;
        }

        if value < self.min {
            return Some(0.0);
        }

        if value >= self.max {
            return Some(self.count);
        }

        let index = self.cumulative_index();
        let (lower, upper) = index.bracket_by_mean(value);

        if value == lower.mean || upper.mean == lower.mean {
            return Some(lower.cumn);
        }

        let width = upper.mean - lower.mean;
        let ratio = (value - lower.mean) / width;
        let mb = lower.count + (upper.count - lower.count) * ratio;

        Some(lower.cumn + (lower.count + mb) / 2.0 * ratio)
    }

    /// Gets the estimated total weight of observations less than or equal to each of the given values.
    pub fn sums(&self, values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|value| self.sum(*value)).collect()
    }

    /// Gets the estimated probability density at `value`.
    ///
    /// The density is normalized by the total count. Values outside of the recorded minimum and maximum have a density
    /// of 0, while a histogram holding a single distinct value has an infinite density at that value.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn density(&self, value: f64) -> Option<f64> {
        if self.is_empty() || value.is_nan() {
            return None;
        }

        if value < self.min || value > self.max {
            return Some(0.0);
        }

        if self.min == self.max {
            return Some(f64::INFINITY);
        }

        let index = self.cumulative_index();

        // The estimated density has a discontinuity at the mean of each bin, so average out both sides of it.
        let raw = match index.neighbors_of(value) {
            Some((before, bin, after)) => {
                let below = before.map_or(0.0, |before| interpolate_density(before, bin, value - DENSITY_EPSILON));
                let above = after.map_or(0.0, |after| interpolate_density(bin, after, value + DENSITY_EPSILON));
                (below + above) / 2.0
            }
            None => {
                let (lower, upper) = index.bracket_by_mean(value);
                interpolate_density(lower, upper, value)
            }
        };

        Some((raw / self.count).max(0.0))
    }

    /// Gets the mean of all observations.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }

        let total = self.bins().map(|bin| bin.mean * bin.count).sum::<f64>();
        Some(total / self.count)
    }

    /// Gets the variance of all observations, treating each bin as a point mass at its mean.
    ///
    /// Returns `None` if the total count is less than 2.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2.0 {
            return None;
        }

        let mean = self.mean()?;
        let total = self
            .bins()
            .map(|bin| (bin.mean - mean).powi(2) * bin.count)
            .sum::<f64>();
        Some(total / self.count)
    }

    /// Gets the standard deviation of all observations.
    ///
    /// Returns `None` if the total count is less than 2.
    pub fn std(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Gets the median of all observations.
    ///
    /// While every observation still occupies its own bin, the median is exact. Otherwise, it is estimated as the 0.5
    /// quantile.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn median(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }

        let size = self.size();
        if self.count > size as f64 {
            return self.quantile(0.5);
        }

        let index = self.cumulative_index();
        let bins = index.bins();
        let middle = &bins[size / 2];
        if size % 2 == 1 {
            return Some(middle.mean);
        }

        let preceding = &bins[size / 2 - 1];
        let combined = Bin::new(preceding.mean, preceding.count).combine(&Bin::new(middle.mean, middle.count));
        Some(combined.mean)
    }

    /// Gets the summary statistics of all observations.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn summary(&self) -> Option<Summary> {
        Some(Summary {
            count: self.count,
            mean: self.mean()?,
            std: self.std(),
            min: self.min()?,
            q1: self.quantile(0.25)?,
            q2: self.median()?,
            q3: self.quantile(0.75)?,
            max: self.max()?,
        })
    }
}

/// Interpolates the raw (unnormalized) density at `value` between two adjacent anchors.
fn interpolate_density(lower: &Anchor, upper: &Anchor, value: f64) -> f64 {
    let width = upper.mean - lower.mean;
    if width <= 0.0 {
        return 0.0;
    }

    let ratio = ((value - lower.mean) / width).clamp(0.0, 1.0);
    let mb = (upper.count - lower.count) * ratio;
    (lower.count + mb) / width
}
