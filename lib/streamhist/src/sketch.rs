//! Streaming histogram implementation.

use std::cell::OnceCell;

use tracing::{debug, trace};

use crate::bin::{merge_cost, Bin};
use crate::common::{float_eq, option_float_eq};
use crate::config::{validate_max_bins, HistogramConfig};
use crate::query::CumulativeIndex;
use crate::store::BinStore;

/// A streaming approximate histogram.
///
/// The histogram summarizes an unbounded stream of observations with a small, bounded number of weighted bins. Each
/// new observation either lands in an existing bin with the exact same mean, or creates a new bin, after which the two
/// adjacent bins with the lowest merge cost are combined until the number of bins is back within the configured limit.
///
/// From the bins, the histogram can estimate quantiles, the cumulative count below a value, the probability density at
/// a value, as well as simple summary statistics, all without retaining the original observations.
///
/// Two additional policies can be configured:
///
/// - **freeze**: once the total count exceeds the freeze threshold, and the histogram is at capacity, new observations
///   are folded into their nearest bin without moving its mean, avoiding the compression step entirely
/// - **warm-up**: once the total count reaches the warm-up threshold, the count of every bin is reset to 1 (and its
///   deviation to zero), keeping the shape learned during warm-up while discarding its volume
///
/// # Concurrency
///
/// Queries lazily compute a cumulative count index, cached behind a `OnceCell`, so `Histogram` is `Send` but not
/// `Sync`. Concurrent writers must be serialized by the caller.
///
/// # Example
///
/// ```
/// use streamhist::Histogram;
///
/// let mut histogram = Histogram::new();
/// for i in 0..15 {
///     histogram.insert(f64::from(i));
/// }
///
/// assert_eq!(histogram.median(), Some(7.0));
/// assert_eq!(histogram.quantile(0.0), Some(0.0));
/// assert_eq!(histogram.quantile(1.0), Some(14.0));
/// ```
#[derive(Clone, Debug)]
pub struct Histogram {
    /// The bins within the histogram.
    pub(crate) bins: BinStore,

    /// Configuration of the histogram.
    pub(crate) config: HistogramConfig,

    /// The total weight of all observations within the histogram.
    pub(crate) count: f64,

    /// The minimum value of all observations within the histogram.
    pub(crate) min: f64,

    /// The maximum value of all observations within the histogram.
    pub(crate) max: f64,

    /// Whether or not the warm-up reset has already happened.
    pub(crate) warmed_up: bool,

    /// Cumulative count index over the bins.
    ///
    /// Empty when stale: every mutation clears it, and queries rebuild it on demand.
    pub(crate) cumulative: OnceCell<CumulativeIndex>,
}

impl Histogram {
    /// Creates a new `Histogram` with the default configuration.
    pub fn new() -> Self {
        Self::with_config(HistogramConfig::default())
    }

    /// Creates a new `Histogram` with the given configuration.
    pub fn with_config(config: HistogramConfig) -> Self {
        Self {
            bins: BinStore::new(),
            config: config.validated(),
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            warmed_up: false,
            cumulative: OnceCell::new(),
        }
    }

    /// Returns the configuration of the histogram.
    pub fn config(&self) -> HistogramConfig {
        self.config
    }

    /// Returns the maximum number of bins.
    pub fn max_bins(&self) -> usize {
        self.config.max_bins
    }

    /// Returns whether merge costs are weighted by bin density.
    pub fn weighted(&self) -> bool {
        self.config.weighted
    }

    /// Returns the freeze threshold.
    pub fn freeze(&self) -> u64 {
        self.config.freeze
    }

    /// Returns the warm-up threshold.
    pub fn warm_up(&self) -> u64 {
        self.config.warm_up
    }

    /// Sets the maximum number of bins.
    ///
    /// If the histogram currently holds more bins than the new maximum, bins are combined immediately until it fits. A
    /// value of zero is replaced by the default.
    pub fn set_max_bins(&mut self, max_bins: usize) -> &mut Self {
        self.config.max_bins = validate_max_bins(max_bins);
        if self.bins.len() > self.config.max_bins {
            debug!(
                bins = self.bins.len(),
                max_bins = self.config.max_bins,
                "Compressing histogram to new maximum bin count."
            );
            self.compress();
        }
        self
    }

    /// Sets whether merge costs are weighted by bin density.
    pub fn set_weighted(&mut self, weighted: bool) -> &mut Self {
        self.config.weighted = weighted;
        self
    }

    /// Sets the freeze threshold, or 0 to disable freezing.
    pub fn set_freeze(&mut self, freeze: u64) -> &mut Self {
        self.config.freeze = freeze;
        self
    }

    /// Sets the warm-up threshold, or 0 to disable warm-up.
    pub fn set_warm_up(&mut self, warm_up: u64) -> &mut Self {
        self.config.warm_up = warm_up;
        self
    }

    /// Returns the number of bins in the histogram.
    pub fn size(&self) -> usize {
        self.bins.len()
    }

    /// Whether or not this histogram is empty.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Total weight of all observations within the histogram.
    pub fn count(&self) -> f64 {
        self.count
    }

    /// Minimum value seen by this histogram.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn min(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.min)
        }
    }

    /// Maximum value seen by this histogram.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn max(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.max)
        }
    }

    /// Minimum and maximum values seen by this histogram.
    ///
    /// Returns `None` if the histogram is empty.
    pub fn limits(&self) -> Option<(f64, f64)> {
        self.min().zip(self.max())
    }

    /// Total sum of squared deviations tracked across all bins.
    pub fn tss(&self) -> f64 {
        self.bins.iter().map(Bin::tss).sum()
    }

    /// Whether or not bin positions are currently locked.
    ///
    /// A histogram is frozen once its total count exceeds a non-zero freeze threshold.
    pub fn is_frozen(&self) -> bool {
        self.config.freeze > 0 && self.count > self.config.freeze as f64
    }

    /// Iterates over the bins of the histogram, in ascending order of mean.
    pub fn bins(&self) -> impl DoubleEndedIterator<Item = &Bin> + ExactSizeIterator {
        self.bins.iter()
    }

    /// Returns a copy of the bins of the histogram, in ascending order of mean.
    pub fn to_array(&self) -> Vec<Bin> {
        self.bins.iter().copied().collect()
    }

    /// Finds the bin whose mean is closest to `value`.
    ///
    /// When two bins are equally distant from `value`, the bin with the larger mean is returned.
    pub fn find_nearest(&self, value: f64) -> Option<Bin> {
        self.bins.nearest(value).copied()
    }

    /// Clears the histogram, removing all bins and resetting all statistics.
    ///
    /// The configuration of the histogram is kept.
    pub fn reset(&mut self) -> &mut Self {
        self.bins.clear();
        self.count = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.warmed_up = false;
        self.invalidate();
        self
    }

    /// Inserts a single value into the histogram.
    pub fn insert(&mut self, value: f64) -> &mut Self {
        self.insert_weighted(value, 1.0)
    }

    /// Inserts many values into the histogram.
    pub fn insert_many(&mut self, values: &[f64]) -> &mut Self {
        for value in values {
            self.insert_weighted(*value, 1.0);
        }
        self
    }

    /// Inserts a single value into the histogram with the given weight.
    ///
    /// Non-finite values, as well as non-positive or non-finite weights, are ignored.
    pub fn insert_weighted(&mut self, value: f64, weight: f64) -> &mut Self {
        if !value.is_finite() || !weight.is_finite() || weight <= 0.0 {
            trace!(value, weight, "Ignoring invalid observation.");
            return self;
        }

        self.invalidate();

        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }

        let previous_count = self.count;
        self.count += weight;

        let at_capacity = self.bins.len() >= self.config.max_bins;
        let target = match self.bins.nearest(value) {
            Some(nearest) if nearest.mean == value || (at_capacity && self.is_frozen()) => Some(nearest.mean),
            _ => None,
        };

        match target.and_then(|mean| self.bins.get_mut(mean)) {
            Some(bin) => bin.count += weight,
            None => {
                self.bins.insert(Bin::new(value, weight));
                self.compress();
            }
        }

        self.maybe_warm_up(previous_count);
        self
    }

    /// Merges another histogram into this histogram.
    ///
    /// The maximum number of bins becomes the smaller of the two histograms' maximums, even when `other` is empty.
    pub fn merge(&mut self, other: &Histogram) -> &mut Self {
        self.merge_inner(other, None)
    }

    /// Merges another histogram into this histogram, with an explicit maximum number of bins.
    ///
    /// The resulting maximum is capped to the sum of both histograms' maximums. A value of zero is replaced by the
    /// default.
    pub fn merge_with_max_bins(&mut self, other: &Histogram, max_bins: usize) -> &mut Self {
        self.merge_inner(other, Some(validate_max_bins(max_bins)))
    }

    fn merge_inner(&mut self, other: &Histogram, max_bins: Option<usize>) -> &mut Self {
        self.invalidate();

        let combined_limit = self.config.max_bins + other.config.max_bins;
        let requested = max_bins.unwrap_or_else(|| self.config.max_bins.min(other.config.max_bins));
        self.config.max_bins = requested.min(combined_limit);

        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        for bin in other.bins.iter() {
            self.bins.insert(*bin);
        }

        debug!(
            bins = self.bins.len(),
            max_bins = self.config.max_bins,
            count = self.count,
            "Merged histogram bins."
        );

        self.compress();
        self
    }

    /// Combines adjacent bins until the histogram holds no more than the maximum number of bins.
    fn compress(&mut self) {
        let weighted = self.config.weighted;
        while self.bins.len() > self.config.max_bins {
            let Some((lower, upper)) = self
                .bins
                .cheapest_adjacent_pair(|lower, upper| merge_cost(lower, upper, weighted))
            else {
                break;
            };

            let (Some(lower), Some(upper)) = (self.bins.remove(lower), self.bins.remove(upper)) else {
                break;
            };

            let combined = lower.combine(&upper);
            trace!(
                lower = lower.mean,
                upper = upper.mean,
                combined = combined.mean,
                "Combined adjacent bins."
            );
            self.bins.insert(combined);
        }

        self.invalidate();
    }

    /// Resets all bin counts to 1 the first time the total count reaches the warm-up threshold.
    ///
    /// The running count is reset to the new total weight of the bins.
    fn maybe_warm_up(&mut self, previous_count: f64) {
        let threshold = self.config.warm_up as f64;
        if self.config.warm_up == 0 || self.warmed_up || previous_count >= threshold || self.count < threshold {
            return;
        }

        for bin in self.bins.iter_mut() {
            bin.count = 1.0;
            bin.tss = 0.0;
        }

        self.warmed_up = true;
        self.count = self.bins.len() as f64;
        self.invalidate();

        debug!(
            warm_up = self.config.warm_up,
            bins = self.bins.len(),
            "Histogram warm-up complete, reset bin counts."
        );
    }

    /// Marks the cumulative count index as stale.
    pub(crate) fn invalidate(&mut self) {
        self.cumulative.take();
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        // The cumulative index is derived state, so it's ignored. Scalars use relative comparisons, as merging the same
        // data in a different order can produce last-bit differences.
        self.config == other.config
            && self.warmed_up == other.warmed_up
            && float_eq(self.count, other.count)
            && option_float_eq(self.min(), other.min())
            && option_float_eq(self.max(), other.max())
            && self.bins.len() == other.bins.len()
            && self.bins.iter().zip(other.bins.iter()).all(|(a, b)| {
                float_eq(a.mean, b.mean) && float_eq(a.count, b.count) && float_eq(a.tss, b.tss)
            })
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
