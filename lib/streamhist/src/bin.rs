//! Histogram bin representation.

use std::f64::consts::E;

use serde::{Deserialize, Serialize};

/// A histogram bin.
///
/// A bin is a weighted point mass standing in for a cluster of observations: every observation absorbed into the bin
/// is treated as if it sat exactly at the bin's mean.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Bin {
    /// The centroid of the observations within the bin.
    pub(crate) mean: f64,

    /// The total weight of the observations within the bin.
    pub(crate) count: f64,

    /// The total sum of squared deviations from `mean` of the observations merged into the bin.
    pub(crate) tss: f64,
}

impl Bin {
    /// Creates a new bin holding a single observation of the given weight.
    pub fn new(mean: f64, count: f64) -> Self {
        Self { mean, count, tss: 0.0 }
    }

    /// Returns the mean of the bin.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the total weight of the bin.
    pub fn count(&self) -> f64 {
        self.count
    }

    /// Returns the total sum of squared deviations tracked by the bin.
    pub fn tss(&self) -> f64 {
        self.tss
    }

    /// Combines two bins into a single bin.
    ///
    /// The combined first and second moments of both bins are preserved exactly, under the assumption that each bin is
    /// a point mass at its mean.
    pub fn combine(&self, other: &Bin) -> Bin {
        let count = self.count + other.count;
        let mean = (self.mean * self.count + other.mean * other.count) / count;
        let tss = self.tss
            + other.tss
            + (self.mean - mean).powi(2) * self.count
            + (other.mean - mean).powi(2) * other.count;

        Bin { mean, count, tss }
    }

    /// Absorbs the weight and deviation of `other`, without moving the mean of this bin.
    pub(crate) fn absorb(&mut self, other: &Bin) {
        self.count += other.count;
        self.tss += other.tss;
    }
}

/// Calculates the cost of combining two adjacent bins, where `lower` precedes `upper` in mean order.
///
/// The base cost is the squared gap between the two means. When `weighted` is set, the gap is additionally scaled by
/// `ln(e + min(lower.count, upper.count))`, which makes combining two dense bins more expensive than combining bins in
/// the sparse tails of the distribution.
pub(crate) fn merge_cost(lower: &Bin, upper: &Bin, weighted: bool) -> f64 {
    let gap = upper.mean - lower.mean;
    let cost = gap * gap;
    if weighted {
        cost * (E + lower.count.min(upper.count)).ln()
    } else {
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::float_eq;

    #[test]
    fn test_combine_preserves_moments() {
        let a = Bin::new(1.0, 1.0);
        let b = Bin::new(3.0, 3.0);

        let combined = a.combine(&b);
        assert_eq!(combined.count(), 4.0);
        assert!(float_eq(combined.mean(), 2.5));
        // 1 * (1 - 2.5)^2 + 3 * (3 - 2.5)^2
        assert!(float_eq(combined.tss(), 3.0));
    }

    #[test]
    fn test_combine_accumulates_existing_tss() {
        let a = Bin {
            mean: 0.0,
            count: 2.0,
            tss: 1.5,
        };
        let b = Bin {
            mean: 0.0,
            count: 2.0,
            tss: 0.5,
        };

        let combined = a.combine(&b);
        assert_eq!(combined.mean(), 0.0);
        assert_eq!(combined.count(), 4.0);
        assert!(float_eq(combined.tss(), 2.0));
    }

    #[test]
    fn test_combine_is_symmetric() {
        let a = Bin::new(-4.0, 2.0);
        let b = Bin::new(6.0, 5.0);

        let ab = a.combine(&b);
        let ba = b.combine(&a);
        assert!(float_eq(ab.mean(), ba.mean()));
        assert!(float_eq(ab.tss(), ba.tss()));
        assert_eq!(ab.count(), ba.count());
    }

    #[test]
    fn test_absorb_keeps_mean() {
        let mut a = Bin::new(5.0, 1.0);
        a.absorb(&Bin {
            mean: 7.0,
            count: 2.0,
            tss: 0.25,
        });

        assert_eq!(a.mean(), 5.0);
        assert_eq!(a.count(), 3.0);
        assert_eq!(a.tss(), 0.25);
    }

    #[test]
    fn test_merge_cost() {
        let a = Bin::new(1.0, 1.0);
        let b = Bin::new(4.0, 10.0);

        assert_eq!(merge_cost(&a, &b, false), 9.0);
        assert!(float_eq(merge_cost(&a, &b, true), 9.0 * (E + 1.0).ln()));
    }

    #[test]
    fn test_weighted_cost_penalizes_dense_bins() {
        let sparse = (Bin::new(0.0, 1.0), Bin::new(1.0, 1.0));
        let dense = (Bin::new(10.0, 100.0), Bin::new(11.0, 100.0));

        assert_eq!(merge_cost(&sparse.0, &sparse.1, false), merge_cost(&dense.0, &dense.1, false));
        assert!(merge_cost(&sparse.0, &sparse.1, true) < merge_cost(&dense.0, &dense.1, true));
    }
}
