//! Histogram snapshots.

use std::cell::OnceCell;

use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt as _, Snafu};

use crate::bin::Bin;
use crate::common::{float_eq, option_float_eq};
use crate::config::HistogramConfig;
use crate::sketch::Histogram;
use crate::store::BinStore;

/// Current version of the snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A snapshot error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SnapshotError {
    /// The snapshot was written with an unsupported format version.
    #[snafu(display("Unsupported snapshot version {} (expected {}).", version, SNAPSHOT_VERSION))]
    UnsupportedVersion {
        /// Version of the snapshot.
        version: u32,
    },

    /// The maximum number of bins was zero.
    #[snafu(display("Maximum bin count must be positive."))]
    InvalidMaxBins,

    /// The snapshot holds more bins than its maximum number of bins.
    #[snafu(display("Snapshot holds {} bins, but maximum bin count is {}.", bins, max_bins))]
    TooManyBins {
        /// Number of bins in the snapshot.
        bins: usize,

        /// Maximum number of bins in the snapshot.
        max_bins: usize,
    },

    /// A bin had a non-finite mean, a non-positive or non-finite count, or a negative or non-finite deviation.
    #[snafu(display("Bin at index {} is invalid.", index))]
    InvalidBin {
        /// Index of the invalid bin.
        index: usize,
    },

    /// A bin's mean was not strictly greater than the mean of the bin before it.
    #[snafu(display("Bin at index {} is out of order.", index))]
    UnorderedBins {
        /// Index of the out-of-order bin.
        index: usize,
    },

    /// The total count did not match the sum of all bin counts.
    #[snafu(display("Total count {} does not match sum of bin counts {}.", expected, actual))]
    CountMismatch {
        /// Total count recorded in the snapshot.
        expected: f64,

        /// Sum of all bin counts.
        actual: f64,
    },

    /// The minimum or maximum was missing from a non-empty snapshot.
    #[snafu(display("Snapshot holds bins but is missing its minimum or maximum."))]
    MissingExtrema,

    /// The minimum or maximum was inconsistent with the bins.
    #[snafu(display("Snapshot minimum and maximum do not enclose its bins."))]
    InvalidLimits,
}

/// A snapshot of the state of a histogram.
///
/// Snapshots hold everything needed to exactly reconstruct a histogram: its configuration, its running statistics, and
/// its bins, in ascending order of mean. The cumulative count index used by queries is not part of the snapshot, and is
/// rebuilt on the first query after restoring.
///
/// Snapshots can be serialized with `serde`. The `version` field identifies the layout of the snapshot, and restoring a
/// snapshot with a different version is rejected.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Snapshot {
    /// Version of the snapshot format.
    pub version: u32,

    /// Maximum number of bins.
    pub max_bins: usize,

    /// Whether merge costs are weighted by bin density.
    pub weighted: bool,

    /// Freeze threshold.
    pub freeze: u64,

    /// Warm-up threshold.
    pub warm_up: u64,

    /// Whether the warm-up reset has already happened.
    pub warmed_up: bool,

    /// Total weight of all observations.
    pub count: f64,

    /// Minimum value of all observations, or `None` if the histogram is empty.
    pub min: Option<f64>,

    /// Maximum value of all observations, or `None` if the histogram is empty.
    pub max: Option<f64>,

    /// Bins of the histogram, in ascending order of mean.
    pub bins: Vec<Bin>,
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.max_bins == other.max_bins
            && self.weighted == other.weighted
            && self.freeze == other.freeze
            && self.warm_up == other.warm_up
            && self.warmed_up == other.warmed_up
            && float_eq(self.count, other.count)
            && option_float_eq(self.min, other.min)
            && option_float_eq(self.max, other.max)
            && self.bins == other.bins
    }
}

impl Histogram {
    /// Takes a snapshot of the current state of the histogram.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            max_bins: self.config.max_bins,
            weighted: self.config.weighted,
            freeze: self.config.freeze,
            warm_up: self.config.warm_up,
            warmed_up: self.warmed_up,
            count: self.count,
            min: self.min(),
            max: self.max(),
            bins: self.to_array(),
        }
    }

    /// Restores a histogram from a snapshot.
    ///
    /// # Errors
    ///
    /// If the snapshot has an unsupported version, or its contents are inconsistent (unordered or invalid bins, a
    /// total count that does not match its bins, or missing extrema), an error is returned.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        ensure!(
            snapshot.version == SNAPSHOT_VERSION,
            UnsupportedVersion {
                version: snapshot.version
            }
        );
        ensure!(snapshot.max_bins > 0, InvalidMaxBins);
        ensure!(
            snapshot.bins.len() <= snapshot.max_bins,
            TooManyBins {
                bins: snapshot.bins.len(),
                max_bins: snapshot.max_bins,
            }
        );

        let mut bins = BinStore::new();
        let mut previous_mean = f64::NEG_INFINITY;
        let mut total = 0.0;
        for (index, bin) in snapshot.bins.iter().enumerate() {
            let valid = bin.mean.is_finite()
                && bin.count.is_finite()
                && bin.count > 0.0
                && bin.tss.is_finite()
                && bin.tss >= 0.0;
            ensure!(valid, InvalidBin { index });
            ensure!(bin.mean > previous_mean, UnorderedBins { index });

            previous_mean = bin.mean;
            total += bin.count;
            bins.insert(*bin);
        }

        ensure!(
            float_eq(total, snapshot.count),
            CountMismatch {
                expected: snapshot.count,
                actual: total,
            }
        );

        let (min, max) = match (bins.first(), bins.last()) {
            (Some(first), Some(last)) => {
                let min = snapshot.min.context(MissingExtrema)?;
                let max = snapshot.max.context(MissingExtrema)?;
                ensure!(min <= first.mean && max >= last.mean, InvalidLimits);
                (min, max)
            }
            _ => (f64::INFINITY, f64::NEG_INFINITY),
        };

        let config = HistogramConfig::new()
            .with_max_bins(snapshot.max_bins)
            .with_weighted(snapshot.weighted)
            .with_freeze(snapshot.freeze)
            .with_warm_up(snapshot.warm_up);

        Ok(Self {
            bins,
            config,
            count: snapshot.count,
            min,
            max,
            warmed_up: snapshot.warmed_up,
            cumulative: OnceCell::new(),
        })
    }
}

impl From<&Histogram> for Snapshot {
    fn from(histogram: &Histogram) -> Self {
        histogram.to_snapshot()
    }
}

impl TryFrom<Snapshot> for Histogram {
    type Error = SnapshotError;

    fn try_from(snapshot: Snapshot) -> Result<Self, Self::Error> {
        Histogram::from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_histogram() -> Histogram {
        let config = HistogramConfig::new().with_max_bins(5).with_weighted(true).with_warm_up(1000);
        let mut histogram = Histogram::with_config(config);
        for i in 0..50 {
            histogram.insert_weighted(f64::from(i % 17) * 1.5, f64::from(i % 3 + 1));
        }
        histogram
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let histogram = populated_histogram();

        let snapshot = histogram.to_snapshot();
        let restored = Histogram::from_snapshot(snapshot.clone()).expect("snapshot should restore");

        assert_eq!(restored.to_array(), histogram.to_array());
        assert_eq!(restored.count(), histogram.count());
        assert_eq!(restored.limits(), histogram.limits());
        assert_eq!(restored.config(), histogram.config());
        assert_eq!(restored.tss(), histogram.tss());
        assert_eq!(restored, histogram);
        assert_eq!(restored.to_snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_queries() {
        let histogram = populated_histogram();
        // Populate the cumulative index before snapshotting, to make sure it doesn't leak into the snapshot.
        let median = histogram.median();

        let restored = Histogram::try_from(Snapshot::from(&histogram)).expect("snapshot should restore");
        assert_eq!(restored.median(), median);
        assert_eq!(restored.quantiles(&[0.1, 0.9]), histogram.quantiles(&[0.1, 0.9]));
        assert_eq!(restored.density(10.0), histogram.density(10.0));
    }

    #[test]
    fn test_snapshot_roundtrip_empty() {
        let histogram = Histogram::with_config(HistogramConfig::new().with_freeze(10));

        let snapshot = histogram.to_snapshot();
        assert_eq!(snapshot.min, None);
        assert_eq!(snapshot.max, None);
        assert!(snapshot.bins.is_empty());

        let restored = Histogram::from_snapshot(snapshot).expect("snapshot should restore");
        assert!(restored.is_empty());
        assert_eq!(restored, histogram);
    }

    #[test]
    fn test_snapshot_unsupported_version() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.version = 99;

        match Histogram::from_snapshot(snapshot) {
            Err(SnapshotError::UnsupportedVersion { version }) => assert_eq!(version, 99),
            other => panic!("expected UnsupportedVersion error, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_unordered_bins() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.bins.swap(0, 1);

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::UnorderedBins { index: 1 })
        ));
    }

    #[test]
    fn test_snapshot_invalid_bin() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.bins[2].count = 0.0;

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::InvalidBin { index: 2 })
        ));
    }

    #[test]
    fn test_snapshot_count_mismatch() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.count += 1.0;

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::CountMismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_missing_extrema() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.min = None;

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::MissingExtrema)
        ));
    }

    #[test]
    fn test_snapshot_invalid_limits() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.max = Some(-1.0);

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::InvalidLimits)
        ));
    }

    #[test]
    fn test_snapshot_too_many_bins() {
        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.max_bins = 2;

        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::TooManyBins { bins: 5, max_bins: 2 })
        ));

        let mut snapshot = populated_histogram().to_snapshot();
        snapshot.max_bins = 0;
        assert!(matches!(
            Histogram::from_snapshot(snapshot),
            Err(SnapshotError::InvalidMaxBins)
        ));
    }
}
