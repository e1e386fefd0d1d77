//! A streaming approximate histogram, based on the Ben-Haim and Tom-Tov streaming parallel decision tree histogram.
#![deny(warnings)]
#![deny(missing_docs)]

mod bin;
pub use self::bin::Bin;

mod common;

mod config;
pub use self::config::{ConfigurationError, HistogramConfig, DEFAULT_MAX_BINS};

mod query;
pub use self::query::Summary;

mod sketch;
pub use self::sketch::Histogram;

mod snapshot;
pub use self::snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};

mod store;
