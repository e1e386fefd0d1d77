//! Histogram configuration.

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use snafu::{ensure, IntoError as _, Snafu};
use tracing::warn;

/// Default maximum number of bins per histogram.
pub const DEFAULT_MAX_BINS: usize = 100;

const fn default_max_bins() -> usize {
    DEFAULT_MAX_BINS
}

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// A field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load histogram configuration."))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::InvalidType(actual_ty, expected_ty) => InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            }
            .build(),
            _ => Generic.into_error(e),
        }
    }
}

/// Histogram configuration.
///
/// All fields are optional when deserializing, and fall back to their defaults:
///
/// - `max_bins`: maximum number of bins kept by the histogram (default: 100)
/// - `weighted`: whether to scale merge costs by bin density, keeping more bins in dense regions (default: `false`)
/// - `freeze`: total count past which bin positions are locked in place, or 0 to disable (default: 0)
/// - `warm_up`: total count at which all bin counts are reset to 1, or 0 to disable (default: 0)
///
/// A `max_bins` of zero is not a valid configuration, and is replaced by the default when the configuration is
/// applied to a histogram.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HistogramConfig {
    #[serde(default = "default_max_bins")]
    pub(crate) max_bins: usize,

    #[serde(default)]
    pub(crate) weighted: bool,

    #[serde(default)]
    pub(crate) freeze: u64,

    #[serde(default)]
    pub(crate) warm_up: u64,
}

impl HistogramConfig {
    /// Creates a new `HistogramConfig` with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from environment variables with the given prefix.
    ///
    /// Each field is read from the variable `<PREFIX>_<FIELD>`, such as `STREAMHIST_MAX_BINS` for a prefix of
    /// `STREAMHIST`. Fields without a matching variable use their default value.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or if any variable cannot be parsed as the type of its field, an error is returned.
    pub fn from_environment(prefix: &str) -> Result<Self, ConfigurationError> {
        ensure!(!prefix.is_empty(), EmptyPrefix);

        let prefix = if prefix.ends_with('_') {
            prefix.to_string()
        } else {
            format!("{}_", prefix)
        };

        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(&prefix)))
    }

    /// Extracts the configuration from an existing `Figment`.
    ///
    /// # Errors
    ///
    /// If the configuration data cannot be deserialized as `HistogramConfig`, an error is returned.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigurationError> {
        let config: HistogramConfig = figment.extract()?;
        Ok(config.validated())
    }

    /// Sets the maximum number of bins.
    ///
    /// A value of zero is replaced by the default.
    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.max_bins = max_bins;
        self.validated()
    }

    /// Sets whether merge costs are weighted by bin density.
    pub fn with_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Sets the freeze threshold, or 0 to disable freezing.
    pub fn with_freeze(mut self, freeze: u64) -> Self {
        self.freeze = freeze;
        self
    }

    /// Sets the warm-up threshold, or 0 to disable warm-up.
    pub fn with_warm_up(mut self, warm_up: u64) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Returns the maximum number of bins.
    pub fn max_bins(&self) -> usize {
        self.max_bins
    }

    /// Returns whether merge costs are weighted by bin density.
    pub fn weighted(&self) -> bool {
        self.weighted
    }

    /// Returns the freeze threshold.
    pub fn freeze(&self) -> u64 {
        self.freeze
    }

    /// Returns the warm-up threshold.
    pub fn warm_up(&self) -> u64 {
        self.warm_up
    }

    pub(crate) fn validated(mut self) -> Self {
        self.max_bins = validate_max_bins(self.max_bins);
        self
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            max_bins: DEFAULT_MAX_BINS,
            weighted: false,
            freeze: 0,
            warm_up: 0,
        }
    }
}

pub(crate) fn validate_max_bins(max_bins: usize) -> usize {
    if max_bins == 0 {
        warn!(default = DEFAULT_MAX_BINS, "Maximum bin count must be positive. Falling back to default.");
        DEFAULT_MAX_BINS
    } else {
        max_bins
    }
}
