//! Split configuration with builder pattern.
//!
//! [`SplitConfig`] gathers every knob of a split: the target ratio, the
//! random seed, which columns are binned, and the thresholds above which the
//! balance report flags a feature. It is built with `bon` and validated when
//! [`build`](SplitConfigBuilder::build) is called.
//!
//! # Example
//!
//! ```
//! use remarque::config::{MetricThresholds, SplitConfig};
//!
//! // All defaults: 50/50, unseeded.
//! let config = SplitConfig::builder().build().unwrap();
//! assert_eq!(config.split_ratio, 0.5);
//!
//! let config = SplitConfig::builder()
//!     .split_ratio(0.2)
//!     .seed(42)
//!     .thresholds(MetricThresholds { p_value: 0.01, ..Default::default() })
//!     .build()
//!     .unwrap();
//! assert_eq!(config.seed, Some(42));
//! ```

use bon::Builder;

use crate::metrics::distribution::DEFAULT_HISTOGRAM_BINS;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Split ratio outside (0, 1).
    #[error("split_ratio must be in (0, 1), got {0}")]
    InvalidSplitRatio(f64),
    /// Percentile cut point outside (0, 1).
    #[error("percentiles must be in (0, 1), got {0}")]
    InvalidPercentile(f64),
    /// Histogram needs at least one bin.
    #[error("histogram_bins must be at least 1")]
    InvalidHistogramBins,
    /// Threshold must be non-negative and finite.
    #[error("threshold {field} must be a non-negative number, got {value}")]
    InvalidThreshold { field: &'static str, value: f64 },
}

// =============================================================================
// MetricThresholds
// =============================================================================

/// Limits above (or, for p-values, below) which a feature gets a warning.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    /// Allowed `|mean_test / mean_control - 1|`. Default: 0.1.
    pub mean_ratio: f64,
    /// Allowed `|std_test / std_control - 1|`. Default: 0.2.
    pub std_ratio: f64,
    /// Significance level for KS and chi-square tests. Default: 0.05.
    pub p_value: f64,
    /// KS statistic considered a large gap when significant. Default: 0.1.
    pub ks_statistic: f64,
    /// Allowed absolute proportion difference of any category. Default: 0.05.
    pub max_proportion_diff: f64,
    /// Allowed Jensen-Shannon divergence. Default: 0.1.
    pub js_divergence: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            mean_ratio: 0.1,
            std_ratio: 0.2,
            p_value: 0.05,
            ks_statistic: 0.1,
            max_proportion_diff: 0.05,
            js_divergence: 0.1,
        }
    }
}

impl MetricThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("mean_ratio", self.mean_ratio),
            ("std_ratio", self.std_ratio),
            ("p_value", self.p_value),
            ("ks_statistic", self.ks_statistic),
            ("max_proportion_diff", self.max_proportion_diff),
            ("js_divergence", self.js_divergence),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidThreshold { field, value });
            }
        }
        Ok(())
    }
}

// =============================================================================
// SplitConfig
// =============================================================================

/// Ratio used when none (or zero) is given.
pub const DEFAULT_SPLIT_RATIO: f64 = 0.5;

/// Configuration of a stratified split.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct SplitConfig {
    /// Fraction of users assigned to the test group. Default: 0.5.
    ///
    /// `0.0` is read as "not set" and replaced by the default.
    #[builder(default = DEFAULT_SPLIT_RATIO)]
    pub split_ratio: f64,

    /// Seed for the tie-break coin flips. `None` draws one from entropy.
    pub seed: Option<u64>,

    /// Name of the user identifier column. Default: `"user"`.
    #[builder(default = String::from("user"), into)]
    pub user_column: String,

    /// Numeric columns replaced by percentile buckets before stratification.
    #[builder(default = vec!["n_sessions".to_string(), "days_since_install".to_string()])]
    pub binnable_columns: Vec<String>,

    /// Percentile cut points for binning. `None` uses the defaults.
    pub percentiles: Option<Vec<f64>>,

    /// Number of bins of the numeric distribution histograms. Default: 30.
    #[builder(default = DEFAULT_HISTOGRAM_BINS)]
    pub histogram_bins: usize,

    /// Balance report thresholds.
    #[builder(default)]
    pub thresholds: MetricThresholds,
}

impl<S: split_config_builder::IsComplete> SplitConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is invalid:
    /// - `split_ratio` outside (0, 1) (zero means default)
    /// - a percentile outside (0, 1)
    /// - `histogram_bins == 0`
    /// - a negative or non-finite threshold
    pub fn build(self) -> Result<SplitConfig, ConfigError> {
        let mut config = self.__build_internal();
        config.split_ratio = resolve_split_ratio(Some(config.split_ratio))?;
        config.validate()?;
        Ok(config)
    }
}

impl SplitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(percentiles) = &self.percentiles {
            if let Some(&p) = percentiles.iter().find(|&&p| !(p > 0.0 && p < 1.0)) {
                return Err(ConfigError::InvalidPercentile(p));
            }
        }
        if self.histogram_bins == 0 {
            return Err(ConfigError::InvalidHistogramBins);
        }
        self.thresholds.validate()
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

/// Apply the default to an absent or zero ratio and validate the rest.
pub fn resolve_split_ratio(ratio: Option<f64>) -> Result<f64, ConfigError> {
    match ratio {
        None => Ok(DEFAULT_SPLIT_RATIO),
        Some(r) if r == 0.0 => Ok(DEFAULT_SPLIT_RATIO),
        Some(r) if r > 0.0 && r < 1.0 => Ok(r),
        Some(r) => Err(ConfigError::InvalidSplitRatio(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults() {
        let config = SplitConfig::default();
        assert_eq!(config.split_ratio, 0.5);
        assert_eq!(config.seed, None);
        assert_eq!(config.user_column, "user");
        assert_eq!(config.binnable_columns, vec!["n_sessions", "days_since_install"]);
        assert_eq!(config.histogram_bins, 30);
        assert_eq!(config.thresholds, MetricThresholds::default());
    }

    #[test]
    fn zero_ratio_means_default() {
        let config = SplitConfig::builder().split_ratio(0.0).build().unwrap();
        assert_eq!(config.split_ratio, DEFAULT_SPLIT_RATIO);
    }

    #[rstest]
    #[case(1.0)]
    #[case(-0.2)]
    #[case(1.5)]
    #[case(f64::NAN)]
    fn invalid_ratio_is_rejected(#[case] ratio: f64) {
        let err = SplitConfig::builder().split_ratio(ratio).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSplitRatio(_)));
    }

    #[test]
    fn invalid_percentile_is_rejected() {
        let err = SplitConfig::builder()
            .percentiles(vec![0.25, 1.0])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidPercentile(1.0));
    }

    #[test]
    fn zero_histogram_bins_is_rejected() {
        let err = SplitConfig::builder().histogram_bins(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidHistogramBins);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let err = SplitConfig::builder()
            .thresholds(MetricThresholds {
                js_divergence: -1.0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidThreshold {
                field: "js_divergence",
                value: -1.0
            }
        );
    }

    #[rstest]
    #[case(None, 0.5)]
    #[case(Some(0.0), 0.5)]
    #[case(Some(0.3), 0.3)]
    fn resolve_ratio(#[case] input: Option<f64>, #[case] expected: f64) {
        assert_eq!(resolve_split_ratio(input).unwrap(), expected);
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let t: MetricThresholds = serde_json::from_str(r#"{"p_value": 0.01}"#).unwrap();
        assert_eq!(t.p_value, 0.01);
        assert_eq!(t.mean_ratio, 0.1);
    }
}
