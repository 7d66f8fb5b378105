//! remarque: stratified test/control splitting for audience experiments.
//!
//! Given one row per user with categorical and numeric behavioral features,
//! remarque assigns every user to a test or control group at a target ratio
//! while keeping each feature's value distribution as similar as possible
//! across the two groups, then reports how balanced the split turned out.
//!
//! # Key Types
//!
//! - [`FeatureTable`] / [`Column`] - typed, row-per-user input
//! - [`SplitConfig`] - configuration builder
//! - [`Splitter`] / [`split_via_stratification`] - the pipeline entry points
//! - [`SplittingResult`] - both groups, per-feature [`FeatureMetrics`] and
//!   [`DistributionData`]
//!
//! # Pipeline
//!
//! Binning, encoding and offsetting live in [`data`], the greedy multi-label
//! assignment in [`stratify`], and the balance report in [`metrics`].
//!
//! # Example
//!
//! ```
//! use remarque::testing::synthetic_users;
//! use remarque::{SplitConfig, Splitter};
//!
//! let users = synthetic_users(400, 1);
//! let splitter = Splitter::new(SplitConfig::builder().split_ratio(0.3).seed(7).build().unwrap());
//! let result = splitter.split(&users).unwrap();
//!
//! assert_eq!(result.n_users(), 400);
//! assert!((result.test_fraction - 0.3).abs() < 0.05);
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod split;
pub mod stratify;
pub mod testing;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use config::{ConfigError, MetricThresholds, SplitConfig};
pub use data::{Column, ColumnType, FeatureTable, TableError};
pub use error::{Result, SplitError};
pub use metrics::{
    get_split_metrics, poisson_rate_test, prepare_distribution_data, DistributionData,
    FeatureMetrics, MetricError, RateTest,
};
pub use split::{split_via_stratification, Splitter, SplittingResult};
pub use stratify::{stratify, Partition};
