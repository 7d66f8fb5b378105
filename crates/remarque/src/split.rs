//! End-to-end stratified split of a user table.
//!
//! [`Splitter::split`] runs the whole pipeline:
//!
//! 1. Deduplicate on the user column, keeping the last occurrence
//! 2. Classify feature columns (binnable, numeric, categorical)
//! 3. Bin the binnable columns into `{column}_bins`
//! 4. Encode categoricals and offset every stratification column
//! 5. Build per-user label lists and run [`crate::stratify::stratify`]
//! 6. Compute the balance report and distributions on the raw values
//!
//! # Example
//!
//! ```
//! use remarque::data::{Column, FeatureTable};
//! use remarque::split_via_stratification;
//!
//! let table = FeatureTable::new([
//!     ("user", Column::from_strs(["u1", "u2", "u3", "u4"])),
//!     ("brand", Column::from_strs(["Apple", "Apple", "Samsung", "Samsung"])),
//!     ("src", Column::from_strs(["Web", "Mobile", "Web", "Mobile"])),
//! ])
//! .unwrap();
//!
//! let result = split_via_stratification(&table, Some(0.5)).unwrap();
//! assert_eq!(result.users_test.len(), 2);
//! assert_eq!(result.users_control.len(), 2);
//! ```

use std::collections::{BTreeMap, HashSet};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SplitConfig;
use crate::data::{bin_column, make_encoding, offset_features, FeatureTable};
use crate::error::Result;
use crate::metrics::{get_split_metrics, prepare_distribution_data, DistributionData, FeatureMetrics};
use crate::stratify::{stratify, Partition};

// =============================================================================
// SplittingResult
// =============================================================================

/// Outcome of a split: both groups plus the balance report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplittingResult {
    /// User ids of the test group, in input order.
    pub users_test: Vec<String>,
    /// User ids of the control group, in input order.
    pub users_control: Vec<String>,
    /// Balance metrics keyed by feature name.
    pub metrics: BTreeMap<String, FeatureMetrics>,
    pub distributions: Vec<DistributionData>,
    /// Requested test ratio.
    pub split_ratio: f64,
    /// Achieved test ratio, `0.0` for an empty input.
    pub test_fraction: f64,
}

impl SplittingResult {
    pub fn n_users(&self) -> usize {
        self.users_test.len() + self.users_control.len()
    }

    /// Features with at least one balance warning.
    pub fn flagged_features(&self) -> impl Iterator<Item = &str> {
        self.metrics
            .iter()
            .filter(|(_, m)| !m.is_balanced())
            .map(|(name, _)| name.as_str())
    }
}

// =============================================================================
// Splitter
// =============================================================================

/// Column roles of a user table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    /// Numeric columns replaced by buckets for stratification.
    pub binnable: Vec<String>,
    /// Other numeric columns, stratified on their raw values.
    pub numeric: Vec<String>,
    /// String columns.
    pub categorical: Vec<String>,
}

impl ColumnRoles {
    /// Classify every column of `table` except `user_column`.
    ///
    /// A configured binnable column that is missing or not numeric is
    /// ignored (string columns stay categorical).
    pub fn classify(table: &FeatureTable, user_column: &str, binnable: &[String]) -> Self {
        let mut roles = ColumnRoles::default();
        for (name, column) in table.iter() {
            if name == user_column {
                continue;
            }
            let kind = column.column_type();
            if kind.is_categorical() {
                roles.categorical.push(name.to_string());
            } else if binnable.iter().any(|b| b == name) {
                roles.binnable.push(name.to_string());
            } else {
                roles.numeric.push(name.to_string());
            }
        }
        roles
    }

    /// Raw numeric columns reported on: binnable columns in their original
    /// units, followed by the other numeric columns.
    pub fn reported_numeric(&self) -> Vec<String> {
        self.binnable.iter().chain(&self.numeric).cloned().collect()
    }
}

/// Runs stratified splits with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Splitter {
    config: SplitConfig,
}

impl Splitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Split the users of `input` into test and control.
    ///
    /// # Errors
    ///
    /// - the user column is missing or has missing ids
    /// - stratification leaves users unassigned (no feature columns)
    ///
    /// A table without rows is an empty segment, whatever its columns.
    pub fn split(&self, input: &FeatureTable) -> Result<SplittingResult> {
        let config = &self.config;
        if input.is_empty() {
            warn!("user segment is empty, returning empty groups");
            return Ok(SplittingResult {
                split_ratio: config.split_ratio,
                ..Default::default()
            });
        }

        let prepared = self.prepare(input)?;
        if prepared.removed > 0 {
            warn!(
                removed = prepared.removed,
                "dropped duplicate users, keeping last occurrence"
            );
        }

        let mut rng = match config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::seed_from_u64(rand::random()),
        };
        let partition = stratify(&prepared.labels, &prepared.classes, config.split_ratio, &mut rng)?;

        let table = &prepared.table;
        let users = table.require(&config.user_column)?;
        let ids = |rows: &[usize]| -> Vec<String> { rows.iter().filter_map(|&r| users.label_at(r)).collect() };
        let users_test = ids(&partition.test);
        let users_control = ids(&partition.control);

        let roles = &prepared.roles;
        let reported = roles.reported_numeric();
        let metrics = get_split_metrics(
            table,
            &partition,
            &reported,
            &roles.categorical,
            &config.thresholds,
        )?;
        let distributions = prepare_distribution_data(
            table,
            &partition,
            &reported,
            &roles.categorical,
            config.histogram_bins,
        )?;

        let n_users = partition.len();
        let test_fraction = partition.test.len() as f64 / n_users as f64;
        info!(
            user_count = n_users,
            test_count = users_test.len(),
            control_count = users_control.len(),
            test_fraction,
            "data sampling completed"
        );

        Ok(SplittingResult {
            users_test,
            users_control,
            metrics,
            distributions,
            split_ratio: config.split_ratio,
            test_fraction,
        })
    }

    /// Per-user label lists of `input` as the stratifier sees them.
    ///
    /// Rows follow the deduplicated table.
    pub fn labels(&self, input: &FeatureTable) -> Result<Vec<Vec<String>>> {
        Ok(self.prepare(input)?.labels)
    }

    fn prepare(&self, input: &FeatureTable) -> Result<Prepared> {
        let config = &self.config;
        let user_column = config.user_column.as_str();

        let (table, removed) = input.dedup_keep_last(user_column)?;
        let roles = ColumnRoles::classify(&table, user_column, &config.binnable_columns);
        debug!(
            binnable = ?roles.binnable,
            numeric = ?roles.numeric,
            categorical = ?roles.categorical,
            "classified columns"
        );

        let mut working = table.clone();
        let mut numeric = Vec::with_capacity(roles.binnable.len() + roles.numeric.len());
        for name in &roles.binnable {
            let (edges, buckets) = bin_column(table.require(name)?, config.percentiles.as_deref());
            let bin_name = format!("{name}_bins");
            debug!(column = %name, ?edges, "binned column");
            working = working.with_column(bin_name.as_str(), buckets)?;
            numeric.push(bin_name);
        }
        numeric.extend(roles.numeric.iter().cloned());

        let all_cols: Vec<&str> = std::iter::once(user_column)
            .chain(numeric.iter().map(String::as_str))
            .chain(roles.categorical.iter().map(String::as_str))
            .collect();
        let encoding = make_encoding(&working, &[user_column], &all_cols, None)?;
        let (encoded, plan) = offset_features(&encoding.table, &encoding.categorical, &numeric)?;
        debug!(shifts = ?plan.iter().collect::<Vec<_>>(), "offset stratification columns");

        let label_columns: Vec<&str> = numeric
            .iter()
            .chain(&encoding.categorical)
            .map(String::as_str)
            .collect();
        let (labels, classes) = user_labels(&encoded, &label_columns)?;

        Ok(Prepared {
            table,
            removed,
            roles,
            labels,
            classes,
        })
    }
}

/// Deduplicated input and its stratification labels.
struct Prepared {
    table: FeatureTable,
    removed: usize,
    roles: ColumnRoles,
    labels: Vec<Vec<String>>,
    classes: Vec<String>,
}

/// Per-user label lists and the label universe in first-seen column order.
///
/// Missing values get a per-column label so they never collide with another
/// column's values.
fn user_labels(table: &FeatureTable, columns: &[&str]) -> Result<(Vec<Vec<String>>, Vec<String>)> {
    let resolved = columns
        .iter()
        .map(|&name| table.require(name).map(|c| (name, c)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut classes = Vec::new();
    let mut seen = HashSet::new();
    let labels = (0..table.n_rows())
        .map(|row| {
            resolved
                .iter()
                .map(|(name, column)| {
                    let label = column
                        .label_at(row)
                        .unwrap_or_else(|| format!("{name}:missing"));
                    if seen.insert(label.clone()) {
                        classes.push(label.clone());
                    }
                    label
                })
                .collect()
        })
        .collect();
    Ok((labels, classes))
}

/// Split `table` with default settings and an optional ratio.
///
/// A missing or zero ratio means 50/50.
///
/// # Errors
///
/// [`crate::config::ConfigError`] for a ratio outside (0, 1), and every
/// error of [`Splitter::split`].
pub fn split_via_stratification(table: &FeatureTable, split_ratio: Option<f64>) -> Result<SplittingResult> {
    let config = SplitConfig::builder().maybe_split_ratio(split_ratio).build()?;
    Splitter::new(config).split(table)
}

/// Resolve a result's user ids back to row positions of `table`.
pub fn partition_of(table: &FeatureTable, user_column: &str, result: &SplittingResult) -> Result<Partition> {
    Partition::from_ids(table, user_column, &result.users_test, &result.users_control)
}
