//! Balance report for a test/control split.
//!
//! [`get_split_metrics`] compares, feature by feature, the raw values of the
//! two groups and flags features whose balance looks poor:
//!
//! | Feature kind | Statistics | Warning when |
//! |--------------|------------|--------------|
//! | numeric | mean ratio, std ratio, KS | ratio off by more than the threshold, KS significant |
//! | categorical | proportions, chi-square, JS divergence | max diff, chi-square significant, JS too large |
//!
//! A statistic that cannot be computed (empty group, degenerate category
//! counts) is reported as `None` with an explanatory warning; it never fails
//! the whole report.
//!
//! The [`distribution`] module produces chart-ready histograms of the same
//! features, [`rate`] the conversion rate test used after a campaign ran.

pub mod distribution;
pub mod rate;
pub mod stats;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MetricThresholds;
use crate::data::{Column, FeatureTable};
use crate::error::Result;
use crate::stratify::Partition;

pub use distribution::{prepare_distribution_data, DistributionData};
pub use rate::{compare_conversions, poisson_rate_test, ConversionComparison, ConversionRow, RateTest};
pub use stats::{chi_square, jensen_shannon, ks_2samp, normal_cdf, Alternative, ChiSquare, KsResult};

// =============================================================================
// MetricError
// =============================================================================

/// Failure of a single statistic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("sample is empty")]
    EmptySample,

    #[error("length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),

    #[error("category {0} is observed but has zero expected count")]
    ZeroExpected(usize),

    #[error("divergence undefined: {0}")]
    Divergence(String),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

// =============================================================================
// FeatureMetrics
// =============================================================================

/// Comparison statistics of a numeric feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericMetrics {
    pub mean_ratio: Option<f64>,
    pub std_ratio: Option<f64>,
    pub ks_statistic: Option<f64>,
    pub ks_pvalue: Option<f64>,
    pub warnings: BTreeMap<String, String>,
}

/// Share of a category in each group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryProportion {
    pub test: f64,
    pub control: f64,
}

/// Comparison statistics of a categorical feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalMetrics {
    pub chi2_pvalue: Option<f64>,
    pub js_divergence: Option<f64>,
    pub max_proportion_diff: Option<f64>,
    /// `test - control` share, only for categories where it is nonzero.
    pub proportion_diffs: BTreeMap<String, f64>,
    pub proportions: BTreeMap<String, CategoryProportion>,
    pub warnings: BTreeMap<String, String>,
}

/// Per-feature entry of the balance report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureMetrics {
    Numeric(NumericMetrics),
    Categorical(CategoricalMetrics),
}

impl FeatureMetrics {
    /// Warnings keyed by the metric that raised them.
    pub fn warnings(&self) -> &BTreeMap<String, String> {
        match self {
            FeatureMetrics::Numeric(m) => &m.warnings,
            FeatureMetrics::Categorical(m) => &m.warnings,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.warnings().is_empty()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Compute balance metrics of every listed feature.
///
/// `partition` holds row positions within `table`. Missing values are
/// dropped per feature before any statistic is computed.
///
/// # Errors
///
/// Only structural errors abort: a listed column that is not in `table`.
pub fn get_split_metrics<S: AsRef<str>, T: AsRef<str>>(
    table: &FeatureTable,
    partition: &Partition,
    numeric: &[S],
    categorical: &[T],
    thresholds: &MetricThresholds,
) -> Result<BTreeMap<String, FeatureMetrics>> {
    let mut report = BTreeMap::new();

    for name in numeric {
        let name = name.as_ref();
        let column = table.require(name)?;
        let metrics = numeric_metrics(
            &numeric_values(column, &partition.test),
            &numeric_values(column, &partition.control),
            thresholds,
        );
        report.insert(name.to_string(), FeatureMetrics::Numeric(metrics));
    }

    for name in categorical {
        let name = name.as_ref();
        let column = table.require(name)?;
        let metrics = categorical_metrics(
            &labels(column, &partition.test),
            &labels(column, &partition.control),
            thresholds,
        );
        report.insert(name.to_string(), FeatureMetrics::Categorical(metrics));
    }

    let flagged = report.values().filter(|m| !m.is_balanced()).count();
    debug!(features = report.len(), flagged, "computed split metrics");
    Ok(report)
}

/// Metrics of one numeric feature from the two groups' raw values.
pub fn numeric_metrics(test: &[f64], control: &[f64], thresholds: &MetricThresholds) -> NumericMetrics {
    let mut m = NumericMetrics {
        mean_ratio: ratio(mean(test), mean(control)),
        std_ratio: ratio(std_dev(test), std_dev(control)),
        ..Default::default()
    };

    if let Some(r) = m.mean_ratio {
        if (r - 1.0).abs() > thresholds.mean_ratio {
            m.warnings.insert(
                "mean_ratio".into(),
                format!("mean differs by {:.1}%", (r - 1.0) * 100.0),
            );
        }
    }
    if let Some(r) = m.std_ratio {
        if (r - 1.0).abs() > thresholds.std_ratio {
            m.warnings.insert(
                "std_ratio".into(),
                format!("standard deviation differs by {:.1}%", (r - 1.0) * 100.0),
            );
        }
    }

    match ks_2samp(test, control, Alternative::TwoSided) {
        Ok(ks) => {
            m.ks_statistic = Some(ks.statistic);
            m.ks_pvalue = Some(ks.pvalue);
            if ks.pvalue < thresholds.p_value {
                m.warnings.insert(
                    "ks_test".into(),
                    format!("distributions differ significantly (p={:.4})", ks.pvalue),
                );
                if ks.statistic > thresholds.ks_statistic {
                    m.warnings.insert(
                        "ks_statistic".into(),
                        format!("large distribution gap (KS statistic={:.3})", ks.statistic),
                    );
                }
            }
        }
        Err(e) => {
            m.warnings
                .insert("ks_test".into(), format!("KS test unavailable: {e}"));
        }
    }

    m
}

/// Metrics of one categorical feature from the two groups' labels.
pub fn categorical_metrics(
    test: &[String],
    control: &[String],
    thresholds: &MetricThresholds,
) -> CategoricalMetrics {
    let categories: BTreeSet<&str> = test.iter().chain(control).map(String::as_str).collect();
    let test_counts = category_counts(&categories, test);
    let control_counts = category_counts(&categories, control);
    let test_props = normalize(&test_counts);
    let control_props = normalize(&control_counts);

    let mut m = CategoricalMetrics::default();
    let mut worst: Option<(&str, f64)> = None;
    for (i, &category) in categories.iter().enumerate() {
        let (t, c) = (test_props[i], control_props[i]);
        m.proportions.insert(category.to_string(), CategoryProportion { test: t, control: c });
        let diff = t - c;
        if diff != 0.0 {
            m.proportion_diffs.insert(category.to_string(), diff);
        }
        if worst.map_or(true, |(_, w)| diff.abs() > w.abs()) {
            worst = Some((category, diff));
        }
    }

    if !test.is_empty() && !control.is_empty() {
        if let Some((category, diff)) = worst {
            m.max_proportion_diff = Some(diff.abs());
            if diff.abs() > thresholds.max_proportion_diff {
                m.warnings.insert(
                    "max_proportion_diff".into(),
                    format!(
                        "category {category} differs by {:.1} percentage points",
                        diff * 100.0
                    ),
                );
            }
        }
    }

    // Control shares scaled to the test total.
    let test_total = test.len() as f64;
    let expected: Vec<f64> = control_props.iter().map(|p| p * test_total).collect();
    match chi_square(&test_counts, &expected) {
        Ok(chi) => {
            m.chi2_pvalue = Some(chi.pvalue);
            if chi.pvalue < thresholds.p_value {
                m.warnings.insert(
                    "chi_square".into(),
                    format!("category distribution differs significantly (p={:.4})", chi.pvalue),
                );
            }
        }
        Err(e) => {
            m.warnings
                .insert("chi_square".into(), format!("chi-square test unavailable: {e}"));
        }
    }

    match jensen_shannon(&test_props, &control_props) {
        Ok(js) => {
            m.js_divergence = Some(js);
            if js > thresholds.js_divergence {
                m.warnings.insert(
                    "js_divergence".into(),
                    format!("Jensen-Shannon divergence {js:.3} exceeds {}", thresholds.js_divergence),
                );
            }
        }
        Err(e) => {
            m.warnings.insert(
                "js_divergence".into(),
                format!("Jensen-Shannon divergence unavailable: {e}"),
            );
        }
    }

    m
}

// =============================================================================
// KS diff report
// =============================================================================

/// KS results of one numeric feature under every alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KsDiff {
    pub feature: String,
    pub two_sided: Option<KsResult>,
    pub less: Option<KsResult>,
    pub greater: Option<KsResult>,
}

impl KsDiff {
    pub fn get(&self, alternative: Alternative) -> Option<&KsResult> {
        match alternative {
            Alternative::TwoSided => self.two_sided.as_ref(),
            Alternative::Less => self.less.as_ref(),
            Alternative::Greater => self.greater.as_ref(),
        }
    }

    /// Number of alternatives rejected at `alpha`.
    pub fn rejections(&self, alpha: f64) -> usize {
        Alternative::ALL
            .iter()
            .filter_map(|&a| self.get(a))
            .filter(|r| r.pvalue < alpha)
            .count()
    }
}

/// Run the KS test on every numeric feature under all three alternatives.
///
/// Features whose groups are empty get `None` results.
pub fn ks_diff_report<S: AsRef<str>>(
    table: &FeatureTable,
    partition: &Partition,
    numeric: &[S],
) -> Result<Vec<KsDiff>> {
    let mut out = Vec::with_capacity(numeric.len());
    for name in numeric {
        let name = name.as_ref();
        let column = table.require(name)?;
        let test = numeric_values(column, &partition.test);
        let control = numeric_values(column, &partition.control);
        let run = |alt| ks_2samp(&test, &control, alt).ok();
        out.push(KsDiff {
            feature: name.to_string(),
            two_sided: run(Alternative::TwoSided),
            less: run(Alternative::Less),
            greater: run(Alternative::Greater),
        });
    }
    Ok(out)
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn numeric_values(column: &Column, rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&r| column.numeric_value(r)).collect()
}

pub(crate) fn labels(column: &Column, rows: &[usize]) -> Vec<String> {
    rows.iter().filter_map(|&r| column.label_at(r)).collect()
}

pub(crate) fn category_counts(categories: &BTreeSet<&str>, values: &[String]) -> Vec<f64> {
    let mut counts = vec![0.0; categories.len()];
    for v in values {
        // `categories` is a superset of `values`.
        if let Some(i) = categories.iter().position(|c| *c == v.as_str()) {
            counts[i] += 1.0;
        }
    }
    counts
}

pub(crate) fn normalize(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total == 0.0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|c| c / total).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_identical_groups_are_balanced() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let m = numeric_metrics(&values, &values, &MetricThresholds::default());
        assert_eq!(m.mean_ratio, Some(1.0));
        assert_eq!(m.std_ratio, Some(1.0));
        assert_eq!(m.ks_statistic, Some(0.0));
        assert!(m.warnings.is_empty());
    }

    #[test]
    fn numeric_shifted_groups_warn() {
        let test: Vec<f64> = (0..100).map(|i| f64::from(i) + 50.0).collect();
        let control: Vec<f64> = (0..100).map(f64::from).collect();
        let m = numeric_metrics(&test, &control, &MetricThresholds::default());
        assert!(m.mean_ratio.unwrap() > 1.1);
        assert!(m.warnings.contains_key("mean_ratio"));
        assert!(m.warnings.contains_key("ks_test"));
        assert!(m.warnings.contains_key("ks_statistic"));
        assert!(!m.warnings.contains_key("std_ratio"));
    }

    #[test]
    fn numeric_zero_denominators_give_none() {
        let m = numeric_metrics(&[1.0, 2.0], &[0.0, 0.0], &MetricThresholds::default());
        assert_eq!(m.mean_ratio, None);
        assert_eq!(m.std_ratio, None);
    }

    #[test]
    fn numeric_empty_group() {
        let m = numeric_metrics(&[1.0, 2.0], &[], &MetricThresholds::default());
        assert_eq!(m.mean_ratio, None);
        assert_eq!(m.ks_pvalue, None);
        assert!(m.warnings["ks_test"].contains("unavailable"));
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        assert_abs_diff_eq!(std_dev(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 1.290_994_448_7, epsilon = 1e-9);
        assert_eq!(std_dev(&[1.0]), None);
    }

    #[test]
    fn categorical_identical_groups_are_balanced() {
        let values = strings(&["a", "a", "b", "c"]);
        let m = categorical_metrics(&values, &values, &MetricThresholds::default());
        assert_eq!(m.max_proportion_diff, Some(0.0));
        assert!(m.proportion_diffs.is_empty());
        assert_abs_diff_eq!(m.chi2_pvalue.unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.js_divergence.unwrap(), 0.0, epsilon = 1e-12);
        assert!(m.warnings.is_empty());
        assert_eq!(m.proportions["a"], CategoryProportion { test: 0.5, control: 0.5 });
    }

    #[test]
    fn categorical_union_fills_zero_shares() {
        let m = categorical_metrics(
            &strings(&["a", "b"]),
            &strings(&["a", "c"]),
            &MetricThresholds::default(),
        );
        assert_eq!(m.proportions["c"].test, 0.0);
        assert_eq!(m.proportions["b"].control, 0.0);
        assert_eq!(m.proportion_diffs.len(), 2);
        assert!(!m.proportion_diffs.contains_key("a"));
        assert_abs_diff_eq!(m.max_proportion_diff.unwrap(), 0.5);
        // "b" is observed in test but absent from control.
        assert_eq!(m.chi2_pvalue, None);
        assert!(m.warnings["chi_square"].contains("unavailable"));
    }

    #[test]
    fn categorical_empty_group_degrades_gracefully() {
        let m = categorical_metrics(&strings(&["a"]), &[], &MetricThresholds::default());
        assert_eq!(m.max_proportion_diff, None);
        assert_eq!(m.js_divergence, None);
        assert!(m.warnings.contains_key("js_divergence"));
        assert!(m.warnings.contains_key("chi_square"));
    }

    #[test]
    fn report_covers_listed_features() {
        let table = FeatureTable::new([
            ("user", Column::from_strs(["u1", "u2", "u3", "u4"])),
            ("brand", Column::from_strs(["a", "b", "a", "b"])),
            ("age", Column::Int(vec![20, 30, 21, 31])),
        ])
        .unwrap();
        let partition = Partition {
            test: vec![0, 1],
            control: vec![2, 3],
        };
        let report = get_split_metrics(
            &table,
            &partition,
            &["age"],
            &["brand"],
            &MetricThresholds::default(),
        )
        .unwrap();
        assert_eq!(report.len(), 2);
        assert!(matches!(report["age"], FeatureMetrics::Numeric(_)));
        assert!(report["brand"].is_balanced());
    }

    #[test]
    fn report_rejects_unknown_column() {
        let table = FeatureTable::new([("user", Column::from_strs(["u1"]))]).unwrap();
        let partition = Partition::default();
        let result = get_split_metrics(
            &table,
            &partition,
            &["nope"],
            &[] as &[&str],
            &MetricThresholds::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn ks_diff_runs_all_alternatives() {
        let table = FeatureTable::new([(
            "x",
            Column::Float((0..20).map(f64::from).collect()),
        )])
        .unwrap();
        let partition = Partition {
            test: (0..10).collect(),
            control: (10..20).collect(),
        };
        let diffs = ks_diff_report(&table, &partition, &["x"]).unwrap();
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert_eq!(d.two_sided.unwrap().statistic, 1.0);
        assert_eq!(d.greater.unwrap().statistic, 1.0);
        assert_eq!(d.less.unwrap().statistic, 0.0);
        assert_eq!(d.rejections(0.05), 2);
    }
}
