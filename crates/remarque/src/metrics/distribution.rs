//! Chart-ready distributions of the two groups.
//!
//! Numeric features become density histograms over a shared bin grid,
//! categorical features normalized frequencies over a shared category list.
//! Nothing here is tested statistically; see [`super::get_split_metrics`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{category_counts, labels, normalize, numeric_values};
use crate::data::FeatureTable;
use crate::error::Result;
use crate::stratify::Partition;

/// Default number of histogram bins.
pub const DEFAULT_HISTOGRAM_BINS: usize = 30;

/// Distribution of one feature in both groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionData {
    Numeric {
        feature: String,
        /// `n_bins + 1` edges, empty when neither group has a value.
        bin_edges: Vec<f64>,
        bin_labels: Vec<String>,
        /// Histogram densities (integrate to 1 over the bin grid).
        test: Vec<f64>,
        control: Vec<f64>,
    },
    Categorical {
        feature: String,
        categories: Vec<String>,
        /// Frequencies summing to 1, aligned with `categories`.
        test: Vec<f64>,
        control: Vec<f64>,
    },
}

impl DistributionData {
    pub fn feature(&self) -> &str {
        match self {
            DistributionData::Numeric { feature, .. } | DistributionData::Categorical { feature, .. } => {
                feature
            }
        }
    }
}

/// Distribution summaries of every listed feature, numeric first.
///
/// # Errors
///
/// A listed column that is not in `table`.
pub fn prepare_distribution_data<S: AsRef<str>, T: AsRef<str>>(
    table: &FeatureTable,
    partition: &Partition,
    numeric: &[S],
    categorical: &[T],
    n_bins: usize,
) -> Result<Vec<DistributionData>> {
    let n_bins = n_bins.max(1);
    let mut out = Vec::with_capacity(numeric.len() + categorical.len());

    for name in numeric {
        let name = name.as_ref();
        let column = table.require(name)?;
        let test = numeric_values(column, &partition.test);
        let control = numeric_values(column, &partition.control);

        let (bin_edges, test_density, control_density) = match union_range(&test, &control) {
            Some((lo, hi)) => {
                let edges = uniform_edges(lo, hi, n_bins);
                let t = density(&test, &edges);
                let c = density(&control, &edges);
                (edges, t, c)
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        };
        out.push(DistributionData::Numeric {
            feature: name.to_string(),
            bin_labels: bin_labels(&bin_edges),
            bin_edges,
            test: test_density,
            control: control_density,
        });
    }

    for name in categorical {
        let name = name.as_ref();
        let column = table.require(name)?;
        let test = labels(column, &partition.test);
        let control = labels(column, &partition.control);
        let categories: BTreeSet<&str> = test.iter().chain(&control).map(String::as_str).collect();

        out.push(DistributionData::Categorical {
            feature: name.to_string(),
            test: normalize(&category_counts(&categories, &test)),
            control: normalize(&category_counts(&categories, &control)),
            categories: categories.into_iter().map(str::to_string).collect(),
        });
    }

    Ok(out)
}

fn union_range(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    let mut values = a.iter().chain(b).copied();
    let first = values.next()?;
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo == hi {
        Some((lo - 0.5, hi + 0.5))
    } else {
        Some((lo, hi))
    }
}

fn uniform_edges(lo: f64, hi: f64, n_bins: usize) -> Vec<f64> {
    let width = (hi - lo) / n_bins as f64;
    (0..=n_bins)
        .map(|i| if i == n_bins { hi } else { lo + i as f64 * width })
        .collect()
}

/// Histogram density over `edges`; the last bin is closed on the right.
fn density(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let n_bins = edges.len() - 1;
    let mut counts = vec![0.0; n_bins];
    let (lo, hi) = (edges[0], edges[n_bins]);
    let width = (hi - lo) / n_bins as f64;
    for &v in values {
        if v < lo || v > hi {
            continue;
        }
        let bin = (((v - lo) / width) as usize).min(n_bins - 1);
        counts[bin] += 1.0;
    }
    let total = values.len() as f64;
    if total == 0.0 {
        return counts;
    }
    counts
        .iter()
        .zip(edges.windows(2))
        .map(|(c, w)| c / (total * (w[1] - w[0])))
        .collect()
}

/// `"0-{e1}"`, `"{lo}-{hi}"`, ..., `"≥{lo_last}"`.
fn bin_labels(edges: &[f64]) -> Vec<String> {
    let n_bins = edges.len().saturating_sub(1);
    (0..n_bins)
        .map(|i| {
            if i == 0 {
                format!("0-{}", format_edge(edges[1]))
            } else if i == n_bins - 1 {
                format!("≥{}", format_edge(edges[i]))
            } else {
                format!("{}-{}", format_edge(edges[i]), format_edge(edges[i + 1]))
            }
        })
        .collect()
}

fn format_edge(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{x:.0}")
    } else {
        format!("{x:.2}")
    }
}
