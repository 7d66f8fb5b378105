//! Percentile binning of skewed numeric columns.
//!
//! Counts such as "sessions" or "days since install" have far too many
//! distinct values to be useful stratification labels. [`binsify`] turns
//! them into a handful of ordinal buckets:
//!
//! 1. Compute the requested percentiles of the column (linear interpolation,
//!    the numpy default).
//! 2. Prepend `0.0`, drop non-positive and duplicate cut points.
//! 3. Place each value with [`search_sorted`] (`side="left"`), so bucket `i`
//!    holds values in `(edges[i-1], edges[i]]`.
//!
//! # Example
//!
//! ```
//! use remarque::data::{binsify, search_sorted};
//!
//! let values: Vec<f64> = (1..=10).map(f64::from).collect();
//! let edges = binsify(&values, None);
//! assert_eq!(edges.len(), 5);
//! assert_eq!(search_sorted(&edges, 1.0), 1);
//! assert_eq!(search_sorted(&edges, 10.0), 5);
//! ```

use super::column::Column;

/// Percentiles used when none are given.
pub const DEFAULT_PERCENTILES: [f64; 4] = [0.2, 0.4, 0.6, 0.8];

/// Below this many values the default percentiles collapse to the median.
pub const SMALL_SAMPLE_ROWS: usize = 10;

/// Compute bin edges for `values`.
///
/// Missing values (NaN) are ignored. When `percentiles` is `None`, the
/// defaults are used, or a single median cut for fewer than
/// [`SMALL_SAMPLE_ROWS`] values.
///
/// The result is strictly increasing, starts at `0.0` and always has at
/// least two edges: when every cut point collapses onto zero (constant or
/// non-positive columns), a second edge is placed above the largest value.
pub fn binsify(values: &[f64], percentiles: Option<&[f64]>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);

    let percentiles: &[f64] = match percentiles {
        Some(p) => p,
        None if sorted.len() < SMALL_SAMPLE_ROWS => &[0.5],
        None => &DEFAULT_PERCENTILES,
    };

    let mut edges = vec![0.0];
    if !sorted.is_empty() {
        let mut cuts: Vec<f64> = percentiles.iter().map(|&p| quantile(&sorted, p)).collect();
        cuts.sort_by(f64::total_cmp);
        for cut in cuts {
            if cut > *edges.last().unwrap_or(&0.0) {
                edges.push(cut);
            }
        }
    }

    if edges.len() < 2 {
        let top = sorted.last().copied().unwrap_or(0.0);
        edges.push(if top > 0.0 { top + 1.0 } else { 1.0 });
    }
    edges
}

/// Index at which `value` would be inserted into `edges` to keep it sorted,
/// placing it before equal elements (numpy `searchsorted(side="left")`).
///
/// NaN sorts after everything and yields `edges.len()`.
#[inline]
pub fn search_sorted(edges: &[f64], value: f64) -> usize {
    if value.is_nan() {
        return edges.len();
    }
    edges.partition_point(|&e| e < value)
}

/// Bin a numeric column into bucket indices.
///
/// Returns the edges and an integer column of bucket indices. String columns
/// have no numeric values and yield an all-`edges.len()` column.
pub fn bin_column(column: &Column, percentiles: Option<&[f64]>) -> (Vec<f64>, Column) {
    let values = column.to_f64();
    let edges = binsify(&values, percentiles);
    let buckets = values
        .iter()
        .map(|&v| search_sorted(&edges, v) as i64)
        .collect();
    (edges, Column::Int(buckets))
}

/// Linear-interpolated quantile of pre-sorted, non-empty data.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
