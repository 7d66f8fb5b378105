//! Shift encoded columns into disjoint value ranges.
//!
//! The stratifier flattens all of a user's feature values into one label
//! list and cannot tell value `3` of one column from value `3` of another.
//! [`offset_features`] moves every column into its own integer range so that
//! each (column, value) pair becomes a distinct label.

use super::column::Column;
use super::table::FeatureTable;
use crate::error::Result;

/// Shift applied to each column by [`offset_features`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetPlan {
    shifts: Vec<(String, i64)>,
}

impl OffsetPlan {
    /// Shift applied to `column`, `None` if the column was not offset.
    pub fn shift(&self, column: &str) -> Option<i64> {
        self.shifts
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, s)| *s)
    }

    /// Iterate over `(column, shift)` pairs in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.shifts.iter().map(|(n, s)| (n.as_str(), *s))
    }
}

/// Shift columns of `table` so that no two of them share a value.
///
/// Numeric columns are processed first, in order. The first keeps its native
/// range; each later one is moved just above the running maximum if its range
/// would overlap. Categorical columns then start just above the largest
/// numeric value (floored at zero) and each one advances the running offset
/// by its code width (`max code + 1`).
///
/// Columns with no values (all missing or an empty table) are left unshifted.
pub fn offset_features<S: AsRef<str>, T: AsRef<str>>(
    table: &FeatureTable,
    categorical: &[S],
    numeric: &[T],
) -> Result<(FeatureTable, OffsetPlan)> {
    let mut out = table.clone();
    let mut plan = OffsetPlan::default();
    let mut running_max: Option<f64> = None;

    for name in numeric {
        let name = name.as_ref();
        let column = table.require(name)?;
        let Some((lo, hi)) = column.numeric_range() else {
            plan.shifts.push((name.to_string(), 0));
            continue;
        };
        let shift = match running_max {
            Some(m) if lo <= m => (m - lo).floor() as i64 + 1,
            _ => 0,
        };
        if shift != 0 {
            out = out.with_column(name, column.shifted(shift))?;
        }
        let top = hi + shift as f64;
        running_max = Some(running_max.map_or(top, |m| m.max(top)));
        plan.shifts.push((name.to_string(), shift));
    }

    let mut offset = match running_max {
        Some(m) => (m.floor() as i64 + 1).max(0),
        None => 0,
    };

    for name in categorical {
        let name = name.as_ref();
        let column = table.require(name)?;
        let width = column
            .numeric_range()
            .map(|(_, hi)| (hi as i64 + 1).max(0))
            .unwrap_or(0);
        out = out.with_column(name, column.shifted(offset))?;
        plan.shifts.push((name.to_string(), offset));
        offset += width;
    }

    Ok((out, plan))
}
