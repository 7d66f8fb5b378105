//! Ordinal encoding of categorical columns.
//!
//! Categorical (string) columns are mapped to small non-negative integers,
//! one code per distinct value, so that the stratifier can treat every
//! feature value as an integer label. Numeric columns pass through unchanged,
//! except for nullable integers which are widened to floats with missing
//! values replaced by [`MISSING_INT_SENTINEL`].
//!
//! # Example
//!
//! ```
//! use remarque::data::{make_encoding, Column, FeatureTable};
//!
//! let table = FeatureTable::new([
//!     ("user", Column::from_strs(["u1", "u2", "u3"])),
//!     ("brand", Column::from_strs(["Samsung", "Apple", "Samsung"])),
//!     ("age", Column::Int(vec![25, 30, 35])),
//! ])
//! .unwrap();
//!
//! let enc = make_encoding(&table, &["user"], &["user", "brand", "age"], None).unwrap();
//! assert_eq!(enc.categorical, vec!["brand"]);
//! assert_eq!(enc.table.column("brand"), Some(&Column::Int(vec![1, 0, 1])));
//! ```

use tracing::debug;

use super::column::Column;
use super::table::FeatureTable;
use crate::error::{EncodingError, Result, SplitError};

/// Code assigned to values the encoder did not see while fitting.
pub const UNKNOWN_CATEGORY: i64 = -99;

/// Replacement for missing values in nullable integer columns.
pub const MISSING_INT_SENTINEL: f64 = -999.0;

// =============================================================================
// OrdinalEncoder
// =============================================================================

/// Per-column ordinal encoder.
///
/// Categories are sorted lexicographically; a missing value is a category of
/// its own, sorted after every present value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrdinalEncoder {
    columns: Vec<(String, Vec<Option<String>>)>,
}

impl OrdinalEncoder {
    /// Fit categories for `columns` of `table`.
    pub fn fit<S: AsRef<str>>(table: &FeatureTable, columns: &[S]) -> Result<Self> {
        let mut fitted = Vec::with_capacity(columns.len());
        for name in columns {
            let name = name.as_ref();
            let values = string_column(table, name)?;
            let mut categories: Vec<Option<String>> = values.to_vec();
            // `None` sorts first for `Option`; move it to the end afterwards.
            categories.sort_unstable();
            categories.dedup();
            if categories.first().is_some_and(Option::is_none) {
                categories.rotate_left(1);
            }
            fitted.push((name.to_string(), categories));
        }
        Ok(Self { columns: fitted })
    }

    /// Names of the fitted columns, in fit order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Learned categories of `column`.
    pub fn categories(&self, column: &str) -> Option<&[Option<String>]> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cats)| cats.as_slice())
    }

    /// Encode `values` using the categories fitted for `column`.
    pub fn transform_values(
        &self,
        column: &str,
        values: &[Option<String>],
    ) -> std::result::Result<Vec<i64>, EncodingError> {
        let categories = self.categories(column).ok_or(EncodingError::NotFitted)?;
        Ok(values
            .iter()
            .map(|v| {
                categories
                    .iter()
                    .position(|c| c == v)
                    .map(|i| i as i64)
                    .unwrap_or(UNKNOWN_CATEGORY)
            })
            .collect())
    }

    /// Encode the column `name` of `table`.
    pub fn transform(&self, table: &FeatureTable, name: &str) -> Result<Column> {
        let column = table.require(name)?;
        let values = match column {
            Column::Str(v) => v,
            other => {
                return Err(SplitError::Encoding {
                    column: name.to_string(),
                    source: EncodingError::NotCategorical(other.column_type().name()),
                })
            }
        };
        self.transform_values(name, values)
            .map(Column::Int)
            .map_err(|source| SplitError::Encoding {
                column: name.to_string(),
                source,
            })
    }
}

fn string_column<'a>(table: &'a FeatureTable, name: &str) -> Result<&'a [Option<String>]> {
    match table.require(name)? {
        Column::Str(v) => Ok(v),
        other => Err(SplitError::Encoding {
            column: name.to_string(),
            source: EncodingError::NotCategorical(other.column_type().name()),
        }),
    }
}

// =============================================================================
// make_encoding
// =============================================================================

/// Output of [`make_encoding`].
#[derive(Clone, Debug)]
pub struct Encoding {
    /// `all_cols` of the input, categorical columns integer-encoded.
    pub table: FeatureTable,
    /// The encoder used (freshly fit unless one was passed in).
    pub encoder: OrdinalEncoder,
    /// Columns that were treated as categorical, in table order.
    pub categorical: Vec<String>,
}

/// Encode the categorical columns of `table`.
///
/// A column is categorical when it is stored as strings and is not listed in
/// `exclude_cols`. The returned table holds exactly `all_cols`, in that order,
/// with the original row index. Numeric columns keep their type, except
/// nullable integers, which become floats with missing values replaced by
/// [`MISSING_INT_SENTINEL`].
///
/// Pass `encoder` to reuse categories from an earlier fit; values it has not
/// seen map to [`UNKNOWN_CATEGORY`].
///
/// # Errors
///
/// - [`SplitError::MissingColumns`] if `all_cols` or `exclude_cols` name a
///   column absent from `table`
/// - [`SplitError::Encoding`] if a reused encoder cannot encode a column
pub fn make_encoding<S: AsRef<str>, T: AsRef<str>>(
    table: &FeatureTable,
    exclude_cols: &[S],
    all_cols: &[T],
    encoder: Option<&OrdinalEncoder>,
) -> Result<Encoding> {
    check_present(table, "all_cols", all_cols)?;
    check_present(table, "exclude_cols", exclude_cols)?;

    let excluded: Vec<&str> = exclude_cols.iter().map(AsRef::as_ref).collect();
    let wanted: Vec<&str> = all_cols.iter().map(AsRef::as_ref).collect();

    let mut working = table.select(&wanted)?;
    for name in &wanted {
        if let Some(Column::NullableInt(values)) = working.column(name) {
            let missing = values.iter().filter(|v| v.is_none()).count();
            let fraction = if values.is_empty() {
                0.0
            } else {
                missing as f64 / values.len() as f64
            };
            debug!(
                column = %name,
                missing_fraction = fraction,
                "converting nullable integer column to float"
            );
            let widened = Column::Float(
                values
                    .iter()
                    .map(|v| v.map(|x| x as f64).unwrap_or(MISSING_INT_SENTINEL))
                    .collect(),
            );
            working = working.with_column(*name, widened)?;
        }
    }

    let categorical: Vec<String> = table
        .column_names()
        .iter()
        .filter(|name| wanted.contains(&name.as_str()) && !excluded.contains(&name.as_str()))
        .filter(|name| {
            working
                .column(name)
                .is_some_and(|c| c.column_type().is_categorical())
        })
        .cloned()
        .collect();

    let encoder = match encoder {
        Some(existing) => existing.clone(),
        None => OrdinalEncoder::fit(&working, &categorical)?,
    };

    for name in &categorical {
        let encoded = encoder.transform(&working, name)?;
        working = working.with_column(name.as_str(), encoded)?;
    }

    Ok(Encoding {
        table: working,
        encoder,
        categorical,
    })
}

fn check_present<S: AsRef<str>>(
    table: &FeatureTable,
    argument: &'static str,
    columns: &[S],
) -> Result<()> {
    let missing: Vec<String> = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !table.has_column(name))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SplitError::MissingColumns {
            argument,
            columns: missing,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
