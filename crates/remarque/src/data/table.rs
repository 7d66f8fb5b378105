//! Columnar feature table.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::column::{Column, ColumnType};

/// Errors raised while building or reading a [`FeatureTable`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("column {name} has {got} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column {name} has type {got}, expected {expected}")]
    UnexpectedType {
        name: String,
        expected: &'static str,
        got: ColumnType,
    },

    #[error("record {0} is not a JSON object")]
    NotAnObject(usize),

    #[error("key column {name} has {count} missing values")]
    MissingKeys { name: String, count: usize },
}

/// A row-per-user table of named, typed columns.
///
/// Every row carries an index into the table it was originally built from.
/// The index survives [`select`](Self::select), [`take`](Self::take) and
/// [`dedup_keep_last`](Self::dedup_keep_last), so row positions reported by
/// downstream stages can always be traced back to the caller's input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureTable {
    index: Vec<usize>,
    names: Vec<String>,
    columns: Vec<Column>,
}

impl FeatureTable {
    /// Create a table from `(name, column)` pairs.
    ///
    /// All columns must have the same length and distinct names.
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Column)>,
    ) -> Result<Self, TableError> {
        let mut names = Vec::new();
        let mut cols = Vec::new();
        let mut seen = HashSet::new();
        for (name, column) in columns {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(TableError::DuplicateColumn(name));
            }
            if let Some(first) = cols.first().map(Column::len) {
                if column.len() != first {
                    return Err(TableError::LengthMismatch {
                        name,
                        expected: first,
                        got: column.len(),
                    });
                }
            }
            names.push(name);
            cols.push(column);
        }
        let n_rows = cols.first().map(Column::len).unwrap_or(0);
        Ok(Self {
            index: (0..n_rows).collect(),
            names,
            columns: cols,
        })
    }

    /// Build a table from JSON records (one object per row).
    ///
    /// Column order follows first appearance across records. A key missing
    /// from a record is treated as `null`. Types are inferred per column:
    ///
    /// - integers only → `Int` (`NullableInt` when nulls occur)
    /// - any fractional number → `Float` (nulls become NaN)
    /// - booleans only, no nulls → `Bool`
    /// - strings, or any mix of the above → `Str`
    pub fn from_records(records: &[Value]) -> Result<Self, TableError> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for (i, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or(TableError::NotAnObject(i))?;
            for key in obj.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names.into_iter().map(|name| {
            let values: Vec<&Value> = records
                .iter()
                .map(|r| r.get(&name).unwrap_or(&Value::Null))
                .collect();
            let column = infer_column(&values);
            (name, column)
        });
        Self::new(columns.collect::<Vec<_>>())
    }

    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Original row positions, one per row.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Column names in table order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Returns true if the table has a column named `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Look up a column by name, failing with [`TableError::ColumnNotFound`].
    pub fn require(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Iterate over `(name, column)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// String values of a `Str` column.
    pub fn string_values(&self, name: &str) -> Result<&[Option<String>], TableError> {
        match self.require(name)? {
            Column::Str(v) => Ok(v),
            other => Err(TableError::UnexpectedType {
                name: name.to_string(),
                expected: "str",
                got: other.column_type(),
            }),
        }
    }

    /// Non-missing string values of a `Str` column, in row order.
    pub fn ids(&self, name: &str) -> Result<Vec<String>, TableError> {
        Ok(self.string_values(name)?.iter().flatten().cloned().collect())
    }

    /// Replace the column `name`, or append it if absent.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self, TableError> {
        let name = name.into();
        if column.len() != self.n_rows() && !self.columns.is_empty() {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.n_rows(),
                got: column.len(),
            });
        }
        if self.columns.is_empty() {
            self.index = (0..column.len()).collect();
        }
        match self.position(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(self)
    }

    /// Keep only `names`, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, TableError> {
        let mut out_names = Vec::with_capacity(names.len());
        let mut out_cols = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            out_cols.push(self.require(name)?.clone());
            out_names.push(name.to_string());
        }
        Ok(Self {
            index: self.index.clone(),
            names: out_names,
            columns: out_cols,
        })
    }

    /// Keep the rows at positions `rows` (positions within this table).
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Drop rows whose `key` value was seen again later, keeping the last
    /// occurrence. Rows keep their relative order.
    ///
    /// Returns the deduplicated table and the number of rows removed. A key
    /// column with missing values is rejected with [`TableError::MissingKeys`].
    pub fn dedup_keep_last(&self, key: &str) -> Result<(Self, usize), TableError> {
        let column = self.require(key)?;
        let missing = column.missing_count();
        if missing > 0 {
            return Err(TableError::MissingKeys {
                name: key.to_string(),
                count: missing,
            });
        }
        let mut last: HashMap<Option<String>, usize> = HashMap::with_capacity(self.n_rows());
        for row in 0..self.n_rows() {
            last.insert(column.label_at(row), row);
        }
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|row| last.get(&column.label_at(*row)) == Some(row))
            .collect();
        let removed = self.n_rows() - keep.len();
        if removed == 0 {
            return Ok((self.clone(), 0));
        }
        Ok((self.take(&keep), removed))
    }

    /// Positions of the rows whose `key` value is in `ids`.
    pub fn rows_matching(&self, key: &str, ids: &[String]) -> Result<Vec<usize>, TableError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let values = self.string_values(key)?;
        Ok(values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_deref().is_some_and(|v| wanted.contains(v)))
            .map(|(row, _)| row)
            .collect())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

fn infer_column(values: &[&Value]) -> Column {
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    let has_null = non_null.len() != values.len();

    if !non_null.is_empty() && non_null.iter().all(|v| v.is_boolean()) && !has_null {
        return Column::Bool(values.iter().map(|v| v.as_bool().unwrap_or(false)).collect());
    }

    if !non_null.is_empty() && non_null.iter().all(|v| v.is_number()) {
        if non_null.iter().all(|v| v.as_i64().is_some()) {
            let ints: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
            return if has_null {
                Column::NullableInt(ints)
            } else {
                Column::Int(ints.into_iter().flatten().collect())
            };
        }
        return Column::Float(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect(),
        );
    }

    Column::Str(
        values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
    )
}
