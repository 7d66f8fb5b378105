//! Typed column storage.

use std::fmt;

/// Storage type of a [`Column`].
///
/// `Str` is the only categorical storage type; everything else is numeric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    NullableInt,
    Float,
    Bool,
    Str,
}

impl ColumnType {
    /// Returns true for string columns.
    #[inline]
    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnType::Str)
    }

    /// Returns true for integer, float and boolean columns.
    #[inline]
    pub fn is_numeric(self) -> bool {
        !self.is_categorical()
    }

    /// Short dtype name, used in log and error messages.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::NullableInt => "Int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Str => "str",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column of values.
///
/// Missing values are `None` for nullable integers and strings, and
/// `f64::NAN` for floats. Plain integer and boolean columns cannot hold
/// missing values.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    NullableInt(Vec<Option<i64>>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<Option<String>>),
}

impl Column {
    /// Build a string column from non-missing values.
    pub fn from_strs<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Column::Str(values.into_iter().map(|s| Some(s.into())).collect())
    }

    /// Storage type.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::NullableInt(_) => ColumnType::NullableInt,
            Column::Float(_) => ColumnType::Float,
            Column::Bool(_) => ColumnType::Bool,
            Column::Str(_) => ColumnType::Str,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::NullableInt(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    /// Returns true if the column has no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of missing values.
    pub fn missing_count(&self) -> usize {
        match self {
            Column::Int(_) | Column::Bool(_) => 0,
            Column::NullableInt(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Float(v) => v.iter().filter(|x| x.is_nan()).count(),
            Column::Str(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Numeric value at `row`, `None` if missing or categorical.
    pub fn numeric_value(&self, row: usize) -> Option<f64> {
        match self {
            Column::Int(v) => Some(v[row] as f64),
            Column::NullableInt(v) => v[row].map(|x| x as f64),
            Column::Float(v) => Some(v[row]).filter(|x| !x.is_nan()),
            Column::Bool(v) => Some(if v[row] { 1.0 } else { 0.0 }),
            Column::Str(_) => None,
        }
    }

    /// All values as `f64`, missing values as NaN.
    ///
    /// String columns yield NaN everywhere.
    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len())
            .map(|row| self.numeric_value(row).unwrap_or(f64::NAN))
            .collect()
    }

    /// Render the value at `row` as a label string, `None` if missing.
    ///
    /// Floats holding an integral value render without a fractional part so
    /// that `3.0` and `3` produce the same label.
    pub fn label_at(&self, row: usize) -> Option<String> {
        match self {
            Column::Int(v) => Some(v[row].to_string()),
            Column::NullableInt(v) => v[row].map(|x| x.to_string()),
            Column::Float(v) => {
                let x = v[row];
                if x.is_nan() {
                    None
                } else if x.fract() == 0.0 && x.abs() < 1e15 {
                    Some(format!("{}", x as i64))
                } else {
                    Some(x.to_string())
                }
            }
            Column::Bool(v) => Some(v[row].to_string()),
            Column::Str(v) => v[row].clone(),
        }
    }

    /// Gather the values at `rows` into a new column of the same type.
    pub fn take(&self, rows: &[usize]) -> Column {
        fn gather<T: Clone>(v: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&r| v[r].clone()).collect()
        }
        match self {
            Column::Int(v) => Column::Int(gather(v, rows)),
            Column::NullableInt(v) => Column::NullableInt(gather(v, rows)),
            Column::Float(v) => Column::Float(gather(v, rows)),
            Column::Bool(v) => Column::Bool(gather(v, rows)),
            Column::Str(v) => Column::Str(gather(v, rows)),
        }
    }

    /// Smallest and largest non-missing numeric value.
    pub fn numeric_range(&self) -> Option<(f64, f64)> {
        (0..self.len())
            .filter_map(|row| self.numeric_value(row))
            .fold(None, |acc, x| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
    }

    /// Add `shift` to every numeric value, keeping the storage type.
    ///
    /// Booleans are widened to integers first. String columns are returned
    /// unchanged.
    pub fn shifted(&self, shift: i64) -> Column {
        match self {
            Column::Int(v) => Column::Int(v.iter().map(|x| x + shift).collect()),
            Column::NullableInt(v) => {
                Column::NullableInt(v.iter().map(|x| x.map(|x| x + shift)).collect())
            }
            Column::Float(v) => Column::Float(v.iter().map(|x| x + shift as f64).collect()),
            Column::Bool(v) => Column::Int(v.iter().map(|&x| x as i64 + shift).collect()),
            Column::Str(_) => self.clone(),
        }
    }
}
