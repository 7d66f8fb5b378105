//! Feature tables and the preprocessing that precedes stratification.
//!
//! # Overview
//!
//! A [`FeatureTable`] holds one row per user: a string `user` identifier plus
//! numeric and categorical feature columns. Before the stratifier can balance
//! them, features go through three steps:
//!
//! - [`binsify`] / [`bin_column`]: collapse high-cardinality counts into a few
//!   ordinal buckets
//! - [`make_encoding`]: map categorical strings to small integers
//! - [`offset_features`]: move every column into its own value range
//!
//! # Missing Values
//!
//! Floats use `f64::NAN`; nullable integers and strings use `None`. The
//! encoder replaces missing nullable integers with [`MISSING_INT_SENTINEL`]
//! and treats missing strings as a category of their own.

mod binning;
mod column;
mod encoding;
mod offset;
mod table;

pub use binning::{bin_column, binsify, search_sorted, DEFAULT_PERCENTILES, SMALL_SAMPLE_ROWS};
pub use column::{Column, ColumnType};
pub use encoding::{make_encoding, Encoding, OrdinalEncoder, MISSING_INT_SENTINEL, UNKNOWN_CATEGORY};
pub use offset::{offset_features, OffsetPlan};
pub use table::{FeatureTable, TableError};
