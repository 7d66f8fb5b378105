//! Error types shared across the crate.
//!
//! Structural problems (bad column references, malformed tables, invalid
//! configuration) abort a split and surface as [`SplitError`]. Per-feature
//! statistical failures never do: they degrade to `None` plus a warning inside
//! the feature's metrics, see [`crate::metrics`].

use crate::config::ConfigError;
use crate::data::TableError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Errors that abort a split.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// A column list argument referenced columns that are not in the table.
    #[error("{argument} contains columns not in table: {}", columns.join(", "))]
    MissingColumns {
        argument: &'static str,
        columns: Vec<String>,
    },

    /// Encoding a categorical column failed.
    #[error("failed to encode column {column}: {source}")]
    Encoding {
        column: String,
        #[source]
        source: EncodingError,
    },

    /// The stratifier ran out of labels while users were still unassigned.
    #[error("stratification left {remaining} of {total} users unassigned")]
    UnassignedUsers { remaining: usize, total: usize },

    /// Table construction or access failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failed (runner binary only).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside the ordinal encoder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodingError {
    /// The encoder was never fit on this column.
    #[error("encoder has no categories for this column")]
    NotFitted,

    /// Only string columns can be ordinal-encoded.
    #[error("expected a string column, got {0}")]
    NotCategorical(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_message_lists_columns() {
        let err = SplitError::MissingColumns {
            argument: "all_cols",
            columns: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "all_cols contains columns not in table: a, b"
        );
    }

    #[test]
    fn encoding_error_carries_context() {
        let err = SplitError::Encoding {
            column: "brand".into(),
            source: EncodingError::NotFitted,
        };
        let msg = err.to_string();
        assert!(msg.contains("brand"));
        assert!(msg.contains("no categories"));
    }
}
