//! Error types for the corrclim library.

use thiserror::Error;

/// Result type alias for correction operations.
pub type Result<T> = std::result::Result<T, CorrectionError>;

/// Errors that can occur while fitting models or correcting series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    /// Invalid construction-time configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    NotFitted,

    /// Variables required by the formula are absent after derivation.
    #[error("variables in formula not found in the dataset: {}", .0.join(", "))]
    MissingVariable(Vec<String>),

    /// The covariate deriver could not synthesise these variables.
    #[error("cannot derive variables: {}", .0.join(", "))]
    UnderivableVariable(Vec<String>),

    /// Cross-validated fitting was requested without a usable fold column.
    /// An empty name means no fold variable was given at all.
    #[error("{}", fold_message(.0))]
    MissingFoldVariable(String),

    /// An instant group was never seen at fit time.
    #[error("instant {0} was not seen during fitting")]
    UnknownInstant(i64),

    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A column looked up by name does not exist.
    #[error("column '{0}' not found")]
    MissingColumn(String),

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),
}

fn fold_message(name: &str) -> String {
    if name.is_empty() {
        "a fold variable is required for cross-validated fitting".to_string()
    } else {
        format!("fold variable '{}' not found in the input series", name)
    }
}
