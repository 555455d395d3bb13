//! Error types for the clustering engine and its data layer

use thiserror::Error;

/// Errors returned by the library.
///
/// Every failure is detected before Lloyd iterations start, so a returned
/// error never leaves a half-fitted model behind.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A parameter is outside its valid range (e.g. `k < 1` or `k > n`).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The input matrix has no rows.
    #[error("input matrix is empty")]
    EmptyInput,

    /// A feature column has zero variance.
    ///
    /// The scaler itself never returns this; it falls back to `std = 1` and
    /// reports the column. Callers opt in via
    /// [`ScalerState::ensure_non_degenerate`](crate::scaler::ScalerState::ensure_non_degenerate).
    #[error("feature column {column} has zero variance")]
    DegenerateFeature { column: usize },

    /// A required column is absent from the input header.
    #[error("input does not contain column '{name}'")]
    MissingColumn { name: String },

    /// A cell could not be read as a finite number.
    #[error("row {row}, column '{column}': invalid numeric value '{value}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl ClusterError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ClusterError>;
