//! Error types for the leveraged-highs pipeline.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, StudyError>;

/// Errors raised anywhere between data retrieval and the labeled return table.
#[derive(Error, Debug)]
pub enum StudyError {
    /// Input-shape mismatch: list counts, weight sum, unknown peak mode.
    /// Raised before any computation or I/O and never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed or empty price series, non-finite leverage.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The market-data source returned nothing for a symbol.
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StudyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. })
    }
}
