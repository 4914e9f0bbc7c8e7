//! Error types for the stochvol crate

use polars::prelude::PolarsError;
use stoch_math::MathError;
use thiserror::Error;

/// Custom error types for the stochvol crate
#[derive(Debug, Error)]
pub enum SvError {
    /// Error related to data loading or validation
    #[error("Data error: {0}")]
    DataError(String),

    /// Error raised inside a model (filter, smoother, copula)
    #[error("Model error: {0}")]
    ModelError(String),

    /// Error from invalid parameters or settings
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// An optimiser failed to produce a usable estimate
    #[error("Convergence error: {0}")]
    ConvergenceError(String),

    /// Error from the numerical building blocks
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from JSON (de)serialisation
    #[error("JSON error: {0}")]
    JsonError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, SvError>;

impl From<PolarsError> for SvError {
    fn from(err: PolarsError) -> Self {
        SvError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for SvError {
    fn from(err: csv::Error) -> Self {
        SvError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for SvError {
    fn from(err: serde_json::Error) -> Self {
        SvError::JsonError(err.to_string())
    }
}
