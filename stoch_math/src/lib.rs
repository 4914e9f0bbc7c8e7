//! # Stoch Math
//!
//! Numerical building blocks for stochastic volatility and copula risk models.
//! This crate provides the distributions, rank statistics, empirical quantiles,
//! dense linear algebra helpers and bounded optimisers used by `stochvol`.

use thiserror::Error;

pub mod distributions;
pub mod linalg;
pub mod optimize;
pub mod quantile;
pub mod rank;

pub use distributions::{
    log_sum_exp, norm_cdf, norm_log_pdf, norm_ppf, student_t_cdf, student_t_log_pdf,
    student_t_ppf, SymmetricStable,
};
pub use optimize::{minimize_lbfgsb, BoxConstraints, LbfgsbOptions, OptimizationResult};
pub use quantile::{lower_tail_mean, percentile, quantile};
pub use rank::{kendall_tau, pearson, ranks, spearman_rho};

/// Errors that can occur in numerical calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),
}

/// Result type for numerical operations
pub type Result<T> = std::result::Result<T, MathError>;
