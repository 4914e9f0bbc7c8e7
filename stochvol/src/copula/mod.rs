//! Copula models of cross-asset dependence

use nalgebra::DMatrix;

pub mod student_t;

pub use student_t::{CopulaFit, CopulaFitOptions, StudentTCopula};

/// Joint draws from a copula, stored per asset
#[derive(Debug, Clone, PartialEq)]
pub struct CopulaSample {
    /// Draws on the scale of the underlying multivariate distribution
    pub draws: Vec<Vec<f64>>,
    /// The same draws mapped to uniforms by the marginal CDF
    pub uniforms: Vec<Vec<f64>>,
}

impl CopulaSample {
    /// Number of joint draws
    pub fn n_draws(&self) -> usize {
        self.draws.first().map_or(0, Vec::len)
    }

    /// Number of assets
    pub fn n_assets(&self) -> usize {
        self.draws.len()
    }
}

/// Row-major nested vectors of a matrix, for serialisation
pub fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

/// Upper-triangle entries (`i < j`) in row-major order
pub fn upper_triangle(m: &DMatrix<f64>) -> Vec<f64> {
    let n = m.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(m[(i, j)]);
        }
    }
    out
}
