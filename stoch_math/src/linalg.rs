//! Dense symmetric matrix helpers
//!
//! Matrix square roots, Cholesky factors and nearest-correlation repair
//! (Higham 2002, alternating projections).

use crate::{MathError, Result};
use nalgebra::{DMatrix, SymmetricEigen};

const EIGEN_FLOOR: f64 = -1e-10;

fn require_square(m: &DMatrix<f64>) -> Result<usize> {
    if m.nrows() != m.ncols() || m.nrows() == 0 {
        return Err(MathError::InvalidInput(format!(
            "Matrix must be square and non-empty, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "Matrix entries must be finite".to_string(),
        ));
    }
    Ok(m.nrows())
}

fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Principal square root `S` of a symmetric positive semidefinite matrix, `S * S = M`
pub fn sqrtm_symmetric(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_square(m)?;
    let eig = SymmetricEigen::new(symmetrize(m));

    if let Some(&min) = eig.eigenvalues.iter().min_by(|a, b| a.total_cmp(b)) {
        if min < EIGEN_FLOOR {
            return Err(MathError::NotPositiveDefinite(format!(
                "smallest eigenvalue {:.3e}",
                min
            )));
        }
    }

    let roots = eig.eigenvalues.map(|v| v.max(0.0).sqrt());
    let q = &eig.eigenvectors;
    Ok(q * DMatrix::from_diagonal(&roots) * q.transpose())
}

/// Lower-triangular Cholesky factor `L` with `L * L^T = M`
pub fn cholesky_lower(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_square(m)?;
    symmetrize(m)
        .cholesky()
        .map(|c| c.l())
        .ok_or_else(|| MathError::NotPositiveDefinite("Cholesky factorisation failed".to_string()))
}

/// Log determinant of a symmetric positive definite matrix
pub fn log_determinant_spd(m: &DMatrix<f64>) -> Result<f64> {
    let l = cholesky_lower(m)?;
    Ok(2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// Check that `m` is a symmetric matrix with unit diagonal and entries in `[-1, 1]`
pub fn is_correlation_matrix(m: &DMatrix<f64>, tol: f64) -> bool {
    if m.nrows() != m.ncols() || m.nrows() == 0 {
        return false;
    }
    let n = m.nrows();
    for i in 0..n {
        if (m[(i, i)] - 1.0).abs() > tol {
            return false;
        }
        for j in 0..n {
            let v = m[(i, j)];
            if !v.is_finite() || v.abs() > 1.0 + tol || (v - m[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

fn project_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(symmetrize(m));
    let clipped = eig.eigenvalues.map(|v| v.max(0.0));
    let q = &eig.eigenvectors;
    symmetrize(&(q * DMatrix::from_diagonal(&clipped) * q.transpose()))
}

/// Nearest correlation matrix in Frobenius norm via Higham's alternating projections
pub fn nearest_correlation(m: &DMatrix<f64>, tol: f64, max_iterations: usize) -> Result<DMatrix<f64>> {
    let n = require_square(m)?;

    let mut y = symmetrize(m);
    let mut delta_s = DMatrix::<f64>::zeros(n, n);

    for _ in 0..max_iterations {
        let r = &y - &delta_s;
        let x = project_psd(&r);
        delta_s = &x - &r;

        let mut next = x;
        next.fill_diagonal(1.0);

        let diff = (&next - &y).norm();
        y = next;
        if diff < tol {
            break;
        }
    }

    let mut out = project_psd(&y);
    out.fill_diagonal(1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            let v = out[(i, j)].clamp(-1.0, 1.0);
            out[(i, j)] = v;
            out[(j, i)] = v;
        }
    }

    Ok(out)
}
