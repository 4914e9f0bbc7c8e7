//! Correlation and rank statistics
//!
//! Contains implementations of:
//! - Pearson product-moment correlation
//! - Spearman's rank correlation
//! - Kendall's tau-b

use crate::{MathError, Result};
use std::cmp::Ordering;

fn validate_pair(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Series lengths differ: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(MathError::InsufficientData(
            "At least two observations are required".to_string(),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| v.is_nan()) {
        return Err(MathError::InvalidInput(
            "Series must not contain NaN".to_string(),
        ));
    }
    Ok(())
}

/// Compute 1-based ranks, assigning tied values their average rank
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut result = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }

        // Positions start..end (0-based) share the average of ranks start+1..=end
        let average = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            result[idx] = average;
        }
        start = end;
    }

    result
}

/// Pearson correlation coefficient
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64> {
    validate_pair(x, y)?;

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return Err(MathError::CalculationError(
            "Correlation is undefined for a constant series".to_string(),
        ));
    }

    Ok((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

/// Spearman's rank correlation coefficient
pub fn spearman_rho(x: &[f64], y: &[f64]) -> Result<f64> {
    validate_pair(x, y)?;
    pearson(&ranks(x), &ranks(y))
}

/// Kendall's tau-b rank correlation, corrected for ties.
///
/// Uses the direct pairwise count, which is quadratic in the sample size.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> Result<f64> {
    validate_pair(x, y)?;

    let n = x.len();
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut ties_x = 0i64;
    let mut ties_y = 0i64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1;
            } else if dy == 0.0 {
                ties_y += 1;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let denom_x = (concordant + discordant + ties_y) as f64;
    let denom_y = (concordant + discordant + ties_x) as f64;
    if denom_x == 0.0 || denom_y == 0.0 {
        return Err(MathError::CalculationError(
            "Kendall's tau is undefined for a constant series".to_string(),
        ));
    }

    Ok((concordant - discordant) as f64 / (denom_x * denom_y).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ranks_with_ties() {
        let r = ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(r, vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_pearson_perfect_and_inverse() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(pearson(&x, &[2.0, 4.0, 6.0, 8.0]).unwrap(), 1.0);
        assert_relative_eq!(pearson(&x, &[8.0, 6.0, 4.0, 2.0]).unwrap(), -1.0);
        assert!(pearson(&x, &[1.0, 1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_spearman_monotone_transform() {
        let x = [0.1, 0.5, 0.2, 0.9, 0.4];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.exp().powi(3)).collect();
        assert_relative_eq!(spearman_rho(&x, &y).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kendall_known_value() {
        // one discordant pair out of six
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 3.0, 2.0, 4.0];
        assert_relative_eq!(kendall_tau(&x, &y).unwrap(), 4.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kendall_tau_b_with_ties() {
        // concordant 4, one tie in x, one tie in y
        let x = [1.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 2.0, 3.0];
        let tau = kendall_tau(&x, &y).unwrap();
        assert_relative_eq!(tau, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            kendall_tau(&[1.0, 2.0], &[1.0]),
            Err(MathError::InvalidInput(_))
        ));
        assert!(matches!(
            spearman_rho(&[1.0], &[1.0]),
            Err(MathError::InsufficientData(_))
        ));
    }
}
