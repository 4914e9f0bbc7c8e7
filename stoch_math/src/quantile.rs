//! Empirical quantiles
//!
//! Quantiles interpolate linearly between order statistics, with the sample
//! position `h = (n - 1) * p`. This is the default rule of most array libraries,
//! so results line up with reference implementations.

use crate::{MathError, Result};

fn sorted_finite(sample: &[f64]) -> Result<Vec<f64>> {
    if sample.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take a quantile of an empty sample".to_string(),
        ));
    }
    if sample.iter().any(|v| v.is_nan()) {
        return Err(MathError::InvalidInput(
            "Sample must not contain NaN".to_string(),
        ));
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

fn interpolate_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    let frac = h - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

/// Empirical quantile for probability `p` in `[0, 1]`
pub fn quantile(sample: &[f64], p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(MathError::InvalidInput(format!(
            "Probability must be in [0, 1], got {}",
            p
        )));
    }
    let sorted = sorted_finite(sample)?;
    Ok(interpolate_sorted(&sorted, p))
}

/// Empirical percentile for `q` in `[0, 100]`
pub fn percentile(sample: &[f64], q: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&q) {
        return Err(MathError::InvalidInput(format!(
            "Percentile must be in [0, 100], got {}",
            q
        )));
    }
    quantile(sample, q / 100.0)
}

/// Mean of the observations at or below the empirical `p`-quantile.
///
/// On a return scale this is the expected shortfall belonging to the `p`-quantile.
pub fn lower_tail_mean(sample: &[f64], p: f64) -> Result<f64> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Tail probability must be in (0, 1], got {}",
            p
        )));
    }
    let sorted = sorted_finite(sample)?;
    let threshold = interpolate_sorted(&sorted, p);

    let tail: Vec<f64> = sorted.iter().copied().take_while(|&v| v <= threshold).collect();
    if tail.is_empty() {
        // threshold lies between the first two order statistics
        return Ok(sorted[0]);
    }
    Ok(tail.iter().sum::<f64>() / tail.len() as f64)
}
