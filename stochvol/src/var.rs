//! Value-at-Risk from a Student's t copula on volatility-standardised residuals
//!
//! Residuals `e = exp(-x / 2) d` are mapped to pseudo-observations with the
//! normal CDF, a Student's t copula is fitted to them, and the copula is
//! simulated. Each simulated uniform is mapped back through the normal
//! quantile and rescaled by the period's volatility; VaR is the empirical
//! `alpha`-quantile of the result.

use crate::copula::{upper_triangle, CopulaFit, CopulaFitOptions, StudentTCopula};
use crate::error::{Result, SvError};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use stoch_math::{lower_tail_mean, norm_cdf, norm_ppf, quantile, spearman_rho};

/// Settings for `compute_value_at_risk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarSettings {
    /// Number of copula draws
    pub n_simulations: usize,
    /// Portfolio weights; equal weights when absent
    pub portfolio_weights: Option<Vec<f64>>,
    pub copula: CopulaFitOptions,
}

impl Default for VarSettings {
    fn default() -> Self {
        Self {
            n_simulations: 100_000,
            portfolio_weights: None,
            copula: CopulaFitOptions::default(),
        }
    }
}

/// VaR estimates, one series per asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAtRiskReport {
    pub alpha: f64,
    /// Spearman correlation of the simulated draws for every asset pair (`i < j`, row-major)
    pub spearman: Vec<f64>,
    /// `var[i][t]`: VaR of asset `i` in period `t`
    pub var: Vec<Vec<f64>>,
    /// `expected_shortfall[i][t]`: mean return beyond the VaR
    pub expected_shortfall: Vec<Vec<f64>>,
    /// Cross-asset mean VaR per period
    pub mean_var: Vec<f64>,
    /// VaR of the weighted portfolio per period
    pub portfolio_var: Vec<f64>,
    pub portfolio_weights: Vec<f64>,
    pub copula: CopulaFit,
}

/// Volatility-standardised residuals `exp(-x / 2) d`, per asset
pub fn standardized_residuals(log_volatility: &[Vec<f64>], returns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    check_shapes(log_volatility, returns)?;
    Ok(log_volatility
        .iter()
        .zip(returns.iter())
        .map(|(x, d)| x.iter().zip(d.iter()).map(|(x, d)| (-0.5 * x).exp() * d).collect())
        .collect())
}

/// Pseudo-observations `Phi(e)` of standardised residuals
pub fn pseudo_observations(residuals: &[Vec<f64>]) -> Vec<Vec<f64>> {
    residuals
        .iter()
        .map(|e| e.iter().map(|&v| norm_cdf(v)).collect())
        .collect()
}

fn check_shapes(log_volatility: &[Vec<f64>], returns: &[Vec<f64>]) -> Result<usize> {
    if log_volatility.len() != returns.len() {
        return Err(SvError::DataError(format!(
            "{} log-volatility series for {} return series",
            log_volatility.len(),
            returns.len()
        )));
    }
    let n_obs = log_volatility.first().map_or(0, Vec::len);
    for (x, d) in log_volatility.iter().zip(returns.iter()) {
        if x.len() != n_obs || d.len() != n_obs {
            return Err(SvError::DataError(
                "Log-volatility and return series must all have the same length".to_string(),
            ));
        }
        if x.iter().chain(d.iter()).any(|v| !v.is_finite()) {
            return Err(SvError::DataError(
                "Log-volatility and returns must be finite".to_string(),
            ));
        }
    }
    Ok(n_obs)
}

/// Compute per-asset and portfolio VaR at level `alpha`.
///
/// `log_volatility` and `returns` hold one series per asset.
pub fn compute_value_at_risk<R: Rng + ?Sized>(
    log_volatility: &[Vec<f64>],
    returns: &[Vec<f64>],
    alpha: f64,
    settings: &VarSettings,
    rng: &mut R,
) -> Result<ValueAtRiskReport> {
    let n_assets = log_volatility.len();
    if n_assets < 2 {
        return Err(SvError::InvalidParameter(format!(
            "VaR from a copula needs at least two assets, got {}",
            n_assets
        )));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(SvError::InvalidParameter(format!(
            "VaR level must be in (0, 1), got {}",
            alpha
        )));
    }
    if settings.n_simulations < 2 {
        return Err(SvError::InvalidParameter(
            "At least two simulations are required".to_string(),
        ));
    }
    let n_obs = check_shapes(log_volatility, returns)?;
    let weights = match &settings.portfolio_weights {
        Some(w) if w.len() == n_assets && w.iter().all(|v| v.is_finite()) => w.clone(),
        Some(w) => {
            return Err(SvError::InvalidParameter(format!(
                "Expected {} finite portfolio weights, got {}",
                n_assets,
                w.len()
            )))
        }
        None => vec![1.0 / n_assets as f64; n_assets],
    };

    let residuals = standardized_residuals(log_volatility, returns)?;
    let uhat = pseudo_observations(&residuals);

    let fit = StudentTCopula::fit(&uhat, &settings.copula)?;
    info!(
        "Copula fitted: nu = {:.3}, log posterior = {:.3}",
        fit.copula.nu(),
        fit.log_posterior
    );

    let sample = fit.copula.simulate(settings.n_simulations, rng)?;

    let mut spearman = Vec::with_capacity(n_assets * (n_assets - 1) / 2);
    for i in 0..n_assets {
        for j in (i + 1)..n_assets {
            spearman.push(spearman_rho(&sample.draws[i], &sample.draws[j])?);
        }
    }
    debug!("Spearman correlation of copula draws: {:?}", spearman);

    let innovations: Vec<Vec<f64>> = sample
        .uniforms
        .iter()
        .map(|u| u.iter().map(|&v| norm_ppf(v)).collect())
        .collect();

    let mut var = Vec::with_capacity(n_assets);
    let mut expected_shortfall = Vec::with_capacity(n_assets);
    for (eps, x) in innovations.iter().zip(log_volatility.iter()) {
        let q = quantile(eps, alpha)?;
        let tail = lower_tail_mean(eps, alpha)?;
        var.push(x.iter().map(|&xt| (0.5 * xt).exp() * q).collect::<Vec<f64>>());
        expected_shortfall.push(x.iter().map(|&xt| (0.5 * xt).exp() * tail).collect::<Vec<f64>>());
    }

    let mean_var = (0..n_obs)
        .map(|t| var.iter().map(|v| v[t]).sum::<f64>() / n_assets as f64)
        .collect();

    let mut portfolio_var = Vec::with_capacity(n_obs);
    let mut portfolio = vec![0.0; settings.n_simulations];
    for t in 0..n_obs {
        let scales: Vec<f64> = (0..n_assets)
            .map(|i| weights[i] * (0.5 * log_volatility[i][t]).exp())
            .collect();
        for (s, value) in portfolio.iter_mut().enumerate() {
            *value = innovations.iter().zip(scales.iter()).map(|(eps, c)| c * eps[s]).sum();
        }
        portfolio_var.push(quantile(&portfolio, alpha)?);
    }

    Ok(ValueAtRiskReport {
        alpha,
        spearman,
        var,
        expected_shortfall,
        mean_var,
        portfolio_var,
        portfolio_weights: weights,
        copula: fit,
    })
}

/// Upper-triangle entries of the fitted copula correlation matrix (`i < j`, row-major)
pub fn fitted_correlation_pairs(fit: &CopulaFit) -> Vec<f64> {
    let n = fit.correlation.len();
    let m = nalgebra::DMatrix::from_fn(n, n, |i, j| fit.correlation[i][j]);
    upper_triangle(&m)
}
