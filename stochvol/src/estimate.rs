//! Log-volatility estimation for a single return series
//!
//! Parameters of the alpha-stable stochastic volatility model are estimated by
//! Gaussian process optimisation of the ABC particle-filter log-posterior, and
//! the log-volatility path is then extracted with the FFBSi smoother.

use crate::error::{Result, SvError};
use crate::gpo::{GaussianProcessOptimizer, GpoOutput, GpoSettings};
use crate::models::{HwsvAlphaModel, ObservationTransform, StateSpaceModel, SvParameters};
use crate::smc::{abc_bootstrap_filter, ffbsi_smoother, NoisyObservations, SmcSettings, SmootherSettings};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shortest series the estimator accepts
pub const MIN_OBSERVATIONS: usize = 10;

/// Settings for `estimate_log_volatility`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationSettings {
    pub smc: SmcSettings,
    pub smoother: SmootherSettings,
    pub gpo: GpoSettings,
    /// Transform used when comparing simulated and observed returns
    pub transform: ObservationTransform,
}

impl EstimationSettings {
    /// Validate every component
    pub fn validate(&self) -> Result<()> {
        self.smc.validate()?;
        self.smoother.validate()?;
        self.gpo.validate()?;
        if self.gpo.initial_params.len() != SvParameters::NAMES.len() {
            return Err(SvError::InvalidParameter(format!(
                "The volatility model has {} parameters, GPO is set up for {}",
                SvParameters::NAMES.len(),
                self.gpo.initial_params.len()
            )));
        }
        Ok(())
    }
}

/// Serializable summary of a GPO run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpoSummary {
    pub th_hat: Vec<f64>,
    pub max_mean: f64,
    /// Approximate posterior covariance, when the Hessian allowed one
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Square roots of the covariance diagonal
    pub standard_errors: Option<Vec<f64>>,
    pub iterations: usize,
}

impl From<&GpoOutput> for GpoSummary {
    fn from(out: &GpoOutput) -> Self {
        let covariance = out.covariance.as_ref().map(|c| {
            (0..c.nrows())
                .map(|i| (0..c.ncols()).map(|j| c[(i, j)]).collect())
                .collect::<Vec<Vec<f64>>>()
        });
        let standard_errors = out
            .covariance
            .as_ref()
            .map(|c| c.diagonal().iter().map(|v| v.sqrt()).collect());
        Self {
            th_hat: out.th_hat.clone(),
            max_mean: out.max_mean,
            covariance,
            standard_errors,
            iterations: out.iterations,
        }
    }
}

/// Estimated log-volatility and model parameters for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogVolatilityEstimate {
    /// Smoothed log-volatility per period
    pub log_volatility: Vec<f64>,
    /// Filtered log-volatility per period
    pub filtered_log_volatility: Vec<f64>,
    pub parameters: SvParameters,
    /// Particle-filter log-likelihood at the estimate
    pub log_likelihood: f64,
    pub gpo: GpoSummary,
}

/// Estimate the stochastic volatility model on `returns` and smooth the log-volatility
pub fn estimate_log_volatility<R: Rng + ?Sized>(
    returns: &[f64],
    settings: &EstimationSettings,
    rng: &mut R,
) -> Result<LogVolatilityEstimate> {
    if returns.len() < MIN_OBSERVATIONS {
        return Err(SvError::DataError(format!(
            "Need at least {} observations, got {}",
            MIN_OBSERVATIONS,
            returns.len()
        )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(SvError::DataError("Returns must be finite".to_string()));
    }
    settings.validate()?;

    let mut model = HwsvAlphaModel::new(SvParameters::from_slice(&settings.gpo.initial_params)?)?
        .with_initial_state(0.0)
        .with_transform(settings.transform);
    let data = NoisyObservations::new(&model, returns, &settings.smc, rng)?;

    let optimizer = GaussianProcessOptimizer::new(settings.gpo.clone())?;
    let mut filter_rng = StdRng::seed_from_u64(rng.gen());
    let mut candidate = model.clone();
    let gpo = optimizer.maximize(
        |theta| {
            if candidate.set_params(theta).is_err() {
                return Ok(f64::NEG_INFINITY);
            }
            let prior = candidate.log_prior();
            if prior == f64::NEG_INFINITY {
                return Ok(prior);
            }
            let out = abc_bootstrap_filter(&candidate, &data, &settings.smc, false, &mut filter_rng)?;
            Ok(out.log_likelihood + prior)
        },
        rng,
    )?;

    let parameters = SvParameters::from_slice(&gpo.th_hat)?;
    model.set_params(&gpo.th_hat)?;
    info!(
        "Estimated mu = {:.4}, phi = {:.4}, sigma_v = {:.4}, alpha = {:.4}",
        parameters.mu, parameters.phi, parameters.sigma_v, parameters.alpha
    );

    let filtered = abc_bootstrap_filter(&model, &data, &settings.smc, true, rng)?;
    if !filtered.log_likelihood.is_finite() {
        warn!("Particle filter collapsed at the estimated parameters");
    }
    let smoothed = ffbsi_smoother(&model, &filtered, &settings.smoother, rng)?;

    Ok(LogVolatilityEstimate {
        log_volatility: smoothed.smoothed_means,
        filtered_log_volatility: filtered.filtered_means,
        parameters,
        log_likelihood: filtered.log_likelihood,
        gpo: GpoSummary::from(&gpo),
    })
}
