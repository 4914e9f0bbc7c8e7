//! Sequential Monte Carlo for models whose observation density is intractable
//!
//! # Algorithm
//!
//! The bootstrap particle filter with approximate Bayesian computation (ABC):
//! 1. propagate every particle through the state dynamics,
//! 2. simulate one pseudo-observation per particle,
//! 3. weight particles with a kernel on the distance between the (transformed)
//!    pseudo-observation and the observed data,
//! 4. resample.
//!
//! The mean of the unnormalised weights at each step estimates the predictive
//! likelihood, so their log-sum accumulates into a log-likelihood estimate.
//! Observations are perturbed once with kernel noise before filtering ("noisy
//! ABC"), which makes the estimate target the exact likelihood of the perturbed
//! data.

use crate::error::{Result, SvError};
use crate::models::StateSpaceModel;
use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use stoch_math::log_sum_exp;

pub mod smoother;

pub use smoother::{ffbsi_smoother, SmootherOutput, SmootherSettings};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Kernel comparing simulated and observed data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbcKernel {
    /// Gaussian kernel with standard deviation equal to the tolerance
    #[default]
    Gaussian,
    /// Uniform kernel on `[-tolerance, tolerance]`
    Boxcar,
}

impl AbcKernel {
    /// Log kernel weight of a distance `d` at bandwidth `tolerance`
    pub fn log_weight(&self, d: f64, tolerance: f64) -> f64 {
        match self {
            AbcKernel::Gaussian => {
                let z = d / tolerance;
                -0.5 * z * z - tolerance.ln() - LN_SQRT_2PI
            }
            AbcKernel::Boxcar => {
                if d.abs() <= tolerance {
                    -(2.0 * tolerance).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    /// Draw kernel noise at bandwidth `tolerance`
    pub fn sample_noise<R: Rng + ?Sized>(&self, tolerance: f64, rng: &mut R) -> f64 {
        match self {
            AbcKernel::Gaussian => {
                let z: f64 = StandardNormal.sample(rng);
                tolerance * z
            }
            AbcKernel::Boxcar => tolerance * (2.0 * rng.gen::<f64>() - 1.0),
        }
    }
}

/// How the filter is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialState {
    /// Draw initial particles from the stationary distribution
    #[default]
    Stationary,
    /// Start every particle at the model's fixed initial state
    Fixed,
}

/// Resampling scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Systematic,
    Multinomial,
}

/// Particle filter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmcSettings {
    /// Number of particles
    pub n_particles: usize,
    /// ABC kernel bandwidth
    pub tolerance: f64,
    pub kernel: AbcKernel,
    pub initial_state: InitialState,
    pub resampling: Resampling,
}

impl Default for SmcSettings {
    fn default() -> Self {
        Self {
            n_particles: 5000,
            tolerance: 0.10,
            kernel: AbcKernel::Gaussian,
            initial_state: InitialState::Stationary,
            resampling: Resampling::Systematic,
        }
    }
}

impl SmcSettings {
    /// Check that the settings can run a filter
    pub fn validate(&self) -> Result<()> {
        if self.n_particles < 2 {
            return Err(SvError::InvalidParameter(format!(
                "At least two particles are required, got {}",
                self.n_particles
            )));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(SvError::InvalidParameter(format!(
                "ABC tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Transformed observations perturbed once with kernel noise
#[derive(Debug, Clone, PartialEq)]
pub struct NoisyObservations {
    values: Vec<f64>,
}

impl NoisyObservations {
    /// Transform `observations` with the model and add kernel noise
    pub fn new<M: StateSpaceModel, R: Rng + ?Sized>(
        model: &M,
        observations: &[f64],
        settings: &SmcSettings,
        rng: &mut R,
    ) -> Result<Self> {
        settings.validate()?;
        if observations.is_empty() {
            return Err(SvError::DataError("No observations to filter".to_string()));
        }
        if observations.iter().any(|y| !y.is_finite()) {
            return Err(SvError::DataError(
                "Observations must be finite".to_string(),
            ));
        }

        let values = observations
            .iter()
            .map(|&y| {
                model.transform_observation(y) + settings.kernel.sample_noise(settings.tolerance, rng)
            })
            .collect();

        Ok(Self { values })
    }

    /// Use already transformed observations without adding noise
    pub fn exact(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// The perturbed, transformed observations
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of periods
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no observations
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a filter run
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutput {
    /// Estimate of the log-likelihood; `-inf` if every particle was rejected at some step
    pub log_likelihood: f64,
    /// Filtered mean of the state at each period
    pub filtered_means: Vec<f64>,
    /// Effective sample size at each period
    pub ess: Vec<f64>,
    /// Particles per period (`n_obs x n_particles`), when stored
    pub particles: Option<Vec<Vec<f64>>>,
    /// Normalised log weights per period, when stored
    pub log_weights: Option<Vec<Vec<f64>>>,
}

/// Draw `n` ancestor indices from normalised `weights`
pub fn resample<R: Rng + ?Sized>(weights: &[f64], n: usize, scheme: Resampling, rng: &mut R) -> Vec<usize> {
    let mut ancestors = Vec::with_capacity(n);
    if weights.is_empty() {
        return ancestors;
    }

    let mut positions: Vec<f64> = match scheme {
        Resampling::Systematic => {
            let u0 = rng.gen::<f64>() / n as f64;
            (0..n).map(|i| u0 + i as f64 / n as f64).collect()
        }
        Resampling::Multinomial => (0..n).map(|_| rng.gen::<f64>()).collect(),
    };
    if scheme == Resampling::Multinomial {
        positions.sort_by(f64::total_cmp);
    }

    let last = weights.len() - 1;
    let mut cumulative = weights[0];
    let mut j = 0;
    for u in positions {
        while u > cumulative && j < last {
            j += 1;
            cumulative += weights[j];
        }
        ancestors.push(j);
    }

    ancestors
}

/// Run the bootstrap particle filter with ABC weights.
///
/// With `store` set, every period's particles and normalised log weights are
/// kept for smoothing. Without it the filter returns as soon as the
/// log-likelihood estimate becomes `-inf`.
pub fn abc_bootstrap_filter<M: StateSpaceModel, R: Rng + ?Sized>(
    model: &M,
    data: &NoisyObservations,
    settings: &SmcSettings,
    store: bool,
    rng: &mut R,
) -> Result<FilterOutput> {
    settings.validate()?;
    if data.is_empty() {
        return Err(SvError::DataError("No observations to filter".to_string()));
    }

    let n = settings.n_particles;
    let n_obs = data.len();
    let ln_n = (n as f64).ln();

    let mut particles: Vec<f64> = match settings.initial_state {
        InitialState::Stationary => (0..n).map(|_| model.sample_initial_state(rng)).collect(),
        InitialState::Fixed => vec![model.fixed_initial_state(); n],
    };
    let mut log_weights = vec![0.0; n];
    let mut weights = vec![1.0 / n as f64; n];

    let mut log_likelihood = 0.0;
    let mut filtered_means = Vec::with_capacity(n_obs);
    let mut ess = Vec::with_capacity(n_obs);
    let mut stored_particles = if store { Some(Vec::with_capacity(n_obs)) } else { None };
    let mut stored_weights = if store { Some(Vec::with_capacity(n_obs)) } else { None };

    for (t, &y) in data.values().iter().enumerate() {
        if t > 0 {
            let ancestors = resample(&weights, n, settings.resampling, rng);
            particles = ancestors
                .iter()
                .map(|&a| model.propagate(particles[a], rng))
                .collect();
        }

        for (lw, &x) in log_weights.iter_mut().zip(particles.iter()) {
            let simulated = model.transform_observation(model.simulate_observation(x, rng));
            *lw = settings.kernel.log_weight(y - simulated, settings.tolerance);
        }

        let total = log_sum_exp(&log_weights);
        if total.is_finite() {
            log_likelihood += total - ln_n;
            for (w, lw) in weights.iter_mut().zip(log_weights.iter_mut()) {
                *lw -= total;
                *w = lw.exp();
            }
        } else {
            debug!("All particles rejected at t = {}", t);
            log_likelihood = f64::NEG_INFINITY;
            if !store {
                break;
            }
            warn!("ABC weights collapsed at t = {}, falling back to uniform weights", t);
            log_weights.fill(-ln_n);
            weights.fill(1.0 / n as f64);
        }

        filtered_means.push(weights.iter().zip(particles.iter()).map(|(w, x)| w * x).sum());
        ess.push(1.0 / weights.iter().map(|w| w * w).sum::<f64>());

        if let Some(stored) = stored_particles.as_mut() {
            stored.push(particles.clone());
        }
        if let Some(stored) = stored_weights.as_mut() {
            stored.push(log_weights.clone());
        }
    }

    Ok(FilterOutput {
        log_likelihood,
        filtered_means,
        ess,
        particles: stored_particles,
        log_weights: stored_weights,
    })
}
