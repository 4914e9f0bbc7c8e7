//! State-space models for latent log-volatility

use crate::error::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod hwsv_alpha;

pub use hwsv_alpha::HwsvAlphaModel;

/// How observations are transformed before the filter compares them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationTransform {
    /// Compare raw observations
    None,
    /// Compare `arctan(y)`, which keeps heavy-tailed draws bounded
    #[default]
    Arctan,
}

impl ObservationTransform {
    /// Apply the transform to one observation
    pub fn apply(&self, y: f64) -> f64 {
        match self {
            ObservationTransform::None => y,
            ObservationTransform::Arctan => y.atan(),
        }
    }
}

/// Parameters of the stochastic volatility model with alpha-stable returns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvParameters {
    /// Mean of the log-volatility
    pub mu: f64,
    /// Persistence of the log-volatility
    pub phi: f64,
    /// Standard deviation of the log-volatility innovations
    pub sigma_v: f64,
    /// Stability index of the return innovations
    pub alpha: f64,
}

impl SvParameters {
    /// Names in the order used by `to_vec` and `from_slice`
    pub const NAMES: [&'static str; 4] = ["mu", "phi", "sigma_v", "alpha"];

    /// Build parameters from a slice ordered as `[mu, phi, sigma_v, alpha]`
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 4 {
            return Err(crate::error::SvError::InvalidParameter(format!(
                "Expected 4 parameters, got {}",
                values.len()
            )));
        }
        Ok(Self {
            mu: values[0],
            phi: values[1],
            sigma_v: values[2],
            alpha: values[3],
        })
    }

    /// Parameters as `[mu, phi, sigma_v, alpha]`
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.mu, self.phi, self.sigma_v, self.alpha]
    }
}

/// A scalar-state model that the particle filter and smoother can run on.
///
/// The state evolves as a Markov chain; observations can only be simulated,
/// not evaluated, so filters weight particles by comparing simulated and
/// observed data.
pub trait StateSpaceModel: Debug + Clone {
    /// Human readable model name
    fn name(&self) -> &str;

    /// Number of parameters
    fn n_params(&self) -> usize;

    /// Parameter names, in the order of `params`
    fn parameter_names(&self) -> Vec<String>;

    /// Current parameter vector
    fn params(&self) -> Vec<f64>;

    /// Replace the parameter vector, validating it
    fn set_params(&mut self, params: &[f64]) -> Result<()>;

    /// Draw an initial state from the stationary distribution
    fn sample_initial_state<R: Rng + ?Sized>(&self, rng: &mut R) -> f64;

    /// Fixed initial state, used when the initial state is not drawn
    fn fixed_initial_state(&self) -> f64;

    /// Draw `x_{t+1}` given `x_t`
    fn propagate<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f64;

    /// `log f(x_next | x)`
    fn transition_log_density(&self, x_next: f64, x: f64) -> f64;

    /// Upper bound of `log f(x_next | x)` over both arguments
    fn transition_log_density_bound(&self) -> f64;

    /// Draw an observation given the state
    fn simulate_observation<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f64;

    /// Transform applied to observed and simulated data before comparison
    fn transform_observation(&self, y: f64) -> f64;

    /// Log prior density of the current parameters
    fn log_prior(&self) -> f64;
}
