//! Hull-White stochastic volatility with alpha-stable returns
//!
//! ```text
//! x[t+1] = mu + phi * (x[t] - mu) + sigma_v * v[t],   v[t] ~ N(0, 1)
//! y[t]   = exp(x[t] / 2) * e[t],                      e[t] ~ S(alpha, 0, 1, 0)
//! ```
//!
//! The stable density has no closed form, so the likelihood is only available
//! through simulation-based (ABC) filtering.

use crate::error::{Result, SvError};
use crate::models::{ObservationTransform, StateSpaceModel, SvParameters};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use stoch_math::distributions::norm_log_pdf;
use stoch_math::SymmetricStable;

/// Persistence used for the stationary variance when `|phi| >= 1`
const NON_STATIONARY_PHI: f64 = 0.999;
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Four-parameter stochastic volatility model with alpha-stable innovations
#[derive(Debug, Clone)]
pub struct HwsvAlphaModel {
    name: String,
    params: SvParameters,
    stable: SymmetricStable,
    /// Fixed initial log-volatility
    x0: f64,
    transform: ObservationTransform,
}

impl HwsvAlphaModel {
    /// Create the model, validating the parameters
    pub fn new(params: SvParameters) -> Result<Self> {
        validate(&params)?;
        Ok(Self {
            name: "HWSV-alpha (4 parameters)".to_string(),
            stable: SymmetricStable::new(params.alpha)?,
            params,
            x0: 0.0,
            transform: ObservationTransform::Arctan,
        })
    }

    /// Set the fixed initial state
    pub fn with_initial_state(mut self, x0: f64) -> Self {
        self.x0 = x0;
        self
    }

    /// Set the observation transform
    pub fn with_transform(mut self, transform: ObservationTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Current parameters
    pub fn parameters(&self) -> SvParameters {
        self.params
    }

    /// Observation transform in use
    pub fn transform(&self) -> ObservationTransform {
        self.transform
    }

    /// Variance of the stationary log-volatility distribution
    pub fn stationary_variance(&self) -> f64 {
        let phi = if self.params.phi.abs() < 1.0 {
            self.params.phi
        } else {
            NON_STATIONARY_PHI
        };
        self.params.sigma_v.powi(2) / (1.0 - phi * phi)
    }

    /// Simulate `n` periods, returning `(states, observations)`
    pub fn simulate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> (Vec<f64>, Vec<f64>) {
        let mut states = Vec::with_capacity(n);
        let mut observations = Vec::with_capacity(n);

        let mut x = self.sample_initial_state(rng);
        for _ in 0..n {
            states.push(x);
            observations.push(self.simulate_observation(x, rng));
            x = self.propagate(x, rng);
        }

        (states, observations)
    }
}

fn validate(params: &SvParameters) -> Result<()> {
    let SvParameters {
        mu,
        phi,
        sigma_v,
        alpha,
    } = *params;

    if !mu.is_finite() {
        return Err(SvError::InvalidParameter(format!("mu must be finite, got {}", mu)));
    }
    if !(phi > -1.0 && phi <= 1.0) {
        return Err(SvError::InvalidParameter(format!(
            "phi must be in (-1, 1], got {}",
            phi
        )));
    }
    if !(sigma_v > 0.0 && sigma_v.is_finite()) {
        return Err(SvError::InvalidParameter(format!(
            "sigma_v must be positive, got {}",
            sigma_v
        )));
    }
    if !(alpha > 0.0 && alpha <= 2.0) {
        return Err(SvError::InvalidParameter(format!(
            "alpha must be in (0, 2], got {}",
            alpha
        )));
    }
    Ok(())
}

impl StateSpaceModel for HwsvAlphaModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_params(&self) -> usize {
        SvParameters::NAMES.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        SvParameters::NAMES.iter().map(|n| n.to_string()).collect()
    }

    fn params(&self) -> Vec<f64> {
        self.params.to_vec()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<()> {
        let params = SvParameters::from_slice(params)?;
        validate(&params)?;
        self.stable = SymmetricStable::new(params.alpha)?;
        self.params = params;
        Ok(())
    }

    fn sample_initial_state<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        self.params.mu + self.stationary_variance().sqrt() * z
    }

    fn fixed_initial_state(&self) -> f64 {
        self.x0
    }

    fn propagate<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f64 {
        let v: f64 = StandardNormal.sample(rng);
        let p = &self.params;
        p.mu + p.phi * (x - p.mu) + p.sigma_v * v
    }

    fn transition_log_density(&self, x_next: f64, x: f64) -> f64 {
        let p = &self.params;
        let mean = p.mu + p.phi * (x - p.mu);
        norm_log_pdf((x_next - mean) / p.sigma_v) - p.sigma_v.ln()
    }

    fn transition_log_density_bound(&self) -> f64 {
        -LN_SQRT_2PI - self.params.sigma_v.ln()
    }

    fn simulate_observation<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f64 {
        (0.5 * x).exp() * self.stable.sample(rng)
    }

    fn transform_observation(&self, y: f64) -> f64 {
        self.transform.apply(y)
    }

    fn log_prior(&self) -> f64 {
        let p = &self.params;
        if !(p.phi > -1.0 && p.phi <= 1.0) || p.sigma_v <= 0.0 || !(p.alpha > 1.0 && p.alpha <= 2.0) {
            return f64::NEG_INFINITY;
        }

        // mu ~ N(0, 1)
        let lp_mu = norm_log_pdf(p.mu);
        // phi ~ N(0.9, 0.05^2) truncated to (-1, 1]
        let lp_phi = norm_log_pdf((p.phi - 0.9) / 0.05) - 0.05f64.ln();
        // sigma_v ~ Gamma(shape 2, rate 10)
        let lp_sigma = 2.0 * 10f64.ln() + p.sigma_v.ln() - 10.0 * p.sigma_v;
        // alpha ~ U(1, 2]

        lp_mu + lp_phi + lp_sigma
    }
}
