//! Gaussian process optimisation (Bayesian optimisation) of noisy objectives
//!
//! The objective, typically a particle-filter log-likelihood plus a log prior,
//! is sampled on a space-filling design and then at points of maximal expected
//! improvement under a Gaussian process surrogate. The parameter estimate is
//! the maximiser of the surrogate mean, not the best noisy sample.

use crate::error::{Result, SvError};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use stoch_math::distributions::norm_log_pdf;
use stoch_math::linalg::cholesky_lower;
use stoch_math::optimize::{latin_hypercube, uniform_design};
use stoch_math::{minimize_lbfgsb, norm_cdf, BoxConstraints, LbfgsbOptions};

pub mod gaussian_process;

pub use gaussian_process::{GaussianProcess, GpHyperparameters};

/// Space-filling design used before the acquisition phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreSampling {
    #[default]
    #[serde(alias = "latinhypercube", alias = "lhs")]
    LatinHypercube,
    Uniform,
}

/// Optimiser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpoSettings {
    pub initial_params: Vec<f64>,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    /// Evaluations on the space-filling design, including the initial point
    pub pre_iterations: usize,
    /// Total number of objective evaluations
    pub max_iterations: usize,
    /// Standard deviation of the jitter added to each proposal
    pub jittering_std: f64,
    pub pre_sampling: PreSampling,
    /// Re-estimate the GP hyperparameters every this many iterations
    pub hyper_interval: usize,
    pub estimate_th_hat_every_iteration: bool,
    pub estimate_hessian_every_iteration: bool,
    /// Exploration margin of the expected improvement
    pub ei_epsilon: f64,
    /// Random candidates scored before the local acquisition search
    pub acquisition_candidates: usize,
    /// Finite-difference step for the Hessian, relative to the bound widths
    pub hessian_step: f64,
    /// Log progress at info level
    pub verbose: bool,
}

impl Default for GpoSettings {
    fn default() -> Self {
        Self {
            initial_params: vec![0.20, 0.95, 0.14, 1.90],
            lower_bounds: vec![-2.0, 0.80, 0.05, 1.00],
            upper_bounds: vec![2.0, 1.0, 1.0, 2.0],
            pre_iterations: 100,
            max_iterations: 150,
            jittering_std: 0.1,
            pre_sampling: PreSampling::LatinHypercube,
            hyper_interval: 50,
            estimate_th_hat_every_iteration: false,
            estimate_hessian_every_iteration: false,
            ei_epsilon: 0.01,
            acquisition_candidates: 1000,
            hessian_step: 1e-3,
            verbose: true,
        }
    }
}

impl GpoSettings {
    /// Check bounds and iteration counts
    pub fn validate(&self) -> Result<()> {
        let dim = self.initial_params.len();
        if dim == 0 || self.lower_bounds.len() != dim || self.upper_bounds.len() != dim {
            return Err(SvError::InvalidParameter(format!(
                "Initial parameters ({}), lower bounds ({}) and upper bounds ({}) must have the same non-zero length",
                dim,
                self.lower_bounds.len(),
                self.upper_bounds.len()
            )));
        }
        for i in 0..dim {
            if !(self.lower_bounds[i] < self.upper_bounds[i]) {
                return Err(SvError::InvalidParameter(format!(
                    "Lower bound {} is not below upper bound {} for parameter {}",
                    self.lower_bounds[i], self.upper_bounds[i], i
                )));
            }
            if !(self.lower_bounds[i]..=self.upper_bounds[i]).contains(&self.initial_params[i]) {
                return Err(SvError::InvalidParameter(format!(
                    "Initial value {} of parameter {} is outside its bounds",
                    self.initial_params[i], i
                )));
            }
        }
        if self.pre_iterations < 2 {
            return Err(SvError::InvalidParameter(
                "At least two pre-sampling iterations are required".to_string(),
            ));
        }
        if self.max_iterations < self.pre_iterations {
            return Err(SvError::InvalidParameter(format!(
                "max_iterations ({}) must be at least pre_iterations ({})",
                self.max_iterations, self.pre_iterations
            )));
        }
        if !(self.jittering_std >= 0.0) || !(self.ei_epsilon >= 0.0) {
            return Err(SvError::InvalidParameter(
                "Jittering and exploration margins must be non-negative".to_string(),
            ));
        }
        if !(self.hessian_step > 0.0) {
            return Err(SvError::InvalidParameter(
                "Hessian step must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameter bounds as box constraints
    pub fn bounds(&self) -> Result<BoxConstraints> {
        Ok(BoxConstraints::new(
            self.lower_bounds.clone(),
            self.upper_bounds.clone(),
        )?)
    }
}

/// Result of an optimisation run
#[derive(Debug, Clone)]
pub struct GpoOutput {
    /// Maximiser of the surrogate mean
    pub th_hat: Vec<f64>,
    /// Surrogate mean at `th_hat`
    pub max_mean: f64,
    /// Hessian of the surrogate mean at `th_hat`
    pub hessian: DMatrix<f64>,
    /// Inverse of the negated Hessian, when it is positive definite
    pub covariance: Option<DMatrix<f64>>,
    /// Every evaluated point and its raw objective value
    pub evaluations: Vec<(Vec<f64>, f64)>,
    /// Number of objective evaluations
    pub iterations: usize,
    /// Final surrogate hyperparameters
    pub hyperparameters: GpHyperparameters,
}

/// Expected improvement over `best` for a maximisation problem
pub fn expected_improvement(mean: f64, variance: f64, best: f64, epsilon: f64) -> f64 {
    let sd = variance.sqrt();
    let gain = mean - best - epsilon;
    if sd <= 0.0 || !sd.is_finite() {
        return gain.max(0.0);
    }
    let z = gain / sd;
    gain * norm_cdf(z) + sd * norm_log_pdf(z).exp()
}

/// Bayesian optimiser over a box
#[derive(Debug, Clone)]
pub struct GaussianProcessOptimizer {
    settings: GpoSettings,
    bounds: BoxConstraints,
}

impl GaussianProcessOptimizer {
    /// Create an optimiser, validating the settings
    pub fn new(settings: GpoSettings) -> Result<Self> {
        settings.validate()?;
        let bounds = settings.bounds()?;
        Ok(Self { settings, bounds })
    }

    /// Settings in use
    pub fn settings(&self) -> &GpoSettings {
        &self.settings
    }

    /// Maximise a noisy `objective` over the parameter bounds
    pub fn maximize<F, R>(&self, mut objective: F, rng: &mut R) -> Result<GpoOutput>
    where
        F: FnMut(&[f64]) -> Result<f64>,
        R: Rng + ?Sized,
    {
        let s = &self.settings;

        let mut design = match s.pre_sampling {
            PreSampling::LatinHypercube => latin_hypercube(s.pre_iterations - 1, &self.bounds, rng),
            PreSampling::Uniform => uniform_design(s.pre_iterations - 1, &self.bounds, rng),
        };
        design.insert(0, s.initial_params.clone());

        let mut points: Vec<Vec<f64>> = Vec::with_capacity(s.max_iterations);
        let mut values: Vec<f64> = Vec::with_capacity(s.max_iterations);

        for (i, theta) in design.into_iter().enumerate() {
            let value = objective(&theta)?;
            if s.verbose {
                info!(
                    "GPO pre-sampling {}/{}: theta = {}, objective = {:.4}",
                    i + 1,
                    s.pre_iterations,
                    format_params(&theta),
                    value
                );
            }
            points.push(theta);
            values.push(value);
        }

        let mut gp = GaussianProcess::new(self.bounds.clone());
        let mut th_hat = s.initial_params.clone();

        for iteration in s.pre_iterations..s.max_iterations {
            let targets = surrogate_targets(&values)?;
            gp.fit(&points, &targets)?;
            if (iteration - s.pre_iterations) % s.hyper_interval.max(1) == 0 {
                gp.optimize_hyperparameters()?;
            }

            let best = targets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let proposal = self.maximize_acquisition(&gp, &points, &targets, best, rng)?;
            let jittered: Vec<f64> = proposal
                .iter()
                .map(|&x| {
                    let z: f64 = StandardNormal.sample(rng);
                    x + s.jittering_std * z
                })
                .collect();
            let theta = self.bounds.clamp(&jittered);

            let value = objective(&theta)?;

            if s.estimate_th_hat_every_iteration {
                let (estimate, _) = self.maximize_mean(&gp, &points, &targets)?;
                th_hat = estimate;
            }
            if s.estimate_hessian_every_iteration {
                let hessian = self.mean_hessian(&gp, &th_hat)?;
                debug!("GPO Hessian diagonal: {:?}", hessian.diagonal().as_slice());
            }
            if s.verbose {
                info!(
                    "GPO iteration {}/{}: theta = {}, objective = {:.4}, th_hat = {}",
                    iteration + 1,
                    s.max_iterations,
                    format_params(&theta),
                    value,
                    format_params(&th_hat)
                );
            }

            points.push(theta);
            values.push(value);
        }

        let targets = surrogate_targets(&values)?;
        gp.fit(&points, &targets)?;
        if s.max_iterations == s.pre_iterations {
            gp.optimize_hyperparameters()?;
        }

        let (th_hat, max_mean) = self.maximize_mean(&gp, &points, &targets)?;
        let hessian = self.mean_hessian(&gp, &th_hat)?;
        let covariance = covariance_from_hessian(&hessian);
        if covariance.is_none() {
            warn!("GPO Hessian is not negative definite, no covariance estimate");
        }

        if s.verbose {
            info!(
                "GPO finished after {} evaluations: th_hat = {}",
                values.len(),
                format_params(&th_hat)
            );
        }

        Ok(GpoOutput {
            th_hat,
            max_mean,
            hessian,
            covariance,
            iterations: values.len(),
            evaluations: points.into_iter().zip(values).collect(),
            hyperparameters: gp.hyperparameters().clone(),
        })
    }

    fn maximize_acquisition<R: Rng + ?Sized>(
        &self,
        gp: &GaussianProcess,
        points: &[Vec<f64>],
        targets: &[f64],
        best: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let eps = self.settings.ei_epsilon;
        let ei = |x: &[f64]| match gp.predict(x) {
            Ok((m, v)) => expected_improvement(m, v, best, eps),
            Err(_) => f64::NAN,
        };

        let mut candidates = uniform_design(self.settings.acquisition_candidates, &self.bounds, rng);
        candidates.push(best_point(points, targets).to_vec());

        let mut start = candidates[0].clone();
        let mut start_value = f64::NEG_INFINITY;
        for candidate in candidates {
            let value = ei(&candidate);
            if value > start_value {
                start_value = value;
                start = candidate;
            }
        }

        let options = LbfgsbOptions {
            max_iterations: 50,
            ..LbfgsbOptions::default()
        };
        match minimize_lbfgsb(|x| -ei(x), &start, &self.bounds, options) {
            Ok(result) if -result.objective >= start_value => Ok(result.x),
            _ => Ok(start),
        }
    }

    /// Maximise the surrogate mean, starting from the best sampled point
    fn maximize_mean(&self, gp: &GaussianProcess, points: &[Vec<f64>], targets: &[f64]) -> Result<(Vec<f64>, f64)> {
        let start_sampled = best_point(points, targets);
        let start_mean = points
            .iter()
            .max_by(|a, b| gp.predict_mean(a).total_cmp(&gp.predict_mean(b)))
            .map(Vec::as_slice)
            .unwrap_or(start_sampled);

        let mut best: Option<(Vec<f64>, f64)> = None;
        for start in [start_sampled, start_mean] {
            let result = minimize_lbfgsb(
                |x| -gp.predict_mean(x),
                start,
                &self.bounds,
                LbfgsbOptions::default(),
            )?;
            let value = -result.objective;
            if best.as_ref().map_or(true, |(_, b)| value > *b) {
                best = Some((result.x, value));
            }
        }

        best.ok_or_else(|| SvError::ConvergenceError("Surrogate mean could not be maximised".to_string()))
    }

    /// Central finite-difference Hessian of the surrogate mean
    fn mean_hessian(&self, gp: &GaussianProcess, x: &[f64]) -> Result<DMatrix<f64>> {
        let dim = x.len();
        let h: Vec<f64> = (0..dim)
            .map(|i| self.settings.hessian_step * self.bounds.width(i))
            .collect();
        let f = |dx: &[(usize, f64)]| -> Result<f64> {
            let mut p = x.to_vec();
            for &(i, d) in dx {
                p[i] += d;
            }
            Ok(gp.predict(&p)?.0)
        };

        let f0 = f(&[])?;
        let mut hessian = DMatrix::zeros(dim, dim);
        for i in 0..dim {
            let fp = f(&[(i, h[i])])?;
            let fm = f(&[(i, -h[i])])?;
            hessian[(i, i)] = (fp - 2.0 * f0 + fm) / (h[i] * h[i]);
            for j in (i + 1)..dim {
                let fpp = f(&[(i, h[i]), (j, h[j])])?;
                let fpm = f(&[(i, h[i]), (j, -h[j])])?;
                let fmp = f(&[(i, -h[i]), (j, h[j])])?;
                let fmm = f(&[(i, -h[i]), (j, -h[j])])?;
                let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
                hessian[(i, j)] = v;
                hessian[(j, i)] = v;
            }
        }
        Ok(hessian)
    }
}

/// Replace non-finite objective values by a value below the worst finite one
fn surrogate_targets(values: &[f64]) -> Result<Vec<f64>> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return Err(SvError::ConvergenceError(
            "Objective was not finite at any sampled point".to_string(),
        ));
    }
    let floor = min - (0.1 * (max - min)).max(1.0);
    Ok(values
        .iter()
        .map(|&v| if v.is_finite() { v } else { floor })
        .collect())
}

fn best_point<'a>(points: &'a [Vec<f64>], targets: &[f64]) -> &'a [f64] {
    let mut best = 0;
    for (i, &v) in targets.iter().enumerate() {
        if v > targets[best] {
            best = i;
        }
    }
    &points[best]
}

/// `(-H)^{-1}` when `-H` is positive definite
pub fn covariance_from_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let negated = -hessian;
    cholesky_lower(&negated).ok()?;
    negated.try_inverse()
}

fn format_params(theta: &[f64]) -> String {
    let parts: Vec<String> = theta.iter().map(|v| format!("{:.4}", v)).collect();
    format!("[{}]", parts.join(", "))
}
