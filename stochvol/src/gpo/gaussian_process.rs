//! Gaussian process regression with a Matérn 5/2 ARD kernel
//!
//! Inputs are mapped to the unit cube of the parameter bounds and outputs are
//! standardised before fitting; predictions are returned on the original scale.

use crate::error::{Result, SvError};
use log::debug;
use nalgebra::{DMatrix, DVector};
use stoch_math::linalg::cholesky_lower;
use stoch_math::{minimize_lbfgsb, BoxConstraints, LbfgsbOptions};

const LN_2PI: f64 = 1.837_877_066_409_345_5;
const SQRT_5: f64 = 2.236_067_977_499_79;
const DIAGONAL_JITTER: f64 = 1e-10;

/// Kernel hyperparameters, all on the log scale
#[derive(Debug, Clone, PartialEq)]
pub struct GpHyperparameters {
    pub log_signal_variance: f64,
    pub log_length_scales: Vec<f64>,
    pub log_noise_variance: f64,
}

impl GpHyperparameters {
    /// Starting values for a `dim`-dimensional input
    pub fn initial(dim: usize) -> Self {
        Self {
            log_signal_variance: 0.0,
            log_length_scales: vec![0.3f64.ln(); dim],
            log_noise_variance: 0.1f64.ln(),
        }
    }

    fn to_vec(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.log_length_scales.len() + 2);
        v.push(self.log_signal_variance);
        v.extend_from_slice(&self.log_length_scales);
        v.push(self.log_noise_variance);
        v
    }

    fn from_slice(v: &[f64]) -> Self {
        let dim = v.len() - 2;
        Self {
            log_signal_variance: v[0],
            log_length_scales: v[1..=dim].to_vec(),
            log_noise_variance: v[dim + 1],
        }
    }

    fn search_bounds(dim: usize) -> Result<BoxConstraints> {
        let mut lower = vec![0.01f64.ln()];
        let mut upper = vec![100f64.ln()];
        lower.extend(std::iter::repeat(0.01f64.ln()).take(dim));
        upper.extend(std::iter::repeat(10f64.ln()).take(dim));
        lower.push(1e-6f64.ln());
        upper.push(0.0);
        Ok(BoxConstraints::new(lower, upper)?)
    }

    /// Signal variance
    pub fn signal_variance(&self) -> f64 {
        self.log_signal_variance.exp()
    }

    /// Noise variance
    pub fn noise_variance(&self) -> f64 {
        self.log_noise_variance.exp()
    }

    /// Length-scales in unit-cube coordinates
    pub fn length_scales(&self) -> Vec<f64> {
        self.log_length_scales.iter().map(|l| l.exp()).collect()
    }
}

fn matern52(a: &[f64], b: &[f64], hyper: &GpHyperparameters) -> f64 {
    let r2: f64 = a
        .iter()
        .zip(b.iter())
        .zip(hyper.log_length_scales.iter())
        .map(|((x, y), ll)| {
            let d = (x - y) / ll.exp();
            d * d
        })
        .sum();
    let r = r2.sqrt();
    hyper.signal_variance() * (1.0 + SQRT_5 * r + 5.0 / 3.0 * r2) * (-SQRT_5 * r).exp()
}

/// Factorisation of the training covariance
#[derive(Debug, Clone)]
struct Posterior {
    chol: DMatrix<f64>,
    weights: DVector<f64>,
}

fn factorise(inputs: &[Vec<f64>], targets: &DVector<f64>, hyper: &GpHyperparameters) -> Result<Posterior> {
    let n = inputs.len();
    let noise = hyper.noise_variance() + DIAGONAL_JITTER;
    let k = DMatrix::from_fn(n, n, |i, j| {
        let v = matern52(&inputs[i], &inputs[j], hyper);
        if i == j {
            v + noise
        } else {
            v
        }
    });
    let chol = cholesky_lower(&k)?;
    let z = chol
        .solve_lower_triangular(targets)
        .ok_or_else(|| SvError::ModelError("Singular GP covariance".to_string()))?;
    let weights = chol
        .tr_solve_lower_triangular(&z)
        .ok_or_else(|| SvError::ModelError("Singular GP covariance".to_string()))?;
    Ok(Posterior { chol, weights })
}

fn log_marginal(posterior: &Posterior, targets: &DVector<f64>) -> f64 {
    let n = targets.len() as f64;
    let log_det: f64 = posterior.chol.diagonal().iter().map(|d| d.ln()).sum();
    -0.5 * targets.dot(&posterior.weights) - log_det - 0.5 * n * LN_2PI
}

/// Zero-mean Gaussian process over a box
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    bounds: BoxConstraints,
    hyper: GpHyperparameters,
    inputs: Vec<Vec<f64>>,
    targets: DVector<f64>,
    y_mean: f64,
    y_std: f64,
    posterior: Option<Posterior>,
}

impl GaussianProcess {
    /// Create an unfitted process over `bounds`
    pub fn new(bounds: BoxConstraints) -> Self {
        let dim = bounds.dimension();
        Self {
            bounds,
            hyper: GpHyperparameters::initial(dim),
            inputs: Vec::new(),
            targets: DVector::zeros(0),
            y_mean: 0.0,
            y_std: 1.0,
            posterior: None,
        }
    }

    /// Current hyperparameters
    pub fn hyperparameters(&self) -> &GpHyperparameters {
        &self.hyper
    }

    /// Number of training points
    pub fn n_points(&self) -> usize {
        self.inputs.len()
    }

    /// Condition the process on `(inputs, outputs)` with the current hyperparameters
    pub fn fit(&mut self, inputs: &[Vec<f64>], outputs: &[f64]) -> Result<()> {
        if inputs.len() != outputs.len() || inputs.len() < 2 {
            return Err(SvError::InvalidParameter(format!(
                "GP needs at least two matching inputs and outputs, got {} and {}",
                inputs.len(),
                outputs.len()
            )));
        }
        let dim = self.bounds.dimension();
        if inputs.iter().any(|x| x.len() != dim) {
            return Err(SvError::InvalidParameter(format!(
                "GP inputs must have dimension {}",
                dim
            )));
        }
        if outputs.iter().any(|y| !y.is_finite()) {
            return Err(SvError::InvalidParameter(
                "GP outputs must be finite".to_string(),
            ));
        }

        let n = outputs.len() as f64;
        let mean = outputs.iter().sum::<f64>() / n;
        let var = outputs.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        self.y_mean = mean;
        self.y_std = if var > 0.0 { var.sqrt() } else { 1.0 };

        self.inputs = inputs.iter().map(|x| self.bounds.to_unit(x)).collect();
        self.targets = DVector::from_iterator(
            outputs.len(),
            outputs.iter().map(|y| (y - self.y_mean) / self.y_std),
        );
        self.posterior = Some(factorise(&self.inputs, &self.targets, &self.hyper)?);
        Ok(())
    }

    /// Log marginal likelihood of the standardised training data
    pub fn log_marginal_likelihood(&self) -> Result<f64> {
        let posterior = self.posterior()?;
        Ok(log_marginal(posterior, &self.targets))
    }

    /// Fit the hyperparameters by maximising the log marginal likelihood (type II ML)
    pub fn optimize_hyperparameters(&mut self) -> Result<f64> {
        self.posterior()?;
        let dim = self.bounds.dimension();
        let search = GpHyperparameters::search_bounds(dim)?;
        let inputs = &self.inputs;
        let targets = &self.targets;

        let objective = |v: &[f64]| {
            let hyper = GpHyperparameters::from_slice(v);
            match factorise(inputs, targets, &hyper) {
                Ok(posterior) => -log_marginal(&posterior, targets),
                Err(_) => f64::INFINITY,
            }
        };
        let options = LbfgsbOptions {
            max_iterations: 100,
            ..LbfgsbOptions::default()
        };
        let result = minimize_lbfgsb(objective, &self.hyper.to_vec(), &search, options)?;

        let hyper = GpHyperparameters::from_slice(&result.x);
        let posterior = factorise(&self.inputs, &self.targets, &hyper)?;
        debug!(
            "GP hyperparameters: signal {:.3}, noise {:.3e}, lengths {:?}, lml {:.3}",
            hyper.signal_variance(),
            hyper.noise_variance(),
            hyper.length_scales(),
            -result.objective
        );
        self.hyper = hyper;
        self.posterior = Some(posterior);
        Ok(-result.objective)
    }

    /// Predictive mean and variance of the latent function at `x` (original scale)
    pub fn predict(&self, x: &[f64]) -> Result<(f64, f64)> {
        let posterior = self.posterior()?;
        let unit = self.bounds.to_unit(x);
        let k_star = DVector::from_iterator(
            self.inputs.len(),
            self.inputs.iter().map(|xi| matern52(&unit, xi, &self.hyper)),
        );

        let mean = k_star.dot(&posterior.weights);
        let v = posterior
            .chol
            .solve_lower_triangular(&k_star)
            .ok_or_else(|| SvError::ModelError("Singular GP covariance".to_string()))?;
        let var = (self.hyper.signal_variance() - v.dot(&v)).max(0.0);

        Ok((
            self.y_mean + self.y_std * mean,
            self.y_std * self.y_std * var,
        ))
    }

    /// Predictive mean only; `NaN` if the process is not fitted
    pub fn predict_mean(&self, x: &[f64]) -> f64 {
        self.predict(x).map(|(m, _)| m).unwrap_or(f64::NAN)
    }

    fn posterior(&self) -> Result<&Posterior> {
        self.posterior
            .as_ref()
            .ok_or_else(|| SvError::ModelError("Gaussian process is not fitted".to_string()))
    }
}
