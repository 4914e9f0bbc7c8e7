//! Student's t copula
//!
//! Parameters are `[nu, a_01, a_02, .., a_(n-2)(n-1)]`: the degrees of freedom
//! followed by the upper-triangle entries of a symmetric matrix `A` with unit
//! diagonal. The correlation matrix is `A A^T` rescaled to unit diagonal, which
//! is positive semidefinite for every parameter value.

use crate::copula::{matrix_rows, CopulaSample};
use crate::error::{Result, SvError};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::PI;
use stoch_math::distributions::StudentT;
use stoch_math::linalg::{cholesky_lower, is_correlation_matrix, nearest_correlation, sqrtm_symmetric};
use stoch_math::optimize::OptimizationResult;
use stoch_math::{kendall_tau, minimize_lbfgsb, BoxConstraints, LbfgsbOptions};

/// Prior on the degrees of freedom: Gamma(shape 2, rate 0.1)
const NU_PRIOR_SHAPE: f64 = 2.0;
const NU_PRIOR_RATE: f64 = 0.1;

/// Student's t copula on `n_assets` margins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentTCopula {
    n_assets: usize,
    params: Vec<f64>,
}

impl StudentTCopula {
    /// Number of parameters for `n_assets` margins
    pub fn n_params_for(n_assets: usize) -> usize {
        n_assets * n_assets.saturating_sub(1) / 2 + 1
    }

    /// Copula with every parameter set to one
    pub fn new(n_assets: usize) -> Result<Self> {
        Self::with_params(n_assets, vec![1.0; Self::n_params_for(n_assets)])
    }

    /// Copula with explicit parameters
    pub fn with_params(n_assets: usize, params: Vec<f64>) -> Result<Self> {
        if n_assets < 2 {
            return Err(SvError::InvalidParameter(format!(
                "A copula needs at least two assets, got {}",
                n_assets
            )));
        }
        let mut copula = Self {
            n_assets,
            params: Vec::new(),
        };
        copula.set_params(&params)?;
        Ok(copula)
    }

    pub fn n_assets(&self) -> usize {
        self.n_assets
    }

    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Degrees of freedom
    pub fn nu(&self) -> f64 {
        self.params[0]
    }

    /// Replace the parameters
    pub fn set_params(&mut self, params: &[f64]) -> Result<()> {
        let expected = Self::n_params_for(self.n_assets);
        if params.len() != expected {
            return Err(SvError::InvalidParameter(format!(
                "Copula on {} assets has {} parameters, got {}",
                self.n_assets,
                expected,
                params.len()
            )));
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(SvError::InvalidParameter(
                "Copula parameters must be finite".to_string(),
            ));
        }
        self.params = params.to_vec();
        Ok(())
    }

    /// Correlation matrix implied by the parameters
    pub fn construct_correlation_matrix(&self) -> Result<DMatrix<f64>> {
        let n = self.n_assets;
        let mut a = DMatrix::identity(n, n);
        let mut k = 1;
        for i in 0..n {
            for j in (i + 1)..n {
                a[(i, j)] = self.params[k];
                a[(j, i)] = self.params[k];
                k += 1;
            }
        }

        let m = &a * a.transpose();
        let scale: Vec<f64> = (0..n).map(|i| m[(i, i)].sqrt()).collect();
        if scale.iter().any(|s| !(*s > 0.0)) {
            return Err(SvError::ModelError(
                "Copula parameters give a degenerate correlation matrix".to_string(),
            ));
        }
        Ok(DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                m[(i, j)] / (scale[i] * scale[j])
            }
        }))
    }

    /// Copula log-likelihood of pseudo-observations, one vector of uniforms per asset.
    ///
    /// Returns `-inf` when the degrees of freedom are not positive or the
    /// correlation matrix is singular.
    pub fn log_likelihood(&self, uhat: &[Vec<f64>]) -> Result<f64> {
        let n_obs = check_uniforms(uhat, self.n_assets)?;
        let nu = self.nu();
        let t = match StudentT::new(nu) {
            Ok(t) => t,
            Err(_) => return Ok(f64::NEG_INFINITY),
        };
        let l = match cholesky_lower(&self.construct_correlation_matrix()?) {
            Ok(l) => l,
            Err(_) => return Ok(f64::NEG_INFINITY),
        };

        let d = self.n_assets as f64;
        let log_det: f64 = 2.0 * l.diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let ln_norm = ln_gamma(0.5 * (nu + d)) - ln_gamma(0.5 * nu) - 0.5 * d * (nu * PI).ln() - 0.5 * log_det;

        let mut total = 0.0;
        let mut x = DVector::zeros(self.n_assets);
        for row in 0..n_obs {
            let mut marginal = 0.0;
            for (i, column) in uhat.iter().enumerate() {
                let xi = t.ppf(column[row]);
                x[i] = xi;
                marginal += t.ln_pdf(xi);
            }
            let z = l
                .solve_lower_triangular(&x)
                .ok_or_else(|| SvError::ModelError("Singular copula correlation".to_string()))?;
            let q = z.dot(&z);
            total += ln_norm - 0.5 * (nu + d) * (q / nu).ln_1p() - marginal;
        }

        Ok(total)
    }

    /// Log prior: Gamma(2, rate 0.1) on the degrees of freedom, flat on the rest
    pub fn log_prior(&self) -> f64 {
        let nu = self.nu();
        if nu <= 0.0 {
            return f64::NEG_INFINITY;
        }
        NU_PRIOR_SHAPE * NU_PRIOR_RATE.ln() - ln_gamma(NU_PRIOR_SHAPE) + (NU_PRIOR_SHAPE - 1.0) * nu.ln()
            - NU_PRIOR_RATE * nu
    }

    /// Log posterior of pseudo-observations
    pub fn log_posterior(&self, uhat: &[Vec<f64>]) -> Result<f64> {
        let prior = self.log_prior();
        if prior == f64::NEG_INFINITY {
            return Ok(prior);
        }
        Ok(self.log_likelihood(uhat)? + prior)
    }

    /// Fit the copula to pseudo-observations by maximising the log posterior.
    ///
    /// Starts from the Kendall's tau estimate `sin(pi tau / 2)` of the correlation,
    /// whose matrix square root gives the initial off-diagonal parameters.
    pub fn fit(uhat: &[Vec<f64>], options: &CopulaFitOptions) -> Result<CopulaFit> {
        options.validate()?;
        let n_assets = uhat.len();
        if n_assets < 2 {
            return Err(SvError::InvalidParameter(format!(
                "A copula needs at least two assets, got {}",
                n_assets
            )));
        }
        check_uniforms(uhat, n_assets)?;

        let mut kendall = DMatrix::identity(n_assets, n_assets);
        for i in 0..n_assets {
            for j in (i + 1)..n_assets {
                let tau = kendall_tau(&uhat[i], &uhat[j])?;
                kendall[(i, j)] = tau;
                kendall[(j, i)] = tau;
            }
        }
        let mut rho_hat = kendall.map(|tau| (0.5 * PI * tau).sin());
        if cholesky_lower(&rho_hat).is_err() || !is_correlation_matrix(&rho_hat, 1e-9) {
            warn!("Kendall correlation estimate is not positive definite, repairing it");
            rho_hat = nearest_correlation(&rho_hat, 1e-10, 500)?;
        }
        let root = sqrtm_symmetric(&rho_hat)?;

        let bound = options.correlation_bound;
        let mut initial = Vec::with_capacity(Self::n_params_for(n_assets));
        initial.push(options.initial_nu.clamp(options.nu_lower, options.nu_upper));
        for i in 0..n_assets {
            for j in (i + 1)..n_assets {
                initial.push(root[(i, j)].clamp(-bound, bound));
            }
        }

        let n_params = initial.len();
        let mut lower = vec![-bound; n_params];
        let mut upper = vec![bound; n_params];
        lower[0] = options.nu_lower;
        upper[0] = options.nu_upper;
        let bounds = BoxConstraints::new(lower, upper)?;

        let objective = |p: &[f64]| match Self::with_params(n_assets, p.to_vec()) {
            Ok(copula) => match copula.log_posterior(uhat) {
                Ok(lp) => -lp,
                Err(_) => f64::INFINITY,
            },
            Err(_) => f64::INFINITY,
        };
        let optimization = minimize_lbfgsb(objective, &initial, &bounds, options.lbfgsb)?;
        if !optimization.converged {
            debug!("Copula optimisation stopped: {:?}", optimization.reason);
        }

        let copula = Self::with_params(n_assets, optimization.x.clone())?;
        let correlation = copula.construct_correlation_matrix()?;
        let log_posterior = copula.log_posterior(uhat)?;
        debug!(
            "Copula fit: nu = {:.3}, log posterior = {:.3}",
            copula.nu(),
            log_posterior
        );

        Ok(CopulaFit {
            copula,
            correlation: matrix_rows(&correlation),
            kendall_tau: matrix_rows(&kendall),
            initial_correlation: matrix_rows(&rho_hat),
            log_posterior,
            optimization,
        })
    }

    /// Draw `n` joint samples from the multivariate t and its copula uniforms
    pub fn simulate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<CopulaSample> {
        let nu = self.nu();
        let t = StudentT::new(nu)?;
        let chi2 = ChiSquared::new(nu)
            .map_err(|e| SvError::InvalidParameter(format!("Degrees of freedom {}: {}", nu, e)))?;
        let l = cholesky_lower(&self.construct_correlation_matrix()?)?;

        let d = self.n_assets;
        let mut draws: Vec<Vec<f64>> = (0..d).map(|_| Vec::with_capacity(n)).collect();
        let mut uniforms: Vec<Vec<f64>> = (0..d).map(|_| Vec::with_capacity(n)).collect();
        let mut z = DVector::zeros(d);
        for _ in 0..n {
            for zi in z.iter_mut() {
                *zi = StandardNormal.sample(rng);
            }
            // Small nu puts mass on chi-squared draws that round to zero
            let w: f64 = chi2.sample(rng).max(f64::MIN_POSITIVE);
            let scale = (nu / w).sqrt();
            let y = &l * &z;
            for i in 0..d {
                let x = y[i] * scale;
                draws[i].push(x);
                uniforms[i].push(t.cdf(x));
            }
        }

        Ok(CopulaSample { draws, uniforms })
    }
}

fn check_uniforms(uhat: &[Vec<f64>], n_assets: usize) -> Result<usize> {
    if uhat.len() != n_assets {
        return Err(SvError::DataError(format!(
            "Expected pseudo-observations for {} assets, got {}",
            n_assets,
            uhat.len()
        )));
    }
    let n_obs = uhat[0].len();
    if n_obs < 2 {
        return Err(SvError::DataError(
            "Need at least two pseudo-observations".to_string(),
        ));
    }
    for column in uhat {
        if column.len() != n_obs {
            return Err(SvError::DataError(
                "Pseudo-observation series have different lengths".to_string(),
            ));
        }
        if column.iter().any(|u| !(0.0..=1.0).contains(u)) {
            return Err(SvError::DataError(
                "Pseudo-observations must lie in [0, 1]".to_string(),
            ));
        }
    }
    Ok(n_obs)
}

/// Options for `StudentTCopula::fit`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopulaFitOptions {
    pub initial_nu: f64,
    pub nu_lower: f64,
    pub nu_upper: f64,
    /// Absolute bound on every correlation parameter
    pub correlation_bound: f64,
    pub lbfgsb: LbfgsbOptions,
}

impl Default for CopulaFitOptions {
    fn default() -> Self {
        Self {
            initial_nu: 1.0,
            nu_lower: 0.1,
            nu_upper: 50.0,
            correlation_bound: 0.9,
            lbfgsb: LbfgsbOptions::default(),
        }
    }
}

impl CopulaFitOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.nu_lower > 0.0 && self.nu_lower < self.nu_upper) {
            return Err(SvError::InvalidParameter(format!(
                "Invalid degrees of freedom bounds [{}, {}]",
                self.nu_lower, self.nu_upper
            )));
        }
        if !(self.correlation_bound > 0.0 && self.correlation_bound < 1.0) {
            return Err(SvError::InvalidParameter(format!(
                "Correlation bound must be in (0, 1), got {}",
                self.correlation_bound
            )));
        }
        Ok(())
    }
}

/// A fitted copula with its starting point and optimiser diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopulaFit {
    pub copula: StudentTCopula,
    /// Fitted correlation matrix
    pub correlation: Vec<Vec<f64>>,
    /// Pairwise Kendall's tau of the pseudo-observations
    pub kendall_tau: Vec<Vec<f64>>,
    /// Correlation matrix the optimiser started from
    pub initial_correlation: Vec<Vec<f64>>,
    pub log_posterior: f64,
    pub optimization: OptimizationResult,
}
