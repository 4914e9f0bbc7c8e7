//! Forward-filtering backward-simulation (FFBSi) particle smoother
//!
//! Backward indices are drawn by rejection sampling against the upper bound
//! of the transition density. Rejection sampling is cheap when it works but
//! can stall on unlikely paths, so it stops after a fixed number of proposals
//! and the remaining paths are drawn from the exact backward weights.

use crate::error::{Result, SvError};
use crate::models::StateSpaceModel;
use crate::smc::FilterOutput;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stoch_math::log_sum_exp;

/// Smoother settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherSettings {
    /// Number of backward trajectories
    pub n_paths: usize,
    /// Rejection proposals allowed per period, as a multiple of `n_paths`
    pub rho: f64,
    /// Paths left for exact sampling once rejection sampling stops
    pub n_paths_limit: usize,
}

impl Default for SmootherSettings {
    fn default() -> Self {
        Self {
            n_paths: 50,
            rho: 5.0,
            n_paths_limit: 10,
        }
    }
}

impl SmootherSettings {
    /// Check that the settings can run the smoother
    pub fn validate(&self) -> Result<()> {
        if self.n_paths == 0 {
            return Err(SvError::InvalidParameter(
                "The smoother needs at least one path".to_string(),
            ));
        }
        if !(self.rho >= 0.0 && self.rho.is_finite()) {
            return Err(SvError::InvalidParameter(format!(
                "rho must be non-negative, got {}",
                self.rho
            )));
        }
        Ok(())
    }
}

/// Result of the backward pass
#[derive(Debug, Clone, PartialEq)]
pub struct SmootherOutput {
    /// Smoothed state mean at each period
    pub smoothed_means: Vec<f64>,
    /// Backward trajectories (`n_paths x n_obs`)
    pub trajectories: Vec<Vec<f64>>,
    /// Fraction of backward draws obtained by rejection sampling
    pub rejection_share: f64,
}

/// Draw an index from a cumulative weight vector
fn draw_index<R: Rng + ?Sized>(cdf: &[f64], rng: &mut R) -> usize {
    let total = cdf.last().copied().unwrap_or(0.0);
    let u = rng.gen::<f64>() * total;
    cdf.partition_point(|&c| c <= u).min(cdf.len().saturating_sub(1))
}

fn cumulative(weights: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut acc = 0.0;
    weights
        .map(|w| {
            acc += w;
            acc
        })
        .collect()
}

/// Run the backward pass of the FFBSi smoother on a stored filter run
pub fn ffbsi_smoother<M: StateSpaceModel, R: Rng + ?Sized>(
    model: &M,
    output: &FilterOutput,
    settings: &SmootherSettings,
    rng: &mut R,
) -> Result<SmootherOutput> {
    settings.validate()?;

    let (particles, log_weights) = match (&output.particles, &output.log_weights) {
        (Some(p), Some(w)) => (p, w),
        _ => {
            return Err(SvError::ModelError(
                "The smoother needs a filter run with stored particles".to_string(),
            ))
        }
    };
    let n_obs = particles.len();
    if n_obs == 0 || log_weights.len() != n_obs {
        return Err(SvError::ModelError(
            "Stored particles and weights do not match".to_string(),
        ));
    }

    let n_paths = settings.n_paths;
    let rejection_target = n_paths.saturating_sub(settings.n_paths_limit);
    let proposal_budget = (settings.rho * n_paths as f64).floor() as usize;
    let bound = model.transition_log_density_bound();

    let mut trajectories = vec![vec![0.0; n_obs]; n_paths];

    let last_cdf = cumulative(log_weights[n_obs - 1].iter().map(|lw| lw.exp()));
    for path in trajectories.iter_mut() {
        let i = draw_index(&last_cdf, rng);
        path[n_obs - 1] = particles[n_obs - 1][i];
    }

    let mut rejection_draws = 0usize;
    let mut backward_log_weights = vec![0.0; particles[0].len()];

    for t in (0..n_obs - 1).rev() {
        let cdf = cumulative(log_weights[t].iter().map(|lw| lw.exp()));
        let mut accepted = vec![false; n_paths];
        let mut n_accepted = 0;
        let mut proposals = 0;

        'rejection: while n_accepted < rejection_target && proposals < proposal_budget {
            for (j, path) in trajectories.iter_mut().enumerate() {
                if accepted[j] {
                    continue;
                }
                if n_accepted >= rejection_target || proposals >= proposal_budget {
                    break 'rejection;
                }
                let i = draw_index(&cdf, rng);
                proposals += 1;
                let log_ratio = model.transition_log_density(path[t + 1], particles[t][i]) - bound;
                if rng.gen::<f64>().ln() < log_ratio {
                    path[t] = particles[t][i];
                    accepted[j] = true;
                    n_accepted += 1;
                }
            }
        }
        rejection_draws += n_accepted;

        for (j, path) in trajectories.iter_mut().enumerate() {
            if accepted[j] {
                continue;
            }
            let x_next = path[t + 1];
            for (bw, (&lw, &x)) in backward_log_weights
                .iter_mut()
                .zip(log_weights[t].iter().zip(particles[t].iter()))
            {
                *bw = lw + model.transition_log_density(x_next, x);
            }
            let total = log_sum_exp(&backward_log_weights);
            let i = if total.is_finite() {
                let exact_cdf = cumulative(backward_log_weights.iter().map(|bw| (bw - total).exp()));
                draw_index(&exact_cdf, rng)
            } else {
                draw_index(&cdf, rng)
            };
            path[t] = particles[t][i];
        }
    }

    let smoothed_means = (0..n_obs)
        .map(|t| trajectories.iter().map(|path| path[t]).sum::<f64>() / n_paths as f64)
        .collect();

    let backward_draws = (n_obs - 1) * n_paths;
    let rejection_share = if backward_draws > 0 {
        rejection_draws as f64 / backward_draws as f64
    } else {
        0.0
    };
    debug!(
        "FFBSi: {} paths, {:.1}% of backward draws by rejection",
        n_paths,
        100.0 * rejection_share
    );

    Ok(SmootherOutput {
        smoothed_means,
        trajectories,
        rejection_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_index_respects_zero_weights() {
        let cdf = cumulative([0.0, 1.0, 0.0].into_iter());
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert_eq!(draw_index(&cdf, &mut rng), 1);
        }
    }

    #[test]
    fn test_cumulative() {
        assert_eq!(cumulative([0.25, 0.25, 0.5].into_iter()), vec![0.25, 0.5, 1.0]);
    }
}
