//! Bound-constrained optimisation and space-filling designs
//!
//! - `minimize_lbfgsb`: limited-memory BFGS restricted to a box, with
//!   finite-difference gradients and a projected backtracking line search.
//! - `latin_hypercube` / `uniform_design`: initial designs inside a box.

use crate::{MathError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Box constraints `lower <= x <= upper`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoxConstraints {
    /// Create box constraints, validating dimensions and ordering
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(MathError::InvalidInput(format!(
                "Bound dimensions differ: {} lower vs {} upper",
                lower.len(),
                upper.len()
            )));
        }
        if lower.is_empty() {
            return Err(MathError::InvalidInput(
                "Bounds must have at least one dimension".to_string(),
            ));
        }
        for (i, (l, u)) in lower.iter().zip(upper.iter()).enumerate() {
            if l.is_nan() || u.is_nan() || l > u {
                return Err(MathError::InvalidInput(format!(
                    "Invalid bounds in dimension {}: [{}, {}]",
                    i, l, u
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// Number of dimensions
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Width of dimension `i`
    pub fn width(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    /// Project a point into the box
    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&v, (&l, &u))| v.clamp(l, u))
            .collect()
    }

    /// Whether `x` lies inside the box
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dimension()
            && x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&v, (&l, &u))| v >= l && v <= u)
    }

    /// Map a point of the unit cube into the box
    pub fn from_unit(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .enumerate()
            .map(|(i, &v)| self.lower[i] + v * self.width(i))
            .collect()
    }

    /// Map a point of the box into the unit cube; degenerate dimensions map to 0
    pub fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, &v)| {
                let w = self.width(i);
                if w > 0.0 {
                    (v - self.lower[i]) / w
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Why an optimiser stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    GradientTolerance,
    ObjectiveTolerance,
    MaxIterations,
    LineSearchFailed,
}

/// Outcome of a bounded minimisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub x: Vec<f64>,
    pub objective: f64,
    pub projected_gradient_norm: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub reason: TerminationReason,
}

/// Options for `minimize_lbfgsb`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LbfgsbOptions {
    /// Number of correction pairs kept
    pub memory: usize,
    pub max_iterations: usize,
    /// Stop when the infinity norm of the projected gradient falls below this
    pub pg_tolerance: f64,
    /// Stop when the relative objective decrease falls below this
    pub f_tolerance: f64,
    /// Relative finite-difference step
    pub fd_step: f64,
}

impl Default for LbfgsbOptions {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iterations: 200,
            pg_tolerance: 1e-5,
            f_tolerance: 1e-10,
            fd_step: 1e-6,
        }
    }
}

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;
const BOUND_EPS: f64 = 1e-12;

struct CountingObjective<F> {
    f: F,
    evaluations: usize,
}

impl<F: FnMut(&[f64]) -> f64> CountingObjective<F> {
    fn eval(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let v = (self.f)(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    }

    fn gradient(&mut self, x: &[f64], fx: f64, bounds: &BoxConstraints, step: f64) -> Vec<f64> {
        let mut grad = vec![0.0; x.len()];
        let mut probe = x.to_vec();

        for i in 0..x.len() {
            if bounds.width(i) <= 0.0 {
                continue;
            }
            let h = step * x[i].abs().max(1.0);
            let up = x[i] + h;
            let down = x[i] - h;

            grad[i] = if up <= bounds.upper[i] && down >= bounds.lower[i] {
                probe[i] = up;
                let f_up = self.eval(&probe);
                probe[i] = down;
                let f_down = self.eval(&probe);
                (f_up - f_down) / (2.0 * h)
            } else if up <= bounds.upper[i] {
                probe[i] = up;
                (self.eval(&probe) - fx) / h
            } else {
                probe[i] = down.max(bounds.lower[i]);
                let dh = x[i] - probe[i];
                if dh > 0.0 {
                    (fx - self.eval(&probe)) / dh
                } else {
                    0.0
                }
            };
            probe[i] = x[i];

            if !grad[i].is_finite() {
                grad[i] = 0.0;
            }
        }

        grad
    }
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &BoxConstraints) -> f64 {
    x.iter()
        .zip(g.iter())
        .enumerate()
        .map(|(i, (&xi, &gi))| ((xi - gi).clamp(bounds.lower[i], bounds.upper[i]) - xi).abs())
        .fold(0.0, f64::max)
}

fn active_set(x: &[f64], g: &[f64], bounds: &BoxConstraints) -> Vec<bool> {
    x.iter()
        .zip(g.iter())
        .enumerate()
        .map(|(i, (&xi, &gi))| {
            bounds.width(i) <= 0.0
                || (xi <= bounds.lower[i] + BOUND_EPS && gi > 0.0)
                || (xi >= bounds.upper[i] - BOUND_EPS && gi < 0.0)
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Two-loop recursion on the free variables, returning the search direction
fn lbfgs_direction(g: &[f64], active: &[bool], history: &VecDeque<(Vec<f64>, Vec<f64>)>) -> Vec<f64> {
    let mut q: Vec<f64> = g
        .iter()
        .zip(active.iter())
        .map(|(&gi, &a)| if a { 0.0 } else { gi })
        .collect();

    let mut alphas = Vec::with_capacity(history.len());
    for (s, y) in history.iter().rev() {
        let rho = 1.0 / dot(y, s);
        let alpha = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y.iter()) {
            *qi -= alpha * yi;
        }
        alphas.push((alpha, rho));
    }

    if let Some((s, y)) = history.back() {
        let gamma = dot(s, y) / dot(y, y);
        for qi in q.iter_mut() {
            *qi *= gamma;
        }
    }

    for ((s, y), (alpha, rho)) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        for (qi, si) in q.iter_mut().zip(s.iter()) {
            *qi += (alpha - beta) * si;
        }
    }

    q.iter()
        .zip(active.iter())
        .map(|(&qi, &a)| if a { 0.0 } else { -qi })
        .collect()
}

/// Minimise `objective` inside `bounds`, starting from `initial`.
///
/// Gradients are approximated by finite differences that never leave the box.
/// `NaN` objective values are treated as `+inf`, so infeasible regions are
/// rejected by the line search.
pub fn minimize_lbfgsb<F>(
    objective: F,
    initial: &[f64],
    bounds: &BoxConstraints,
    options: LbfgsbOptions,
) -> Result<OptimizationResult>
where
    F: FnMut(&[f64]) -> f64,
{
    if initial.len() != bounds.dimension() {
        return Err(MathError::InvalidInput(format!(
            "Initial point has dimension {}, bounds have {}",
            initial.len(),
            bounds.dimension()
        )));
    }

    let mut obj = CountingObjective {
        f: objective,
        evaluations: 0,
    };

    let mut x = bounds.clamp(initial);
    let mut fx = obj.eval(&x);
    if !fx.is_finite() {
        return Err(MathError::CalculationError(
            "Objective is not finite at the initial point".to_string(),
        ));
    }
    let mut g = obj.gradient(&x, fx, bounds, options.fd_step);

    let mean_width = (0..bounds.dimension())
        .map(|i| bounds.width(i))
        .filter(|w| w.is_finite())
        .sum::<f64>()
        / bounds.dimension() as f64;
    let first_step_scale = if mean_width > 0.0 { 0.1 * mean_width } else { 1.0 };

    let mut history: VecDeque<(Vec<f64>, Vec<f64>)> = VecDeque::with_capacity(options.memory);
    let mut iterations = 0;
    let mut reason = TerminationReason::MaxIterations;
    let mut converged = false;

    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        if projected_gradient_norm(&x, &g, bounds) < options.pg_tolerance {
            reason = TerminationReason::GradientTolerance;
            converged = true;
            iterations = iter;
            break;
        }

        let active = active_set(&x, &g, bounds);
        let mut d = lbfgs_direction(&g, &active, &history);
        if dot(&d, &g) >= 0.0 {
            history.clear();
            d = g
                .iter()
                .zip(active.iter())
                .map(|(&gi, &a)| if a { 0.0 } else { -gi })
                .collect();
        }

        let d_norm = d.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if d_norm == 0.0 {
            reason = TerminationReason::GradientTolerance;
            converged = true;
            break;
        }

        let mut t = if history.is_empty() {
            (first_step_scale / d_norm).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + t * di).collect();
            let trial = bounds.clamp(&trial);
            let step: Vec<f64> = trial.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
            let f_trial = obj.eval(&trial);

            if f_trial.is_finite() && f_trial <= fx + ARMIJO_C1 * dot(&g, &step) {
                accepted = Some((trial, f_trial, step));
                break;
            }
            t *= 0.5;
        }

        let Some((x_new, f_new, s)) = accepted else {
            reason = TerminationReason::LineSearchFailed;
            break;
        };

        let g_new = obj.gradient(&x_new, f_new, bounds, options.fd_step);
        let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
        if dot(&s, &y) > 1e-10 * dot(&y, &y).sqrt() * dot(&s, &s).sqrt() {
            if history.len() == options.memory {
                history.pop_front();
            }
            history.push_back((s, y));
        }

        let decrease = fx - f_new;
        x = x_new;
        g = g_new;
        let previous = fx;
        fx = f_new;

        if decrease.abs() <= options.f_tolerance * previous.abs().max(fx.abs()).max(1.0) {
            reason = TerminationReason::ObjectiveTolerance;
            converged = true;
            break;
        }
    }

    Ok(OptimizationResult {
        projected_gradient_norm: projected_gradient_norm(&x, &g, bounds),
        x,
        objective: fx,
        iterations,
        evaluations: obj.evaluations,
        converged,
        reason,
    })
}

/// Latin hypercube design of `n` points inside `bounds`.
///
/// Each dimension is split into `n` equal strata and every stratum holds exactly one point.
pub fn latin_hypercube<R: Rng + ?Sized>(n: usize, bounds: &BoxConstraints, rng: &mut R) -> Vec<Vec<f64>> {
    let dim = bounds.dimension();
    let mut points = vec![vec![0.0; dim]; n];

    for d in 0..dim {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (point, &stratum) in points.iter_mut().zip(strata.iter()) {
            let u = (stratum as f64 + rng.gen::<f64>()) / n as f64;
            point[d] = bounds.lower[d] + u * bounds.width(d);
        }
    }

    points
}

/// `n` independent uniform points inside `bounds`
pub fn uniform_design<R: Rng + ?Sized>(n: usize, bounds: &BoxConstraints, rng: &mut R) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| {
            (0..bounds.dimension())
                .map(|d| bounds.lower[d] + rng.gen::<f64>() * bounds.width(d))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lbfgsb_unconstrained_minimum_inside_box() {
        let bounds = BoxConstraints::new(vec![-5.0, -5.0], vec![5.0, 5.0]).unwrap();
        let out = minimize_lbfgsb(
            |x| (x[0] - 1.5).powi(2) + 3.0 * (x[1] + 2.0).powi(2) + x[0] * x[1] * 0.5,
            &[4.0, 4.0],
            &bounds,
            LbfgsbOptions::default(),
        )
        .unwrap();

        // Stationary point of the quadratic
        let det = 2.0 * 6.0 - 0.25;
        let x0 = (3.0 * 6.0 - 0.5 * (-12.0)) / det;
        let x1 = (2.0 * (-12.0) - 0.5 * 3.0) / det;
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], x0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.x[1], x1, epsilon = 1e-4);
    }

    #[test]
    fn test_lbfgsb_active_bound() {
        let bounds = BoxConstraints::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
        let out = minimize_lbfgsb(
            |x| (x[0] - 3.0).powi(2) + (x[1] - 0.25).powi(2),
            &[0.5, 0.0],
            &bounds,
            LbfgsbOptions::default(),
        )
        .unwrap();

        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(out.x[1], 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_lbfgsb_rosenbrock() {
        let bounds = BoxConstraints::new(vec![-2.0, -2.0], vec![2.0, 2.0]).unwrap();
        let options = LbfgsbOptions {
            max_iterations: 2000,
            f_tolerance: 1e-14,
            ..LbfgsbOptions::default()
        };
        let out = minimize_lbfgsb(
            |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
            &[-1.2, 1.0],
            &bounds,
            options,
        )
        .unwrap();

        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 5e-2);
        assert_abs_diff_eq!(out.x[1], 1.0, epsilon = 1e-1);
    }

    #[test]
    fn test_lbfgsb_rejects_infeasible_start() {
        let bounds = BoxConstraints::new(vec![0.0], vec![1.0]).unwrap();
        let result = minimize_lbfgsb(|_| f64::INFINITY, &[0.5], &bounds, LbfgsbOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_latin_hypercube_stratification() {
        let bounds = BoxConstraints::new(vec![-2.0, 0.8], vec![2.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 50;
        let points = latin_hypercube(n, &bounds, &mut rng);
        assert_eq!(points.len(), n);

        for d in 0..2 {
            let mut seen = vec![false; n];
            for p in &points {
                assert!(bounds.contains(p));
                let stratum = ((p[d] - bounds.lower[d]) / bounds.width(d) * n as f64) as usize;
                seen[stratum.min(n - 1)] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_bounds_validation_and_unit_mapping() {
        assert!(BoxConstraints::new(vec![1.0], vec![0.0]).is_err());
        assert!(BoxConstraints::new(vec![0.0, 0.0], vec![1.0]).is_err());

        let bounds = BoxConstraints::new(vec![-2.0, 0.05], vec![2.0, 1.0]).unwrap();
        let x = vec![1.0, 0.5];
        let back = bounds.from_unit(&bounds.to_unit(&x));
        assert_abs_diff_eq!(back[0], x[0], epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], x[1], epsilon = 1e-12);
    }
}
