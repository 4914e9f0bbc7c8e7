//! Probability distributions used by the volatility and copula models
//!
//! Contains:
//! - Standard normal CDF, quantile and log density
//! - Student's t distribution with CDF, survival function, log density and quantile
//! - Symmetric alpha-stable sampling (Chambers-Mallows-Stuck)
//! - A numerically stable log-sum-exp

use crate::{MathError, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp1};
use statrs::function::beta::beta_reg;
use statrs::function::erf::{erfc, erfc_inv};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::{LN_2, PI, SQRT_2};

/// Probabilities passed to quantile functions are clamped into `[PROB_FLOOR, 1 - PROB_FLOOR]`
pub const PROB_FLOOR: f64 = 1e-12;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;
const MAX_QUANTILE_ITERATIONS: usize = 200;
const MAX_SERIES_TERMS: usize = 200;
/// Below this `z = nu / (nu + x^2)` the upper tail is summed as a series
const TAIL_SERIES_CUTOFF: f64 = 0.1;
/// Beyond this `x * x` is no longer formed explicitly
const HUGE_ABSCISSA: f64 = 1e150;
const MIN_LN_ABSCISSA: f64 = -700.0;
const MAX_LN_ABSCISSA: f64 = 690.0;
const LN_BRACKET_STEP: f64 = 5.0;

/// Standard normal cumulative distribution function
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile function
pub fn norm_ppf(p: f64) -> f64 {
    let p = p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Log density of the standard normal distribution
pub fn norm_log_pdf(x: f64) -> f64 {
    -0.5 * x * x - LN_SQRT_2PI
}

/// Computes `ln(sum(exp(v)))` without overflow.
///
/// Returns negative infinity for an empty slice or when every entry is `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Standard Student's t distribution (location 0, scale 1)
///
/// Tail probabilities are evaluated in log space so that they stay positive and
/// accurate far beyond the point where the regularised incomplete beta function
/// underflows. With `nu` down to 0.1 the quantile of `1e-12` lies near `1e116`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudentT {
    nu: f64,
    ln_norm: f64,
    /// `ln B(nu / 2, 1 / 2)`
    ln_beta: f64,
}

impl StudentT {
    /// Create a Student's t distribution with `nu` degrees of freedom
    pub fn new(nu: f64) -> Result<Self> {
        if !nu.is_finite() || nu <= 0.0 {
            return Err(MathError::InvalidInput(format!(
                "Degrees of freedom must be positive and finite, got {}",
                nu
            )));
        }

        let ln_norm = ln_gamma(0.5 * (nu + 1.0)) - ln_gamma(0.5 * nu) - 0.5 * (nu * PI).ln();
        let ln_beta = ln_gamma(0.5 * nu) + ln_gamma(0.5) - ln_gamma(0.5 * (nu + 1.0));
        Ok(Self { nu, ln_norm, ln_beta })
    }

    /// Degrees of freedom
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Log density at `x`
    pub fn ln_pdf(&self, x: f64) -> f64 {
        let r = x * x / self.nu;
        let ln_kernel = if r.is_finite() {
            r.ln_1p()
        } else {
            2.0 * x.abs().ln() - self.nu.ln()
        };
        self.ln_norm - 0.5 * (self.nu + 1.0) * ln_kernel
    }

    /// Log of the upper tail `P(T > x)` for `x >= 0`.
    ///
    /// With `z = nu / (nu + x^2)` the tail is `I_z(nu / 2, 1 / 2) / 2`. For small
    /// `z` the hypergeometric series
    /// `I_z(a, b) = z^a (1 - z)^b / (a B(a, b)) 2F1(a + b, 1; a + 1; z)` is summed
    /// directly, otherwise statrs' `beta_reg` is used.
    fn ln_upper_tail(&self, x: f64) -> f64 {
        if x == f64::INFINITY {
            return f64::NEG_INFINITY;
        }
        let nu = self.nu;
        let ln_z = if x < HUGE_ABSCISSA {
            nu.ln() - (nu + x * x).ln()
        } else {
            nu.ln() - 2.0 * x.ln()
        };
        let z = ln_z.exp();
        if z > TAIL_SERIES_CUTOFF {
            return (0.5 * beta_reg(0.5 * nu, 0.5, z)).ln();
        }

        let a = 0.5 * nu;
        let mut term = 1.0;
        let mut sum = 1.0;
        for n in 0..MAX_SERIES_TERMS {
            let n = n as f64;
            term *= (a + 0.5 + n) / (a + 1.0 + n) * z;
            sum += term;
            if term < 1e-17 * sum {
                break;
            }
        }
        a * ln_z + 0.5 * (-z).ln_1p() - a.ln() - self.ln_beta + sum.ln() - LN_2
    }

    /// Log survival function `ln P(T > x)`
    pub fn ln_sf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        if x >= 0.0 {
            self.ln_upper_tail(x)
        } else {
            (-self.ln_upper_tail(-x).exp()).ln_1p()
        }
    }

    /// Survival function `P(T > x)`
    pub fn sf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        if x >= 0.0 {
            self.ln_upper_tail(x).exp()
        } else {
            -self.ln_upper_tail(-x).exp_m1()
        }
    }

    /// Cumulative distribution function `P(T <= x)`
    pub fn cdf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        if x < 0.0 {
            self.ln_upper_tail(-x).exp()
        } else {
            -self.ln_upper_tail(x).exp_m1()
        }
    }

    /// Quantile function.
    ///
    /// Starts from the Cornish-Fisher expansion around the normal quantile and
    /// refines it with Newton steps on the log survival function against
    /// `ln x`, falling back to bisection whenever a step leaves the bracket.
    pub fn ppf(&self, p: f64) -> f64 {
        if p.is_nan() {
            return f64::NAN;
        }
        let p = p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
        if p == 0.5 {
            return 0.0;
        }

        if p > 0.5 {
            self.upper_tail_quantile(1.0 - p)
        } else {
            -self.upper_tail_quantile(p)
        }
    }

    /// Positive `x` with `sf(x) == tail`, for `tail < 0.5`
    fn upper_tail_quantile(&self, tail: f64) -> f64 {
        let target = tail.ln();

        // Bracket in u = ln(x); the log tail is close to linear in u
        let mut lo = MIN_LN_ABSCISSA;
        let mut hi = 0.0_f64;
        while self.ln_upper_tail(hi.exp()) > target && hi < MAX_LN_ABSCISSA {
            lo = hi;
            hi = (hi + LN_BRACKET_STEP).min(MAX_LN_ABSCISSA);
        }

        let start = cornish_fisher(-norm_ppf(tail), self.nu);
        let mut u = if start > 0.0 && start.ln() > lo && start.ln() < hi {
            start.ln()
        } else {
            0.5 * (lo + hi)
        };

        for _ in 0..MAX_QUANTILE_ITERATIONS {
            let x = u.exp();
            let ln_s = self.ln_upper_tail(x);
            let g = ln_s - target;
            if g.abs() < 1e-13 {
                break;
            }

            // ln sf is decreasing in u
            if g > 0.0 {
                lo = u;
            } else {
                hi = u;
            }

            // d ln sf / du = -x f(x) / sf(x)
            let slope = -(u + self.ln_pdf(x) - ln_s).exp();
            let mut next = u - g / slope;
            if !next.is_finite() || next <= lo || next >= hi {
                next = 0.5 * (lo + hi);
            }

            if (next - u).abs() <= 1e-15 * u.abs().max(1.0) {
                u = next;
                break;
            }
            u = next;
        }

        u.exp()
    }
}

/// Abramowitz & Stegun 26.7.5
fn cornish_fisher(z: f64, nu: f64) -> f64 {
    let z2 = z * z;
    let z3 = z2 * z;
    let z5 = z3 * z2;
    let z7 = z5 * z2;
    let z9 = z7 * z2;

    let g1 = (z3 + z) / 4.0;
    let g2 = (5.0 * z5 + 16.0 * z3 + 3.0 * z) / 96.0;
    let g3 = (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / 384.0;
    let g4 = (79.0 * z9 + 776.0 * z7 + 1482.0 * z5 - 1920.0 * z3 - 945.0 * z) / 92160.0;

    z + g1 / nu + g2 / nu.powi(2) + g3 / nu.powi(3) + g4 / nu.powi(4)
}

/// Student's t CDF with `nu` degrees of freedom
pub fn student_t_cdf(x: f64, nu: f64) -> Result<f64> {
    Ok(StudentT::new(nu)?.cdf(x))
}

/// Student's t log density with `nu` degrees of freedom
pub fn student_t_log_pdf(x: f64, nu: f64) -> Result<f64> {
    Ok(StudentT::new(nu)?.ln_pdf(x))
}

/// Student's t quantile with `nu` degrees of freedom
pub fn student_t_ppf(p: f64, nu: f64) -> Result<f64> {
    Ok(StudentT::new(nu)?.ppf(p))
}

/// Symmetric alpha-stable distribution `S(alpha, 0, 1, 0)`
///
/// `alpha == 2` gives a normal law with variance 2, `alpha == 1` the standard Cauchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricStable {
    alpha: f64,
}

impl SymmetricStable {
    /// Create a symmetric stable law with stability index `alpha` in `(0, 2]`
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 2.0) {
            return Err(MathError::InvalidInput(format!(
                "Stability index must be in (0, 2], got {}",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    /// Stability index
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Distribution<f64> for SymmetricStable {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u = PI * (rng.gen::<f64>() - 0.5);
        let w: f64 = Exp1.sample(rng);
        let a = self.alpha;

        if (a - 1.0).abs() < 1e-12 {
            return u.tan();
        }

        (a * u).sin() / u.cos().powf(1.0 / a) * (((1.0 - a) * u).cos() / w).powf((1.0 - a) / a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normal_functions() {
        assert_relative_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(norm_cdf(1.959_963_984_540_054), 0.975, epsilon = 1e-9);
        assert_relative_eq!(norm_ppf(0.975), 1.959_963_984_540_054, epsilon = 1e-8);
        assert_relative_eq!(norm_ppf(0.01), -2.326_347_874_040_841, epsilon = 1e-8);
        assert_relative_eq!(norm_log_pdf(0.0), -LN_SQRT_2PI, epsilon = 1e-15);
    }

    #[test]
    fn test_student_t_known_values() {
        let t = StudentT::new(1.0).unwrap();
        // Cauchy: F(1) = 3/4
        assert_relative_eq!(t.cdf(1.0), 0.75, epsilon = 1e-10);
        assert_relative_eq!(t.ppf(0.75), 1.0, epsilon = 1e-8);

        let t5 = StudentT::new(5.0).unwrap();
        assert_relative_eq!(t5.ppf(0.975), 2.570_581_835_636_314, epsilon = 1e-7);
        assert_relative_eq!(t5.ppf(0.025), -2.570_581_835_636_314, epsilon = 1e-7);
        assert_relative_eq!(t5.cdf(0.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_student_t_quantile_inverts_cdf() {
        for &nu in &[0.3, 1.5, 4.0, 30.0] {
            let t = StudentT::new(nu).unwrap();
            for &p in &[1e-6, 0.01, 0.2, 0.5, 0.7, 0.99, 1.0 - 1e-6] {
                let x = t.ppf(p);
                assert_relative_eq!(t.cdf(x), p, max_relative = 1e-7);
            }
        }
    }

    #[test]
    fn test_student_t_quantile_inverts_cdf_deep_in_the_tails() {
        for &nu in &[0.1, 0.2, 1.0] {
            let t = StudentT::new(nu).unwrap();
            for &p in &[1e-3, 1e-5, 1e-7, 1e-9, 1e-12] {
                let x = t.ppf(p);
                assert!(x.is_finite() && x < 0.0);
                assert_relative_eq!(t.cdf(x), p, max_relative = 1e-7);
                assert_relative_eq!(t.sf(-x), p, max_relative = 1e-7);
            }
        }
    }

    #[test]
    fn test_student_t_cauchy_tail_quantile() {
        // Cauchy: F^-1(p) = tan(pi (p - 1/2)) = -1 / tan(pi p)
        let t = StudentT::new(1.0).unwrap();
        for &p in &[1e-4, 1e-9, 1e-12] {
            let exact = -1.0 / (PI * p).tan();
            assert_relative_eq!(t.ppf(p), exact, max_relative = 1e-7);
        }
        assert_relative_eq!(t.cdf(-1e10), 1.0 / (PI * 1e10), max_relative = 1e-8);
    }

    #[test]
    fn test_student_t_tail_stays_positive_and_monotone() {
        let t = StudentT::new(0.2).unwrap();
        let mut previous = t.cdf(-1e3);
        for &x in &[-1e6, -1e9, -1e20, -1e60, -1e100] {
            let c = t.cdf(x);
            assert!(c > 0.0 && c < previous);
            previous = c;
        }
        assert!(t.ln_sf(1e200).is_finite());
        assert!(t.ln_pdf(1e200).is_finite());
    }

    #[test]
    fn test_student_t_series_matches_beta_form_at_cutoff() {
        // Just either side of z = 0.1 the two tail evaluations must agree
        let nu: f64 = 3.0;
        let t = StudentT::new(nu).unwrap();
        let x_cut = (nu * (1.0 / TAIL_SERIES_CUTOFF - 1.0)).sqrt();
        let below = t.sf(x_cut * (1.0 - 1e-9));
        let above = t.sf(x_cut * (1.0 + 1e-9));
        assert_relative_eq!(below, above, max_relative = 1e-7);
    }

    #[test]
    fn test_student_t_density_integrates() {
        let t = StudentT::new(3.0).unwrap();
        let h = 0.01;
        let area: f64 = (-4000..4000)
            .map(|i| t.ln_pdf(i as f64 * h).exp() * h)
            .sum();
        assert!((area - (t.cdf(40.0) - t.cdf(-40.0))).abs() < 1e-3);
        assert!(StudentT::new(0.0).is_err());
    }

    #[test]
    fn test_stable_gaussian_case_variance() {
        let stable = SymmetricStable::new(2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 200_000;
        let draws: Vec<f64> = (0..n).map(|_| stable.sample(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.02);
        assert!((var - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_stable_cauchy_case_median() {
        let stable = SymmetricStable::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let n = 100_000;
        let inside = (0..n)
            .filter(|_| stable.sample(&mut rng).abs() < 1.0)
            .count();
        // P(|X| < 1) = 1/2 for the standard Cauchy
        assert!((inside as f64 / n as f64 - 0.5).abs() < 0.01);
        assert!(SymmetricStable::new(2.5).is_err());
    }

    #[test]
    fn test_log_sum_exp() {
        assert_relative_eq!(log_sum_exp(&[0.0, 0.0]), 2f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(log_sum_exp(&[1000.0, 1000.0]), 1000.0 + 2f64.ln(), epsilon = 1e-9);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }
}
