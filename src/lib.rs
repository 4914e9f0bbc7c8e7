//! # SV Copula Workspace
//!
//! Umbrella crate over the workspace members:
//!
//! - [`stoch_math`]: distributions, rank statistics, quantiles, linear algebra
//!   and bounded optimisation
//! - [`stochvol`]: stochastic log-volatility estimation and Student's t copula
//!   Value-at-Risk
//!
//! ## Example
//!
//! ```
//! use sv_copula_workspace::stoch_math::quantile;
//!
//! let q = quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5).unwrap();
//! assert_eq!(q, 3.0);
//! ```

pub use stoch_math;
pub use stochvol;

pub use stochvol::{run_pipeline, PipelineConfig, PipelineReport, SvError};
