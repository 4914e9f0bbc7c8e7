//! # Stochvol
//!
//! Stochastic log-volatility estimation and copula-based Value-at-Risk for
//! portfolios of financial returns.
//!
//! ## Features
//!
//! - Return panel loading from whitespace text or CSV files
//! - A stochastic volatility model with alpha-stable returns
//! - Bootstrap particle filtering with approximate Bayesian computation (ABC)
//! - Forward-filtering backward-simulation (FFBSi) smoothing
//! - Gaussian process optimisation of noisy log-likelihood estimates
//! - Student's t copula fitting and simulation
//! - Per-asset, mean and portfolio VaR with expected shortfall
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stochvol::config::PipelineConfig;
//! use stochvol::pipeline::run_pipeline;
//!
//! let mut config = PipelineConfig::default();
//! config.data_path = "returns.txt".into();
//! config.n_assets = 3;
//!
//! let report = run_pipeline(&config)?;
//! println!("Mean VaR in the last period: {:?}", report.var.mean_var.last());
//! # Ok::<(), stochvol::SvError>(())
//! ```
//!
//! The building blocks can be used on their own:
//!
//! ```rust,no_run
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use stochvol::estimate::{estimate_log_volatility, EstimationSettings};
//!
//! let returns: Vec<f64> = vec![0.01; 250];
//! let mut rng = StdRng::seed_from_u64(42);
//! let estimate = estimate_log_volatility(&returns, &EstimationSettings::default(), &mut rng)?;
//! println!("phi = {:.3}", estimate.parameters.phi);
//! # Ok::<(), stochvol::SvError>(())
//! ```

pub mod config;
pub mod copula;
pub mod data;
pub mod error;
pub mod estimate;
pub mod gpo;
pub mod models;
pub mod pipeline;
pub mod smc;
pub mod var;

// Re-export commonly used types
pub use crate::config::PipelineConfig;
pub use crate::copula::{CopulaFit, StudentTCopula};
pub use crate::data::{DataLoader, ReturnPanel};
pub use crate::error::SvError;
pub use crate::estimate::{estimate_log_volatility, EstimationSettings, LogVolatilityEstimate};
pub use crate::gpo::{GaussianProcessOptimizer, GpoSettings};
pub use crate::models::{HwsvAlphaModel, StateSpaceModel, SvParameters};
pub use crate::pipeline::{run_pipeline, PipelineReport};
pub use crate::smc::{abc_bootstrap_filter, ffbsi_smoother, SmcSettings, SmootherSettings};
pub use crate::var::{compute_value_at_risk, ValueAtRiskReport, VarSettings};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
