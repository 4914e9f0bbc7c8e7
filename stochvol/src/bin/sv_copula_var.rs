//! Estimate stochastic log-volatility per asset and compute copula VaR

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use stochvol::config::PipelineConfig;
use stochvol::pipeline::run_pipeline;

#[derive(Parser)]
#[command(name = "sv-copula-var")]
#[command(about = "Stochastic volatility estimation and Student's t copula Value-at-Risk", long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Return data (whitespace text or .csv)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Number of leading assets to use
    #[arg(short, long)]
    assets: Option<usize>,

    /// VaR level, e.g. 0.01
    #[arg(long)]
    alpha: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the result files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Particles in the ABC filter
    #[arg(long)]
    particles: Option<usize>,

    /// Number of copula simulations
    #[arg(long)]
    simulations: Option<usize>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn into_config(self) -> stochvol::error::Result<(PipelineConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(data) = self.data {
            config.data_path = data;
        }
        if let Some(n) = self.assets {
            config.n_assets = n;
        }
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = Some(dir);
        }
        if let Some(n) = self.particles {
            config.estimation.smc.n_particles = n;
        }
        if let Some(n) = self.simulations {
            config.var.n_simulations = n;
        }
        config.validate()?;
        Ok((config, self.print_config))
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, print_only) = match Cli::parse().into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if print_only {
        return match config.to_json_string() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    match run_pipeline(&config) {
        Ok(report) => {
            for asset in &report.assets {
                let p = asset.estimate.parameters;
                println!(
                    "{:<20} mu = {:>8.4}  phi = {:>6.4}  sigma_v = {:>6.4}  alpha = {:>6.4}",
                    asset.name, p.mu, p.phi, p.sigma_v, p.alpha
                );
            }
            println!("Copula degrees of freedom: {:.3}", report.var.copula.copula.nu());
            println!("Spearman correlations of copula draws: {:?}", report.var.spearman);
            if let Some(last) = report.var.mean_var.last() {
                println!("Mean {:.0}% VaR in the last period: {:.4}", 100.0 * config.alpha, last);
            }
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
