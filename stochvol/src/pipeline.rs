//! End-to-end run: load returns, estimate log-volatility per asset, compute VaR

use crate::config::{DataFormat, PipelineConfig};
use crate::data::{DataLoader, ReturnPanel};
use crate::error::{Result, SvError};
use crate::estimate::{estimate_log_volatility, GpoSummary, LogVolatilityEstimate};
use crate::models::SvParameters;
use crate::var::{compute_value_at_risk, fitted_correlation_pairs, ValueAtRiskReport};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;

/// File name of the per-period results
pub const RESULTS_CSV: &str = "value_at_risk.csv";
/// File name of the run summary
pub const SUMMARY_JSON: &str = "summary.json";

/// Estimate for one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetEstimate {
    pub name: String,
    pub estimate: LogVolatilityEstimate,
}

/// Everything a pipeline run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Period labels
    pub index: Vec<String>,
    pub assets: Vec<AssetEstimate>,
    pub var: ValueAtRiskReport,
}

#[derive(Debug, Serialize)]
struct AssetSummary<'a> {
    name: &'a str,
    parameters: SvParameters,
    log_likelihood: f64,
    gpo: &'a GpoSummary,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    alpha: f64,
    n_obs: usize,
    assets: Vec<AssetSummary<'a>>,
    copula_nu: f64,
    copula_correlation: &'a [Vec<f64>],
    copula_correlation_pairs: Vec<f64>,
    spearman: &'a [f64],
    portfolio_weights: &'a [f64],
}

impl PipelineReport {
    /// Write one row per period: log-volatility and VaR per asset, mean and portfolio VaR
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["period".to_string()];
        header.extend(self.assets.iter().map(|a| format!("log_volatility_{}", a.name)));
        header.extend(self.assets.iter().map(|a| format!("var_{}", a.name)));
        header.extend(self.assets.iter().map(|a| format!("es_{}", a.name)));
        header.push("mean_var".to_string());
        header.push("portfolio_var".to_string());
        writer.write_record(&header)?;

        for (t, period) in self.index.iter().enumerate() {
            let mut row = vec![period.clone()];
            row.extend(self.assets.iter().map(|a| a.estimate.log_volatility[t].to_string()));
            row.extend(self.var.var.iter().map(|v| v[t].to_string()));
            row.extend(self.var.expected_shortfall.iter().map(|v| v[t].to_string()));
            row.push(self.var.mean_var[t].to_string());
            row.push(self.var.portfolio_var[t].to_string());
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Write parameters, copula fit and correlations as JSON
    pub fn write_summary_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let summary = RunSummary {
            alpha: self.var.alpha,
            n_obs: self.index.len(),
            assets: self
                .assets
                .iter()
                .map(|a| AssetSummary {
                    name: &a.name,
                    parameters: a.estimate.parameters,
                    log_likelihood: a.estimate.log_likelihood,
                    gpo: &a.estimate.gpo,
                })
                .collect(),
            copula_nu: self.var.copula.copula.nu(),
            copula_correlation: &self.var.copula.correlation,
            copula_correlation_pairs: fitted_correlation_pairs(&self.var.copula),
            spearman: &self.var.spearman,
            portfolio_weights: &self.var.portfolio_weights,
        };
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &summary)?;
        Ok(())
    }

    /// Write both result files into `dir`, creating it if needed
    pub fn write_outputs<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.write_csv(dir.join(RESULTS_CSV))?;
        self.write_summary_json(dir.join(SUMMARY_JSON))?;
        info!("Results written to {}", dir.display());
        Ok(())
    }
}

/// Load the return panel named by the configuration
pub fn load_panel(config: &PipelineConfig) -> Result<ReturnPanel> {
    let panel = match config.data_format.resolve(&config.data_path) {
        DataFormat::Csv => DataLoader::from_csv(&config.data_path)?,
        _ => DataLoader::from_text(&config.data_path, config.skip_rows)?,
    };
    info!(
        "Loaded {} periods of {} assets from {}",
        panel.n_obs(),
        panel.n_assets(),
        config.data_path.display()
    );
    Ok(panel)
}

/// Run the configured pipeline from the data file
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    let panel = load_panel(config)?;
    run_on_panel(&panel, config)
}

/// Run the pipeline on an already loaded panel
pub fn run_on_panel(panel: &ReturnPanel, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    if panel.n_assets() < config.n_assets {
        return Err(SvError::DataError(format!(
            "Data has {} assets, {} requested",
            panel.n_assets(),
            config.n_assets
        )));
    }
    let panel = panel.select_first(config.n_assets)?;

    let mut assets = Vec::with_capacity(panel.n_assets());
    for (i, name) in panel.names().iter().enumerate() {
        info!("Estimating log-volatility of {} ({}/{})", name, i + 1, panel.n_assets());
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
        let estimate = estimate_log_volatility(panel.column(i)?, &config.estimation, &mut rng)?;
        assets.push(AssetEstimate {
            name: name.clone(),
            estimate,
        });
    }

    let log_volatility: Vec<Vec<f64>> = assets
        .iter()
        .map(|a| a.estimate.log_volatility.clone())
        .collect();
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(panel.n_assets() as u64));
    let var = compute_value_at_risk(&log_volatility, panel.columns(), config.alpha, &config.var, &mut rng)?;

    let report = PipelineReport {
        index: panel.index().to_vec(),
        assets,
        var,
    };
    if let Some(dir) = &config.output_dir {
        report.write_outputs(dir)?;
    }
    Ok(report)
}
