//! Pipeline configuration
//!
//! Every field has a default, so a JSON file only needs the values it changes.

use crate::error::{Result, SvError};
use crate::estimate::EstimationSettings;
use crate::var::VarSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Layout of the input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Pick by file extension: `.csv` is comma separated, everything else whitespace text
    #[default]
    Auto,
    /// Whitespace-delimited text with `skip_rows` header lines
    Text,
    /// Comma-separated with a header row
    Csv,
}

impl DataFormat {
    /// Resolve `Auto` against a path
    pub fn resolve(&self, path: &Path) -> DataFormat {
        match self {
            DataFormat::Auto => match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("csv") => DataFormat::Csv,
                _ => DataFormat::Text,
            },
            other => *other,
        }
    }
}

/// Configuration of a full estimation and VaR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub data_format: DataFormat,
    /// Header lines skipped in text input
    pub skip_rows: usize,
    /// Number of leading return columns used
    pub n_assets: usize,
    /// VaR level
    pub alpha: f64,
    /// Seed of asset `i` is `seed + i`; the VaR simulation uses `seed + n_assets`
    pub seed: u64,
    /// Where results are written; nothing is written when absent
    pub output_dir: Option<PathBuf>,
    pub estimation: EstimationSettings,
    pub var: VarSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/30_industry_portfolios_marketweighted.txt"),
            data_format: DataFormat::Auto,
            skip_rows: 1,
            n_assets: 2,
            alpha: 0.01,
            seed: 0,
            output_dir: None,
            estimation: EstimationSettings::default(),
            var: VarSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialise to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.n_assets < 2 {
            return Err(SvError::InvalidParameter(format!(
                "The copula needs at least two assets, got n_assets = {}",
                self.n_assets
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(SvError::InvalidParameter(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if let Some(weights) = &self.var.portfolio_weights {
            if weights.len() != self.n_assets {
                return Err(SvError::InvalidParameter(format!(
                    "{} portfolio weights for {} assets",
                    weights.len(),
                    self.n_assets
                )));
            }
        }
        if self.var.n_simulations < 2 {
            return Err(SvError::InvalidParameter(
                "At least two VaR simulations are required".to_string(),
            ));
        }
        self.var.copula.validate()?;
        self.estimation.validate()
    }
}
