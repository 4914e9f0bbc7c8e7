use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::Path;
use stochvol::config::{DataFormat, PipelineConfig};
use stochvol::smc::AbcKernel;
use stochvol::SvError;
use tempfile::NamedTempFile;

#[test]
fn test_default_config_is_valid() {
    let config = PipelineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.n_assets, 2);
    assert_eq!(config.alpha, 0.01);
    assert_eq!(config.skip_rows, 1);
    assert_eq!(config.estimation.smc.n_particles, 5000);
    assert_eq!(config.var.n_simulations, 100_000);
    assert!(config.output_dir.is_none());
}

#[test]
fn test_partial_json_keeps_defaults() {
    let json = r#"{
        "n_assets": 3,
        "alpha": 0.05,
        "estimation": { "smc": { "n_particles": 300, "kernel": "boxcar" } },
        "var": { "n_simulations": 1000 }
    }"#;
    let config = PipelineConfig::from_json_str(json).unwrap();

    assert_eq!(config.n_assets, 3);
    assert_eq!(config.alpha, 0.05);
    assert_eq!(config.estimation.smc.n_particles, 300);
    assert_eq!(config.estimation.smc.kernel, AbcKernel::Boxcar);
    assert_eq!(config.estimation.smc.tolerance, 0.10);
    assert_eq!(config.estimation.smoother.n_paths, 50);
    assert_eq!(config.var.n_simulations, 1000);
    assert_eq!(config.seed, 0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_json_round_trip() {
    let mut config = PipelineConfig::default();
    config.seed = 17;
    config.output_dir = Some("out".into());
    config.var.portfolio_weights = Some(vec![0.3, 0.7]);

    let json = config.to_json_string().unwrap();
    let parsed = PipelineConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{ "data_path": "returns.csv", "seed": 5 }}"#).unwrap();

    let config = PipelineConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.data_path, Path::new("returns.csv"));
    assert_eq!(config.seed, 5);

    assert!(matches!(
        PipelineConfig::from_json_file("/nonexistent/config.json"),
        Err(SvError::IoError(_))
    ));
}

#[test]
fn test_malformed_json() {
    assert!(matches!(
        PipelineConfig::from_json_str("{ n_assets: 2"),
        Err(SvError::JsonError(_))
    ));
    assert!(matches!(
        PipelineConfig::from_json_str(r#"{ "estimation": { "smc": { "kernel": "triangle" } } }"#),
        Err(SvError::JsonError(_))
    ));
}

#[test]
fn test_validation() {
    let one_asset = PipelineConfig {
        n_assets: 1,
        ..PipelineConfig::default()
    };
    assert!(matches!(one_asset.validate(), Err(SvError::InvalidParameter(_))));

    let bad_alpha = PipelineConfig {
        alpha: 1.5,
        ..PipelineConfig::default()
    };
    assert!(bad_alpha.validate().is_err());

    let mut bad_weights = PipelineConfig::default();
    bad_weights.var.portfolio_weights = Some(vec![1.0, 0.0, 0.0]);
    assert!(bad_weights.validate().is_err());

    let mut bad_particles = PipelineConfig::default();
    bad_particles.estimation.smc.n_particles = 1;
    assert!(bad_particles.validate().is_err());

    let mut bad_gpo_dim = PipelineConfig::default();
    bad_gpo_dim.estimation.gpo.initial_params = vec![0.0, 0.9];
    bad_gpo_dim.estimation.gpo.lower_bounds = vec![-1.0, 0.8];
    bad_gpo_dim.estimation.gpo.upper_bounds = vec![1.0, 1.0];
    assert!(bad_gpo_dim.validate().is_err());
}

#[test]
fn test_data_format_resolution() {
    assert_eq!(DataFormat::Auto.resolve(Path::new("a/returns.csv")), DataFormat::Csv);
    assert_eq!(DataFormat::Auto.resolve(Path::new("returns.CSV")), DataFormat::Csv);
    assert_eq!(DataFormat::Auto.resolve(Path::new("returns.txt")), DataFormat::Text);
    assert_eq!(DataFormat::Auto.resolve(Path::new("returns")), DataFormat::Text);
    assert_eq!(DataFormat::Text.resolve(Path::new("returns.csv")), DataFormat::Text);
    assert_eq!(DataFormat::Csv.resolve(Path::new("returns.txt")), DataFormat::Csv);
}
