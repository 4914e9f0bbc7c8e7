use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::io::Write;
use stochvol::data::{parse_period, DataLoader, ReturnPanel};
use stochvol::SvError;
use tempfile::NamedTempFile;

fn text_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

#[test]
fn test_from_text_with_header() {
    let file = text_file(&[
        "date USA Asia Sweden",
        "192607  1.20 -0.50  0.30",
        "192608\t2.10\t0.40\t-1.10",
        "192609  -0.70  0.90  0.00",
    ]);

    let panel = DataLoader::from_text(file.path(), 1).unwrap();

    assert_eq!(panel.n_obs(), 3);
    assert_eq!(panel.n_assets(), 3);
    assert_eq!(panel.names(), &["USA", "Asia", "Sweden"]);
    assert_eq!(panel.index(), &["192607", "192608", "192609"]);
    assert_eq!(panel.column(1).unwrap(), &[-0.5, 0.4, 0.9]);
}

#[test]
fn test_from_text_without_usable_header_uses_default_names() {
    let file = text_file(&["monthly value weighted returns", "1 0.1 0.2", "2 0.3 0.4"]);

    let panel = DataLoader::from_text(file.path(), 1).unwrap();

    assert_eq!(panel.names(), &["asset_0", "asset_1"]);
    assert_eq!(panel.column(0).unwrap(), &[0.1, 0.3]);
}

#[test]
fn test_from_text_rejects_ragged_rows() {
    let file = text_file(&["date a b", "1 0.1 0.2", "2 0.3"]);
    let result = DataLoader::from_text(file.path(), 1);
    assert!(matches!(result, Err(SvError::DataError(_))));
}

#[test]
fn test_from_text_rejects_non_numeric_cells() {
    let file = text_file(&["date a", "1 0.1", "2 abc"]);
    let result = DataLoader::from_text(file.path(), 1);
    assert!(matches!(result, Err(SvError::DataError(_))));
}

#[test]
fn test_from_text_skip_rows_counts_blank_lines() {
    let file = text_file(&["Average value weighted returns", "", "date a b", "192607 0.1 0.2", "", "192608 0.3 0.4"]);

    let panel = DataLoader::from_text(file.path(), 3).unwrap();

    assert_eq!(panel.names(), &["a", "b"]);
    assert_eq!(panel.index(), &["192607", "192608"]);
    assert_eq!(panel.column(1).unwrap(), &[0.2, 0.4]);
}

#[test]
fn test_from_text_reports_physical_line_numbers() {
    let file = text_file(&["date a", "", "1 0.1", "2 abc"]);
    match DataLoader::from_text(file.path(), 2) {
        Err(SvError::DataError(msg)) => assert!(msg.starts_with("Line 4:"), "{}", msg),
        other => panic!("expected a data error, got {:?}", other),
    }
}

#[test]
fn test_from_text_rejects_empty_file() {
    let file = text_file(&["date a b"]);
    assert!(DataLoader::from_text(file.path(), 1).is_err());
}

#[test]
fn test_from_csv() {
    let file = text_file(&[
        "period,usa,asia",
        "202001,0.5,-0.25",
        "202002,1.5,0.75",
        "202003,-1.0,0.0",
    ]);

    let panel = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(panel.n_obs(), 3);
    assert_eq!(panel.names(), &["usa", "asia"]);
    assert_eq!(panel.index()[0], "202001");
    assert_eq!(panel.column(0).unwrap(), &[0.5, 1.5, -1.0]);
}

#[test]
fn test_from_csv_missing_file() {
    assert!(DataLoader::from_csv("nonexistent_returns.csv").is_err());
}

#[test]
fn test_panel_validation() {
    let index = vec!["1".to_string(), "2".to_string()];
    let names = vec!["a".to_string()];

    let short = ReturnPanel::new(index.clone(), names.clone(), vec![vec![1.0]]);
    assert!(short.is_err());

    let non_finite = ReturnPanel::new(index.clone(), names.clone(), vec![vec![1.0, f64::NAN]]);
    assert!(non_finite.is_err());

    let wrong_names = ReturnPanel::new(index, vec![], vec![vec![1.0, 2.0]]);
    assert!(wrong_names.is_err());
}

#[test]
fn test_select_first_and_matrix() {
    let panel =
        ReturnPanel::from_columns(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();

    let first_two = panel.select_first(2).unwrap();
    assert_eq!(first_two.n_assets(), 2);
    assert_eq!(first_two.names(), &["asset_0", "asset_1"]);
    assert!(panel.select_first(0).is_err());
    assert!(panel.select_first(4).is_err());

    let m = panel.to_matrix();
    assert_eq!((m.nrows(), m.ncols()), (2, 3));
    assert_eq!(m[(1, 2)], 6.0);
    assert!(panel.column(3).is_err());
}

#[test]
fn test_period_parsing() {
    assert_eq!(
        parse_period("192607").unwrap(),
        NaiveDate::from_ymd_opt(1926, 7, 1).unwrap()
    );
    assert_eq!(
        parse_period("20240229").unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert_eq!(
        parse_period("2023-12-31").unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
    );
    assert!(parse_period("192613").is_err());
    assert!(parse_period("yesterday").is_err());

    let file = text_file(&["date a", "202001 0.1", "202002 0.2"]);
    let dates = DataLoader::from_text(file.path(), 1).unwrap().dates().unwrap();
    assert_eq!(dates[1], NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
}
