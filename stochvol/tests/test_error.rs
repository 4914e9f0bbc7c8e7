use stoch_math::MathError;
use stochvol::SvError;

#[test]
fn test_error_display() {
    let err = SvError::DataError("missing column".to_string());
    assert_eq!(err.to_string(), "Data error: missing column");

    let err = SvError::ModelError("no particles stored".to_string());
    assert_eq!(err.to_string(), "Model error: no particles stored");

    let err = SvError::InvalidParameter("phi".to_string());
    assert_eq!(err.to_string(), "Invalid parameter: phi");

    let err = SvError::ConvergenceError("flat surrogate".to_string());
    assert_eq!(err.to_string(), "Convergence error: flat surrogate");
}

#[test]
fn test_from_math_error() {
    let err: SvError = MathError::NotPositiveDefinite("pivot 2".to_string()).into();
    assert!(matches!(err, SvError::Math(_)));
    assert_eq!(err.to_string(), "Math error: Matrix is not positive definite: pivot 2");
}

#[test]
fn test_from_io_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: SvError = io.into();
    assert!(matches!(err, SvError::IoError(_)));
    assert!(err.to_string().contains("gone"));
}

#[test]
fn test_from_json_error() {
    let json = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
    let err: SvError = json.into();
    assert!(matches!(err, SvError::JsonError(_)));
}

#[test]
fn test_from_csv_error() {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader("1,2\n3\n".as_bytes());
    let csv_err = reader
        .records()
        .find_map(|r| r.err())
        .expect("ragged rows are rejected");
    let err: SvError = csv_err.into();
    assert!(matches!(err, SvError::CsvError(_)));
}
