//! Return panel loading and handling

use crate::error::{Result, SvError};
use chrono::NaiveDate;
use nalgebra::DMatrix;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;

/// A panel of returns: `n_obs` periods for `n_assets` assets, stored column by column
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPanel {
    /// Period labels (usually dates) from the first column of the input
    index: Vec<String>,
    /// Asset names
    names: Vec<String>,
    /// One return series per asset
    columns: Vec<Vec<f64>>,
}

/// Data loader for return panels
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a whitespace-delimited numeric text file.
    ///
    /// The first `skip_rows` physical lines are skipped, blank ones included; if
    /// the last skipped line holds one name per return column, those become the
    /// asset names. The first column of every remaining row is the period label,
    /// the rest are returns. Blank lines after the header are ignored.
    pub fn from_text<P: AsRef<Path>>(path: P, skip_rows: usize) -> Result<ReturnPanel> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        let mut header: Option<Vec<String>> = None;
        let mut body_start = 0;
        for (skipped, line) in text.split_inclusive('\n').take(skip_rows).enumerate() {
            body_start += line.len();
            if skipped + 1 == skip_rows {
                header = Some(split_tokens(line).map(str::to_string).collect());
            }
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b' ')
            .flexible(true)
            .from_reader(text[body_start..].as_bytes());

        let mut index = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();

        for record in reader.records() {
            let record = record?;
            let line = skip_rows + record.position().map_or(0, |p| p.line() as usize);
            let tokens: Vec<&str> = record.iter().flat_map(split_tokens).collect();

            if tokens.is_empty() {
                continue;
            }
            if tokens.len() < 2 {
                return Err(SvError::DataError(format!(
                    "Line {} of {} has no return columns",
                    line,
                    path.display()
                )));
            }

            let values = tokens[1..]
                .iter()
                .map(|t| {
                    t.parse::<f64>().map_err(|_| {
                        SvError::DataError(format!(
                            "Line {}: cannot parse '{}' as a number",
                            line,
                            t
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            if let Some(first) = rows.first() {
                if first.len() != values.len() {
                    return Err(SvError::DataError(format!(
                        "Line {} has {} return columns, expected {}",
                        line,
                        values.len(),
                        first.len()
                    )));
                }
            }

            index.push(tokens[0].to_string());
            rows.push(values);
        }

        if rows.is_empty() {
            return Err(SvError::DataError(format!(
                "No data rows found in {}",
                path.display()
            )));
        }

        let n_assets = rows[0].len();
        let columns: Vec<Vec<f64>> = (0..n_assets)
            .map(|j| rows.iter().map(|row| row[j]).collect())
            .collect();

        let names = match header {
            Some(h) if h.len() == n_assets => h,
            Some(h) if h.len() == n_assets + 1 => h[1..].to_vec(),
            _ => default_names(n_assets),
        };

        ReturnPanel::new(index, names, columns)
    }

    /// Load a comma-separated file with a header row.
    ///
    /// The first column is the period label, every other column a return series.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<ReturnPanel> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Create a return panel from an existing DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<ReturnPanel> {
        let columns = df.get_columns();
        if columns.len() < 2 {
            return Err(SvError::DataError(
                "Expected an index column followed by at least one return column".to_string(),
            ));
        }

        let index_series = columns[0].cast(&DataType::Utf8)?;
        let index: Vec<String> = index_series
            .utf8()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect();

        let mut names = Vec::with_capacity(columns.len() - 1);
        let mut values = Vec::with_capacity(columns.len() - 1);
        for series in &columns[1..] {
            let cast = series.cast(&DataType::Float64)?;
            let column = cast
                .f64()?
                .into_iter()
                .map(|v| {
                    v.ok_or_else(|| {
                        SvError::DataError(format!("Missing value in column '{}'", series.name()))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            names.push(series.name().to_string());
            values.push(column);
        }

        ReturnPanel::new(index, names, values)
    }
}

fn split_tokens(field: &str) -> std::str::SplitWhitespace<'_> {
    field.split_whitespace()
}

fn default_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("asset_{}", i)).collect()
}

impl ReturnPanel {
    /// Create a validated return panel
    pub fn new(index: Vec<String>, names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(SvError::DataError(
                "Return panel needs at least one asset".to_string(),
            ));
        }
        if names.len() != columns.len() {
            return Err(SvError::DataError(format!(
                "{} names given for {} columns",
                names.len(),
                columns.len()
            )));
        }
        for (name, column) in names.iter().zip(columns.iter()) {
            if column.len() != index.len() {
                return Err(SvError::DataError(format!(
                    "Column '{}' has {} observations, index has {}",
                    name,
                    column.len(),
                    index.len()
                )));
            }
            if column.iter().any(|v| !v.is_finite()) {
                return Err(SvError::DataError(format!(
                    "Column '{}' contains non-finite values",
                    name
                )));
            }
        }

        Ok(Self {
            index,
            names,
            columns,
        })
    }

    /// Create a panel with default names and a running integer index (for testing)
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        let n_obs = columns.first().map_or(0, Vec::len);
        let index = (0..n_obs).map(|i| i.to_string()).collect();
        let names = default_names(columns.len());
        Self::new(index, names, columns)
    }

    /// Number of periods
    pub fn n_obs(&self) -> usize {
        self.index.len()
    }

    /// Number of assets
    pub fn n_assets(&self) -> usize {
        self.columns.len()
    }

    /// Period labels
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Asset names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// All return series
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Return series of asset `i`
    pub fn column(&self, i: usize) -> Result<&[f64]> {
        self.columns.get(i).map(Vec::as_slice).ok_or_else(|| {
            SvError::DataError(format!(
                "Asset {} out of range, panel has {} assets",
                i,
                self.n_assets()
            ))
        })
    }

    /// Keep only the first `n` assets
    pub fn select_first(&self, n: usize) -> Result<Self> {
        if n == 0 || n > self.n_assets() {
            return Err(SvError::InvalidParameter(format!(
                "Cannot select {} assets from a panel of {}",
                n,
                self.n_assets()
            )));
        }
        Self::new(
            self.index.clone(),
            self.names[..n].to_vec(),
            self.columns[..n].to_vec(),
        )
    }

    /// Returns as a `n_obs x n_assets` matrix
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n_obs(), self.n_assets(), |t, i| self.columns[i][t])
    }

    /// Parse the period labels as dates.
    ///
    /// Accepts `YYYYMM` (first day of the month), `YYYYMMDD` and `YYYY-MM-DD`.
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        self.index.iter().map(|label| parse_period(label)).collect()
    }
}

/// Parse a period label into a date
pub fn parse_period(label: &str) -> Result<NaiveDate> {
    let label = label.trim();
    let parsed = match label.len() {
        6 if label.chars().all(|c| c.is_ascii_digit()) => {
            NaiveDate::parse_from_str(&format!("{}01", label), "%Y%m%d").ok()
        }
        8 if label.chars().all(|c| c.is_ascii_digit()) => {
            NaiveDate::parse_from_str(label, "%Y%m%d").ok()
        }
        _ => NaiveDate::parse_from_str(label, "%Y-%m-%d").ok(),
    };

    parsed.ok_or_else(|| SvError::DataError(format!("Cannot parse '{}' as a date", label)))
}
