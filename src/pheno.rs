//! Flat-file phenotype/covariate loading.
//!
//! Phenotype and covariate files share one whitespace-delimited format: two
//! leading id columns (family id, individual id) followed by numeric value
//! columns. A header line is recognized by its first token: `FID` for the
//! two-id form, `ID` for a single-id form whose one id doubles as both family
//! and individual id. Fields equal to the missing sentinel become NaN before
//! any downstream statistics see the data.

use log::warn;
use ndarray::Array2;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// The legacy missing-value sentinel of phenotype files.
pub const DEFAULT_MISSING: &str = "-9";

/// Family and individual identifiers of one sample row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleId {
    pub family: String,
    pub individual: String,
}

/// A loaded phenotype/covariate table: optional column names, an N x K value
/// matrix with missing entries mapped to NaN, and per-row sample ids.
#[derive(Clone, Debug)]
pub struct PhenoTable {
    pub header: Option<Vec<String>>,
    pub values: Array2<f64>,
    pub ids: Vec<SampleId>,
}

#[derive(Error, Debug)]
pub enum PhenoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("phenotype file line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("phenotype column index {index} is out of range; the file has {count} column(s)")]
    ColumnOutOfRange { index: usize, count: usize },
}

/// Loads a phenotype or covariate file. Covariates use the same format.
///
/// `missing` is the sentinel string whose fields become NaN. Rows are returned
/// in file order; no rows are dropped, so all-missing entries survive as NaN
/// for the standardization engine to handle.
pub fn load_pheno(path: &Path, missing: &str) -> Result<PhenoTable, PhenoError> {
    if missing == DEFAULT_MISSING {
        warn!("load_pheno is using the legacy default missing value of '-9'");
    }

    let reader = BufReader::new(File::open(path)?);
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            continue;
        }
        rows.push((index + 1, tokens));
    }
    if rows.is_empty() {
        return Err(PhenoError::Parse {
            line: 0,
            message: "file contains no data rows".into(),
        });
    }

    let width = rows[0].1.len();
    for (line, tokens) in &rows {
        if tokens.len() != width {
            return Err(PhenoError::Parse {
                line: *line,
                message: format!("expected {width} column(s), found {}", tokens.len()),
            });
        }
    }

    // Header detection: a leading `ID` means one id column doubles as family
    // and individual id; a leading `FID` means two id columns; anything else
    // is headerless data with two id columns.
    let (header, data_rows, id_columns) = match rows[0].1[0].as_str() {
        "ID" => (Some(rows[0].1[1..].to_vec()), &rows[1..], 1),
        "FID" => (Some(rows[0].1[2..].to_vec()), &rows[1..], 2),
        _ => (None, &rows[..], 2),
    };
    if width < id_columns {
        return Err(PhenoError::Parse {
            line: rows[0].0,
            message: format!("expected at least {id_columns} id column(s)"),
        });
    }

    let sample_count = data_rows.len();
    let value_count = width - id_columns;
    let mut ids = Vec::with_capacity(sample_count);
    let mut flat = Vec::with_capacity(sample_count * value_count);
    for (line, tokens) in data_rows {
        ids.push(match id_columns {
            1 => SampleId {
                family: tokens[0].clone(),
                individual: tokens[0].clone(),
            },
            _ => SampleId {
                family: tokens[0].clone(),
                individual: tokens[1].clone(),
            },
        });
        for token in &tokens[id_columns..] {
            if token == missing {
                flat.push(f64::NAN);
            } else {
                flat.push(token.parse::<f64>().map_err(|_| PhenoError::Parse {
                    line: *line,
                    message: format!("invalid numeric value '{token}'"),
                })?);
            }
        }
    }

    let values = Array2::from_shape_vec((sample_count, value_count), flat).map_err(|err| {
        PhenoError::Parse {
            line: 0,
            message: err.to_string(),
        }
    })?;
    Ok(PhenoTable {
        header,
        values,
        ids,
    })
}

/// Loads one column of a phenotype file and removes any rows whose value for
/// that column is missing.
pub fn load_one_pheno(
    path: &Path,
    phenotype: usize,
    missing: &str,
) -> Result<PhenoTable, PhenoError> {
    let table = load_pheno(path, missing)?;
    if phenotype >= table.values.ncols() {
        return Err(PhenoError::ColumnOutOfRange {
            index: phenotype,
            count: table.values.ncols(),
        });
    }

    let keep: Vec<usize> = (0..table.values.nrows())
        .filter(|&row| !table.values[[row, phenotype]].is_nan())
        .collect();
    let mut flat = Vec::with_capacity(keep.len());
    let mut ids = Vec::with_capacity(keep.len());
    for &row in &keep {
        flat.push(table.values[[row, phenotype]]);
        ids.push(table.ids[row].clone());
    }
    let values = Array2::from_shape_vec((keep.len(), 1), flat).map_err(|err| PhenoError::Parse {
        line: 0,
        message: err.to_string(),
    })?;
    let header = table
        .header
        .map(|names| vec![names[phenotype].clone()]);
    Ok(PhenoTable {
        header,
        values,
        ids,
    })
}
