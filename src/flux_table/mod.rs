//! # Per-observation flux tables
//!
//! The extraction stage of the pipeline writes one row per flux observation, for the fakes and for
//! the simulation. This module reads such a table into a columnar [`FluxTable`] holding only the
//! columns needed to build the maps.
//!
//! ## Format
//! -----------------
//! - Whitespace-delimited text, optionally gzip-compressed (`.gz`).
//! - Lines starting with `#` and blank lines are skipped.
//! - The first remaining line is the header; each token is a column name. A leading key token such
//!   as `VARNAMES:` is simply a column, matched by the `OBS:`/`ROW:` key of each data line.
//! - Every data line must have as many tokens as the header.
//!
//! ## Columns
//! -----------------
//! Always required: `FLUXCAL_DATA`, `FLUXCAL_TRUE`, `FLUXCAL_ERR_DATA`, `FLUXCAL_ERR_CALC`,
//! `IFILTOBS`, `BAND`, and one column per continuous map variable. `FIELD` is required only for
//! field-dependent maps. `NSIG` is read when present.
//!
//! ## See also
//! ------------
//! * [`prepare::prepare_table`] – Derived columns and cell assignment.
pub mod prepare;

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    str::FromStr,
};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use log::info;

use crate::{
    constants::{
        COL_BAND, COL_ERR_CALC, COL_ERR_DATA, COL_FIELD, COL_FLUX_DATA, COL_FLUX_TRUE,
        COL_IFILTOBS, COL_NSIG,
    },
    fluxerr_errors::FluxErrError,
    grid::GridDefinition,
};

/// Which optional columns a table must provide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableColumns {
    /// Continuous map variables, read as `f64`.
    pub variables: Vec<String>,
    /// Whether the `FIELD` column is required.
    pub field: bool,
}

impl TableColumns {
    /// Columns needed to bin a table on `grid`.
    pub fn for_grid(grid: &GridDefinition) -> Self {
        TableColumns {
            variables: grid
                .continuous_axes()
                .map(|(_, dim)| dim.name.clone())
                .collect(),
            field: grid.field_axis().is_some(),
        }
    }
}

/// Columnar flux table.
///
/// All vectors have the same length, one entry per observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxTable {
    /// Table name used in messages (usually the file path).
    pub name: String,
    pub flux_data: Vec<f64>,
    pub flux_true: Vec<f64>,
    pub err_data: Vec<f64>,
    pub err_calc: Vec<f64>,
    pub ifiltobs: Vec<i64>,
    pub band: Vec<String>,
    pub field: Option<Vec<String>>,
    pub nsig: Option<Vec<f64>>,
    pub variables: HashMap<String, Vec<f64>, RandomState>,
}

/// One column being filled while the table is scanned.
trait ColumnSink {
    fn push(&mut self, table: &str, tokens: &[&str]) -> Result<(), FluxErrError>;
}

struct ColumnReader<T> {
    name: String,
    position: usize,
    values: Vec<T>,
}

impl<T> ColumnReader<T> {
    fn new(name: &str, position: usize) -> Self {
        ColumnReader {
            name: name.to_string(),
            position,
            values: Vec::new(),
        }
    }
}

impl<T: FromStr> ColumnSink for ColumnReader<T> {
    fn push(&mut self, table: &str, tokens: &[&str]) -> Result<(), FluxErrError> {
        let token = tokens[self.position];
        let value = token
            .parse::<T>()
            .map_err(|_| FluxErrError::InvalidTableValue {
                table: table.to_string(),
                column: self.name.clone(),
                value: token.to_string(),
            })?;
        self.values.push(value);
        Ok(())
    }
}

fn is_content(line: &str) -> bool {
    let line = line.trim_start();
    !line.is_empty() && !line.starts_with('#')
}

/// Resolve a table path, falling back to the gzip-compressed file when the plain one is missing.
pub fn resolve_table_path(path: &Utf8Path) -> Utf8PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let gz_path = Utf8PathBuf::from(format!("{path}.gz"));
    if gz_path.exists() {
        gz_path
    } else {
        path.to_path_buf()
    }
}

impl FluxTable {
    /// Read a flux table from disk.
    ///
    /// The path is first resolved with [`resolve_table_path`]; files ending in `.gz` are
    /// decompressed on the fly.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: table file (plain text or gzip).
    /// * `columns`: optional columns to extract, see [`TableColumns::for_grid`].
    ///
    /// Return
    /// ----------
    /// * The parsed table, or a [`FluxErrError`] for I/O failures, missing columns, ragged rows or
    ///   unparsable values.
    pub fn read(path: &Utf8Path, columns: &TableColumns) -> Result<Self, FluxErrError> {
        let path = resolve_table_path(path);
        let file = File::open(&path)?;

        let table = if path.extension() == Some("gz") {
            Self::from_reader(path.as_str(), BufReader::new(GzDecoder::new(file)), columns)?
        } else {
            Self::from_reader(path.as_str(), BufReader::new(file), columns)?
        };

        info!("    Read/store {path} with {} rows.", table.nrow());
        Ok(table)
    }

    /// Parse a flux table from any buffered reader.
    pub fn from_reader<R: BufRead>(
        name: &str,
        reader: R,
        columns: &TableColumns,
    ) -> Result<Self, FluxErrError> {
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if is_content(&line) {
                        break line;
                    }
                }
                None => return Err(FluxErrError::EmptyTable(name.to_string())),
            }
        };
        let header: Vec<&str> = header.split_whitespace().collect();

        let position = |column: &str| header.iter().position(|h| *h == column);
        let require = |column: &str| {
            position(column).ok_or_else(|| FluxErrError::MissingColumn {
                table: name.to_string(),
                column: column.to_string(),
            })
        };

        let mut flux_data = ColumnReader::<f64>::new(COL_FLUX_DATA, require(COL_FLUX_DATA)?);
        let mut flux_true = ColumnReader::<f64>::new(COL_FLUX_TRUE, require(COL_FLUX_TRUE)?);
        let mut err_data = ColumnReader::<f64>::new(COL_ERR_DATA, require(COL_ERR_DATA)?);
        let mut err_calc = ColumnReader::<f64>::new(COL_ERR_CALC, require(COL_ERR_CALC)?);
        let mut ifiltobs = ColumnReader::<i64>::new(COL_IFILTOBS, require(COL_IFILTOBS)?);
        let mut band = ColumnReader::<String>::new(COL_BAND, require(COL_BAND)?);

        let mut field = if columns.field {
            Some(ColumnReader::<String>::new(COL_FIELD, require(COL_FIELD)?))
        } else {
            None
        };
        let mut nsig = position(COL_NSIG).map(|pos| ColumnReader::<f64>::new(COL_NSIG, pos));

        let mut variables = columns
            .variables
            .iter()
            .map(|variable| Ok(ColumnReader::<f64>::new(variable, require(variable.as_str())?)))
            .collect::<Result<Vec<_>, FluxErrError>>()?;

        let ncol = header.len();
        for (iline, line) in lines {
            let line = line?;
            if !is_content(&line) {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != ncol {
                return Err(FluxErrError::RaggedRow {
                    table: name.to_string(),
                    line: iline + 1,
                    expected: ncol,
                    found: tokens.len(),
                });
            }

            let fixed: [&mut dyn ColumnSink; 6] = [
                &mut flux_data,
                &mut flux_true,
                &mut err_data,
                &mut err_calc,
                &mut ifiltobs,
                &mut band,
            ];
            let optional = field
                .as_mut()
                .map(|c| c as &mut dyn ColumnSink)
                .into_iter()
                .chain(nsig.as_mut().map(|c| c as &mut dyn ColumnSink));
            let sinks = fixed
                .into_iter()
                .chain(optional)
                .chain(variables.iter_mut().map(|c| c as &mut dyn ColumnSink));

            for sink in sinks {
                sink.push(name, &tokens)?;
            }
        }

        Ok(FluxTable {
            name: name.to_string(),
            flux_data: flux_data.values,
            flux_true: flux_true.values,
            err_data: err_data.values,
            err_calc: err_calc.values,
            ifiltobs: ifiltobs.values,
            band: band.values,
            field: field.map(|c| c.values),
            nsig: nsig.map(|c| c.values),
            variables: variables.into_iter().map(|c| (c.name, c.values)).collect(),
        })
    }

    pub fn nrow(&self) -> usize {
        self.flux_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nrow() == 0
    }

    /// Values of a continuous map variable.
    pub fn variable(&self, name: &str) -> Result<&[f64], FluxErrError> {
        self.variables
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FluxErrError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }
}
