//! # Table preparation
//!
//! Turns a [`FluxTable`] into a [`PreparedTable`]: per-row pull and error ratio, one bin index per
//! map dimension and the linear cell index of every surviving row.
//!
//! ## Steps
//! -----------------
//! The order matters:
//!
//! 1. **Cuts** – optional `CUTWIN_NSIG` cut, keeping rows with `NSIG < nsig_max`. `NSIG` is the
//!    table column when present, `|pull|` otherwise. Each table keeps its own row count.
//! 2. **Clipping** – continuous values are pulled inside `(min, max)` (see
//!    [`DimensionSpec::clip`](crate::grid::DimensionSpec::clip)) so no row falls outside the grid.
//! 3. **Field groups** – each `FIELD` label is resolved to its group index; an unknown label is
//!    fatal.
//! 4. **Digitization** – half-open bins per continuous dimension; the filter dimension uses
//!    `IFILTOBS` directly.
//! 5. **Cell index** – the bin tuple is raveled through the grid.
//!
//! Derived quantities
//! -----------------
//! ```text
//! PULL      = (FLUXCAL_DATA - FLUXCAL_TRUE) / FLUXCAL_ERR_CALC
//! ERR_RATIO =  FLUXCAL_ERR_DATA / FLUXCAL_ERR_CALC
//! ```
use log::{debug, info};

use crate::{
    constants::{BinIndices, CellIndex, COL_FIELD},
    field_groups::FieldGroups,
    flux_table::FluxTable,
    fluxerr_errors::FluxErrError,
    grid::{DimensionKind, GridDefinition},
};

/// Row-level cuts applied before binning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TableCuts {
    pub nsig_max: Option<f64>,
}

/// A flux table reduced to what the map needs.
///
/// Every vector is indexed by the surviving rows, in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTable {
    pub name: String,
    /// Row count before cuts.
    pub nrow_orig: usize,
    pub pull: Vec<f64>,
    pub err_ratio: Vec<f64>,
    /// Bin index per map dimension, `bins[axis][row]`.
    pub bins: Vec<Vec<usize>>,
    pub cell: Vec<CellIndex>,
}

impl PreparedTable {
    /// Row count after cuts.
    pub fn nrow(&self) -> usize {
        self.cell.len()
    }

    /// Bin indices of one row.
    pub fn row_bins(&self, row: usize) -> BinIndices {
        self.bins.iter().map(|axis| axis[row]).collect()
    }

    /// Row indices of every cell, `rows[cell]` in ascending row order.
    pub fn group_by_cell(&self, linear_size: usize) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); linear_size];
        for (row, cell) in self.cell.iter().enumerate() {
            rows[*cell].push(row);
        }
        rows
    }
}

/// `(FLUXCAL_DATA - FLUXCAL_TRUE) / FLUXCAL_ERR_CALC` for every row.
pub fn compute_pull(table: &FluxTable) -> Vec<f64> {
    table
        .flux_data
        .iter()
        .zip(&table.flux_true)
        .zip(&table.err_calc)
        .map(|((flux, flux_true), err_calc)| (flux - flux_true) / err_calc)
        .collect()
}

/// `FLUXCAL_ERR_DATA / FLUXCAL_ERR_CALC` for every row.
pub fn compute_err_ratio(table: &FluxTable) -> Vec<f64> {
    table
        .err_data
        .iter()
        .zip(&table.err_calc)
        .map(|(err_data, err_calc)| err_data / err_calc)
        .collect()
}

fn select<T: Clone>(values: &[T], keep: &[usize]) -> Vec<T> {
    keep.iter().map(|row| values[*row].clone()).collect()
}

/// Derive pulls, bin indices and cell indices for one table.
///
/// Arguments
/// -----------------
/// * `table`: the flux table (fakes or simulation).
/// * `grid`: map binning, shared by both tables.
/// * `field_groups`: group membership, used only when the grid has a field dimension.
/// * `cuts`: row-level cuts.
///
/// Return
/// ----------
/// * The [`PreparedTable`], or
///   - [`FluxErrError::FieldNotInGroup`] when a field label belongs to no group,
///   - [`FluxErrError::FilterOutOfRange`] when an `IFILTOBS` lies outside the filter dimension,
///   - [`FluxErrError::MissingColumn`] when a binned column was not read.
pub fn prepare_table(
    table: &FluxTable,
    grid: &GridDefinition,
    field_groups: &FieldGroups,
    cuts: &TableCuts,
) -> Result<PreparedTable, FluxErrError> {
    let nrow_orig = table.nrow();
    let pull_all = compute_pull(table);

    let keep: Vec<usize> = match cuts.nsig_max {
        Some(nsig_max) => (0..nrow_orig)
            .filter(|row| {
                let nsig = match &table.nsig {
                    Some(nsig) => nsig[*row],
                    None => pull_all[*row].abs(),
                };
                nsig < nsig_max
            })
            .collect(),
        None => (0..nrow_orig).collect(),
    };
    info!(
        " Nrow({}) = {nrow_orig} -> {} after cuts.",
        table.name,
        keep.len()
    );

    let pull = select(&pull_all, &keep);
    let err_ratio = select(&compute_err_ratio(table), &keep);

    let mut bins = Vec::with_capacity(grid.ndim());
    for dim in grid.dimensions() {
        let axis_bins = match dim.kind {
            DimensionKind::Continuous => {
                debug!("\t Force {} < {} < {}", dim.min, dim.name, dim.max);
                let values = table.variable(&dim.name)?;
                keep.iter()
                    .map(|row| dim.digitize(dim.clip(values[*row])))
                    .collect::<Vec<_>>()
            }
            DimensionKind::Field => {
                let fields = table
                    .field
                    .as_ref()
                    .ok_or_else(|| FluxErrError::MissingColumn {
                        table: table.name.clone(),
                        column: COL_FIELD.to_string(),
                    })?;
                keep.iter()
                    .map(|row| field_groups.group_of(&fields[*row]))
                    .collect::<Result<Vec<_>, _>>()?
            }
            DimensionKind::Filter => keep
                .iter()
                .map(|row| {
                    let ifiltobs = table.ifiltobs[*row];
                    usize::try_from(ifiltobs)
                        .ok()
                        .filter(|ifilt| *ifilt < dim.nbin)
                        .ok_or(FluxErrError::FilterOutOfRange(ifiltobs, dim.nbin))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        bins.push(axis_bins);
    }

    let cell = (0..keep.len())
        .map(|row| {
            let row_bins: BinIndices = bins.iter().map(|axis| axis[row]).collect();
            grid.ravel(&row_bins)
        })
        .collect();

    Ok(PreparedTable {
        name: table.name.clone(),
        nrow_orig,
        pull,
        err_ratio,
        bins,
        cell,
    })
}
