//! # Multi-dimensional map grid
//!
//! This module defines the binning scheme of a `FLUXERRMODEL` map: an ordered list of
//! [`DimensionSpec`]s and the bijection between a tuple of per-dimension bin indices and a single
//! **linear cell index**.
//!
//! ## Dimensions
//!
//! Three kinds of dimensions exist ([`DimensionKind`]):
//!
//! - **Continuous** – a table column split into `nbin` uniform bins between `min` and `max`.
//! - **Field** – one bin per configured field group (`IFIELD`), always inserted as the first
//!   dimension when field groups are configured.
//! - **Filter** – one bin per absolute filter identity (`IFILTOBS`), `IFILTOBS_MAX` bins in total.
//!
//! Categorical dimensions are stored with the same edge layout as continuous ones
//! (`-0.5, 0.5, …, n-0.5`), so bin `i` is centered on the integer `i`.
//!
//! ## Linear index
//!
//! Cells are laid out **row-major** with the first declared dimension varying slowest, i.e. the
//! usual N-dimensional ravel/unravel. Strides are computed once from the bin counts:
//!
//! ```text
//! stride[ndim-1] = 1
//! stride[i]      = stride[i+1] * nbin[i+1]
//! cell           = Σ bin[i] * stride[i]
//! ```
//!
//! The indexing code itself has no arity limit; the 1..=4 dimension range is enforced as a
//! validation rule ([`MAX_MAP_DIMENSIONS`]) because the map format is only defined up to there.
//!
//! ## Typical usage
//!
//! ```rust
//! use fluxerrmodel::grid::GridDefinition;
//!
//! let rows = vec!["FILTER".to_string(), "PSF 3 1.0 4.0".to_string()];
//! let grid = GridDefinition::from_config_rows(&rows, 2).unwrap();
//!
//! assert_eq!(grid.ndim(), 3); // IFIELD, IFILTOBS, PSF
//! assert_eq!(grid.linear_size(), 2 * 80 * 3);
//!
//! let cell = grid.ravel(&[1, 7, 2]);
//! assert_eq!(grid.unravel(cell).as_slice(), &[1, 7, 2]);
//! ```
pub mod bin_spec;

use itertools::Itertools;
use log::info;

use crate::{
    constants::{
        BinIndices, CellIndex, CLIP_EPSILON, DIM_IFIELD, DIM_IFILTOBS, DOC_BAND, DOC_FIELD,
        IFILTOBS_MAX, MAX_MAP_DIMENSIONS,
    },
    fluxerr_errors::FluxErrError,
};
use bin_spec::{parse_bin_spec, BinSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Continuous,
    Field,
    Filter,
}

/// One axis of the map.
///
/// `edges` always holds `nbin + 1` increasing values, uniformly spaced between `min` and `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    pub name: String,
    pub kind: DimensionKind,
    pub nbin: usize,
    pub min: f64,
    pub max: f64,
    pub edges: Vec<f64>,
}

/// `nbin + 1` evenly spaced edges, the last one pinned to `max`.
fn uniform_edges(min: f64, max: f64, nbin: usize) -> Vec<f64> {
    let step = (max - min) / nbin as f64;
    let mut edges: Vec<f64> = (0..=nbin).map(|i| min + i as f64 * step).collect();
    edges[nbin] = max;
    edges
}

impl DimensionSpec {
    /// Build a continuous dimension with uniform bins.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: table column binned along this axis.
    /// * `nbin`: number of bins, at least 1.
    /// * `min`, `max`: outer edges, `min < max`.
    ///
    /// Return
    /// ----------
    /// * The dimension, or [`FluxErrError::InvalidBinCount`] / [`FluxErrError::InvalidBinRange`].
    pub fn continuous(name: &str, nbin: usize, min: f64, max: f64) -> Result<Self, FluxErrError> {
        if nbin < 1 {
            return Err(FluxErrError::InvalidBinCount {
                name: name.to_string(),
                nbin,
            });
        }
        // also rejects NaN bounds
        if !(min < max) {
            return Err(FluxErrError::InvalidBinRange {
                name: name.to_string(),
                min,
                max,
            });
        }

        Ok(DimensionSpec {
            name: name.to_string(),
            kind: DimensionKind::Continuous,
            nbin,
            min,
            max,
            edges: uniform_edges(min, max, nbin),
        })
    }

    fn categorical(name: &str, kind: DimensionKind, nbin: usize) -> Self {
        let min = -0.5;
        let max = nbin as f64 - 0.5;
        DimensionSpec {
            name: name.to_string(),
            kind,
            nbin,
            min,
            max,
            edges: uniform_edges(min, max, nbin),
        }
    }

    /// Field-group dimension with one bin per group.
    pub fn field(n_groups: usize) -> Result<Self, FluxErrError> {
        if n_groups < 1 {
            return Err(FluxErrError::InvalidBinCount {
                name: DIM_IFIELD.to_string(),
                nbin: n_groups,
            });
        }
        Ok(Self::categorical(DIM_IFIELD, DimensionKind::Field, n_groups))
    }

    /// Filter dimension covering the full filter-identity space.
    pub fn filter() -> Self {
        Self::categorical(DIM_IFILTOBS, DimensionKind::Filter, IFILTOBS_MAX)
    }

    pub fn is_categorical(&self) -> bool {
        self.kind != DimensionKind::Continuous
    }

    /// Midpoint of bin `ibin`.
    pub fn bin_center(&self, ibin: usize) -> f64 {
        0.5 * (self.edges[ibin] + self.edges[ibin + 1])
    }

    /// Pull a value into the open interval `(min, max)`.
    ///
    /// Values at or beyond a boundary land `CLIP_EPSILON` inside it, so every row is kept in the
    /// first or last bin instead of an underflow/overflow bin. A NaN fails the lower test and is
    /// treated as an underflow.
    pub fn clip(&self, value: f64) -> f64 {
        let value = if value > self.min {
            value
        } else {
            self.min + CLIP_EPSILON
        };
        if value < self.max {
            value
        } else {
            self.max - CLIP_EPSILON
        }
    }

    /// Bin index of a (clipped) value.
    ///
    /// Bins are half-open `[lo, hi)`: a value equal to an interior edge goes to the bin starting
    /// at that edge. The result is kept within `[0, nbin - 1]`.
    pub fn digitize(&self, value: f64) -> usize {
        let upper = self.edges.partition_point(|edge| *edge <= value);
        upper.saturating_sub(1).min(self.nbin - 1)
    }
}

/// The N-dimensional binning scheme of a map.
///
/// Built once from the configuration and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    dimensions: Vec<DimensionSpec>,
    strides: Vec<usize>,
    linear_size: usize,
    field_axis: Option<usize>,
    filter_axis: Option<usize>,
}

impl GridDefinition {
    /// Validate a list of dimensions and precompute the strides.
    ///
    /// Rules
    /// -----------------
    /// * `1 <= ndim <= MAX_MAP_DIMENSIONS`, otherwise [`FluxErrError::UnsupportedDimensionality`].
    /// * Dimension names are unique.
    /// * Field and filter dimensions come before every continuous one, so that all the cells of one
    ///   `(field, band)` section are consecutive in linear order.
    pub fn new(dimensions: Vec<DimensionSpec>) -> Result<Self, FluxErrError> {
        let ndim = dimensions.len();
        if !(1..=MAX_MAP_DIMENSIONS).contains(&ndim) {
            return Err(FluxErrError::UnsupportedDimensionality(ndim));
        }

        if let Some(dup) = dimensions.iter().map(|d| d.name.as_str()).duplicates().next() {
            return Err(FluxErrError::DuplicateDimension(dup.to_string()));
        }

        let mut first_continuous: Option<&str> = None;
        for dim in &dimensions {
            match (dim.is_categorical(), first_continuous) {
                (false, None) => first_continuous = Some(&dim.name),
                (true, Some(continuous)) => {
                    return Err(FluxErrError::CategoricalAfterContinuous {
                        categorical: dim.name.clone(),
                        continuous: continuous.to_string(),
                    })
                }
                _ => {}
            }
        }

        let mut strides = vec![1; ndim];
        for i in (0..ndim - 1).rev() {
            strides[i] = strides[i + 1] * dimensions[i + 1].nbin;
        }
        let linear_size = dimensions.iter().map(|d| d.nbin).product();

        let field_axis = dimensions
            .iter()
            .position(|d| d.kind == DimensionKind::Field);
        let filter_axis = dimensions
            .iter()
            .position(|d| d.kind == DimensionKind::Filter);

        Ok(GridDefinition {
            dimensions,
            strides,
            linear_size,
            field_axis,
            filter_axis,
        })
    }

    /// Build the grid from parsed bin specs.
    ///
    /// When `n_field_groups > 0` the field dimension is inserted first, ahead of every declared
    /// dimension. `FILTER`/`BAND` entries become the fixed-size filter dimension.
    pub fn from_bin_specs(specs: &[BinSpec], n_field_groups: usize) -> Result<Self, FluxErrError> {
        let mut dimensions = Vec::with_capacity(specs.len() + 1);
        if n_field_groups > 0 {
            dimensions.push(DimensionSpec::field(n_field_groups)?);
        }

        for spec in specs {
            let dim = match spec {
                BinSpec::Filter => DimensionSpec::filter(),
                BinSpec::Continuous {
                    name,
                    nbin,
                    min,
                    max,
                } => DimensionSpec::continuous(name, *nbin, *min, *max)?,
            };
            info!(
                "    Store {:2} {} bins from {} to {}",
                dim.nbin, dim.name, dim.min, dim.max
            );
            dimensions.push(dim);
        }

        Self::new(dimensions)
    }

    /// Parse the `FLUXERRMAP_BINS` configuration entries and build the grid.
    ///
    /// See also
    /// ------------
    /// * [`parse_bin_spec`] – Syntax of one entry.
    pub fn from_config_rows<S: AsRef<str>>(
        rows: &[S],
        n_field_groups: usize,
    ) -> Result<Self, FluxErrError> {
        let specs = rows
            .iter()
            .map(|row| parse_bin_spec(row.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_bin_specs(&specs, n_field_groups)
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimensions(&self) -> &[DimensionSpec] {
        &self.dimensions
    }

    pub fn dimension(&self, axis: usize) -> &DimensionSpec {
        &self.dimensions[axis]
    }

    /// Total number of cells, the product of all bin counts.
    pub fn linear_size(&self) -> usize {
        self.linear_size
    }

    pub fn field_axis(&self) -> Option<usize> {
        self.field_axis
    }

    pub fn filter_axis(&self) -> Option<usize> {
        self.filter_axis
    }

    /// Continuous dimensions with their axis position.
    pub fn continuous_axes(&self) -> impl Iterator<Item = (usize, &DimensionSpec)> {
        self.dimensions
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_categorical())
    }

    /// Linear index of a bin-index tuple.
    ///
    /// Panics
    /// ----------
    /// * In debug builds, if the tuple length differs from `ndim` or a bin is out of range.
    pub fn ravel(&self, bins: &[usize]) -> CellIndex {
        debug_assert_eq!(bins.len(), self.ndim());
        debug_assert!(bins
            .iter()
            .zip(&self.dimensions)
            .all(|(ibin, dim)| *ibin < dim.nbin));

        bins.iter()
            .zip(&self.strides)
            .map(|(ibin, stride)| ibin * stride)
            .sum()
    }

    /// Checked variant of [`ravel`](GridDefinition::ravel).
    pub fn try_ravel(&self, bins: &[usize]) -> Option<CellIndex> {
        let in_range = bins.len() == self.ndim()
            && bins
                .iter()
                .zip(&self.dimensions)
                .all(|(ibin, dim)| *ibin < dim.nbin);
        in_range.then(|| self.ravel(bins))
    }

    /// Per-dimension bin indices of a linear cell index.
    pub fn unravel(&self, cell: CellIndex) -> BinIndices {
        debug_assert!(cell < self.linear_size);
        self.strides
            .iter()
            .zip(&self.dimensions)
            .map(|(stride, dim)| (cell / stride) % dim.nbin)
            .collect()
    }

    /// Iterate over every cell in ascending linear order.
    pub fn cells(&self) -> impl Iterator<Item = (CellIndex, BinIndices)> + '_ {
        (0..self.linear_size).map(|cell| (cell, self.unravel(cell)))
    }

    /// Bin centers of the continuous dimensions of a cell, in axis order.
    pub fn continuous_centers(&self, bins: &[usize]) -> Vec<f64> {
        self.continuous_axes()
            .map(|(axis, dim)| dim.bin_center(bins[axis]))
            .collect()
    }

    /// Whether a cell is the last row of its map section.
    ///
    /// True when every continuous bin index is at its maximum; vacuously true for a grid with
    /// only categorical dimensions, where each section holds a single row.
    pub fn is_last_in_section(&self, bins: &[usize]) -> bool {
        self.continuous_axes()
            .all(|(axis, dim)| bins[axis] == dim.nbin - 1)
    }

    /// Column names written in the `VARNAMES:` line, without the categorical dimensions.
    pub fn header_varnames(&self) -> Vec<&str> {
        self.continuous_axes().map(|(_, d)| d.name.as_str()).collect()
    }

    /// All dimension names with the categorical ones renamed `FIELD` and `BAND`.
    pub fn documentation_varnames(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .map(|d| match d.kind {
                DimensionKind::Field => DOC_FIELD,
                DimensionKind::Filter => DOC_BAND,
                DimensionKind::Continuous => d.name.as_str(),
            })
            .collect()
    }
}

#[cfg(test)]
mod test_grid {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_from(rows: &[&str], n_field_groups: usize) -> Result<GridDefinition, FluxErrError> {
        GridDefinition::from_config_rows(rows, n_field_groups)
    }

    #[test]
    fn test_uniform_edges() {
        let dim = DimensionSpec::continuous("SBMAG", 8, 20.0, 28.0).unwrap();
        assert_eq!(dim.edges.len(), 9);
        assert_eq!(dim.edges[0], 20.0);
        assert_eq!(dim.edges[8], 28.0);
        assert_relative_eq!(dim.edges[3], 23.0, epsilon = 1e-12);
        assert_relative_eq!(dim.bin_center(0), 20.5, epsilon = 1e-12);
        assert_relative_eq!(dim.bin_center(7), 27.5, epsilon = 1e-12);
    }

    #[test]
    fn test_categorical_edges_center_on_integers() {
        let filter = DimensionSpec::filter();
        assert_eq!(filter.nbin, IFILTOBS_MAX);
        for ifilt in [0, 3, 7, 79] {
            assert_relative_eq!(filter.bin_center(ifilt), ifilt as f64, epsilon = 1e-9);
            assert_eq!(filter.digitize(ifilt as f64), ifilt);
        }

        let field = DimensionSpec::field(3).unwrap();
        assert_eq!(field.name, DIM_IFIELD);
        assert_eq!(field.digitize(2.0), 2);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert_eq!(
            DimensionSpec::continuous("PSF", 0, 1.0, 4.0),
            Err(FluxErrError::InvalidBinCount {
                name: "PSF".into(),
                nbin: 0
            })
        );
        assert_eq!(
            DimensionSpec::continuous("PSF", 3, 4.0, 4.0),
            Err(FluxErrError::InvalidBinRange {
                name: "PSF".into(),
                min: 4.0,
                max: 4.0
            })
        );
        assert!(DimensionSpec::continuous("PSF", 3, 5.0, 1.0).is_err());
        assert!(DimensionSpec::field(0).is_err());
    }

    #[test]
    fn test_clip_and_digitize() {
        let dim = DimensionSpec::continuous("SNR", 3, 0.0, 10.0).unwrap();

        assert_eq!(dim.clip(-5.0), CLIP_EPSILON);
        assert_eq!(dim.clip(0.0), CLIP_EPSILON);
        assert_eq!(dim.clip(10.0), 10.0 - CLIP_EPSILON);
        assert_eq!(dim.clip(42.0), 10.0 - CLIP_EPSILON);
        assert_eq!(dim.clip(5.0), 5.0);
        assert_eq!(dim.clip(f64::NAN), CLIP_EPSILON);

        assert_eq!(dim.digitize(dim.clip(-5.0)), 0);
        assert_eq!(dim.digitize(dim.clip(42.0)), 2);
        assert_eq!(dim.digitize(3.0), 0);
        assert_eq!(dim.digitize(3.5), 1);

        // interior edge belongs to the bin it opens
        let dim = DimensionSpec::continuous("PSF", 3, 1.0, 4.0).unwrap();
        assert_eq!(dim.digitize(2.0), 1);
        assert_eq!(dim.digitize(3.0), 2);
        assert_eq!(dim.digitize(1.9999), 0);
    }

    #[test]
    fn test_dimensionality_limits() {
        assert_eq!(
            GridDefinition::new(vec![]),
            Err(FluxErrError::UnsupportedDimensionality(0))
        );

        let rows = ["A 2 0 1", "B 2 0 1", "C 2 0 1", "D 2 0 1", "E 2 0 1"];
        assert_eq!(
            grid_from(&rows, 0),
            Err(FluxErrError::UnsupportedDimensionality(5))
        );

        // the field dimension counts towards the limit
        assert_eq!(
            grid_from(&rows[..4], 2),
            Err(FluxErrError::UnsupportedDimensionality(5))
        );
        assert!(grid_from(&rows[..4], 0).is_ok());
    }

    #[test]
    fn test_field_inserted_first() {
        let grid = grid_from(&["FILTER", "SBMAG 8 20 28", "PSF 3 1.0 4.0"], 2).unwrap();
        assert_eq!(grid.ndim(), 4);
        assert_eq!(grid.field_axis(), Some(0));
        assert_eq!(grid.filter_axis(), Some(1));
        assert_eq!(grid.dimension(0).kind, DimensionKind::Field);
        assert_eq!(grid.linear_size(), 2 * 80 * 8 * 3);
        assert_eq!(grid.header_varnames(), vec!["SBMAG", "PSF"]);
        assert_eq!(
            grid.documentation_varnames(),
            vec!["FIELD", "BAND", "SBMAG", "PSF"]
        );
    }

    #[test]
    fn test_filter_after_continuous_rejected() {
        assert_eq!(
            grid_from(&["SBMAG 8 20 28", "FILTER"], 0),
            Err(FluxErrError::CategoricalAfterContinuous {
                categorical: "IFILTOBS".into(),
                continuous: "SBMAG".into()
            })
        );
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        assert_eq!(
            grid_from(&["FILTER", "BAND"], 0),
            Err(FluxErrError::DuplicateDimension("IFILTOBS".into()))
        );
        assert_eq!(
            grid_from(&["PSF 3 1 4", "PSF 2 1 4"], 0),
            Err(FluxErrError::DuplicateDimension("PSF".into()))
        );
    }

    #[test]
    fn test_ravel_is_row_major() {
        let grid = grid_from(&["A 2 0 1", "B 3 0 1", "C 4 0 1"], 0).unwrap();
        assert_eq!(grid.ravel(&[0, 0, 0]), 0);
        assert_eq!(grid.ravel(&[0, 0, 1]), 1);
        assert_eq!(grid.ravel(&[0, 1, 0]), 4);
        assert_eq!(grid.ravel(&[1, 0, 0]), 12);
        assert_eq!(grid.ravel(&[1, 2, 3]), 23);
        assert_eq!(grid.try_ravel(&[2, 0, 0]), None);
        assert_eq!(grid.try_ravel(&[0, 0]), None);
    }

    #[test]
    fn test_ravel_unravel_bijection() {
        let shapes: [&[&str]; 4] = [
            &["A 5 0 1"],
            &["A 3 0 1", "B 4 0 1"],
            &["FILTER", "B 2 0 1", "C 3 0 1"],
            &["A 2 0 1", "B 3 0 1", "C 1 0 1", "D 4 0 1"],
        ];

        for rows in shapes {
            let grid = grid_from(rows, 0).unwrap();
            let mut seen = vec![false; grid.linear_size()];
            for (cell, bins) in grid.cells() {
                assert_eq!(bins.len(), grid.ndim());
                assert_eq!(grid.ravel(&bins), cell);
                assert!(!seen[cell]);
                seen[cell] = true;
            }
            assert!(seen.iter().all(|s| *s));
        }
    }

    #[test]
    fn test_last_in_section() {
        let grid = grid_from(&["FILTER", "SBMAG 2 20 28", "PSF 3 1.0 4.0"], 0).unwrap();
        assert!(!grid.is_last_in_section(&[5, 1, 1]));
        assert!(!grid.is_last_in_section(&[5, 0, 2]));
        assert!(grid.is_last_in_section(&[5, 1, 2]));

        let filter_only = grid_from(&["FILTER"], 0).unwrap();
        assert!(filter_only.is_last_in_section(&[3]));
    }

    #[test]
    fn test_continuous_centers() {
        let grid = grid_from(&["FILTER", "SNR 3 0 9"], 1).unwrap();
        let centers = grid.continuous_centers(&[0, 4, 1]);
        assert_eq!(centers.len(), 1);
        assert_relative_eq!(centers[0], 4.5, epsilon = 1e-12);
    }
}
