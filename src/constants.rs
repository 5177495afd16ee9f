//! # Constants and type definitions for fluxerrmodel
//!
//! This module centralizes the **fixed column names**, **output file names**, and the
//! **policy constants** of the flux-uncertainty calibration. Everything here is part of the
//! contract with the external photometry tables and with the downstream consumers of the
//! `FLUXERRMODEL` maps, so none of it is configurable at run time.
//!
//! ## Overview
//!
//! - Column names expected in the per-observation flux tables
//! - Names of the synthetic (derived) columns and map dimensions
//! - Map file names and map keys
//! - Statistical policy constants used by the per-cell estimator

// -------------------------------------------------------------------------------------------------
// Input table columns
// -------------------------------------------------------------------------------------------------

/// Measured calibrated flux
pub const COL_FLUX_DATA: &str = "FLUXCAL_DATA";

/// True (injected) calibrated flux
pub const COL_FLUX_TRUE: &str = "FLUXCAL_TRUE";

/// Reported flux uncertainty
pub const COL_ERR_DATA: &str = "FLUXCAL_ERR_DATA";

/// Flux uncertainty computed by the photometry model
pub const COL_ERR_CALC: &str = "FLUXCAL_ERR_CALC";

/// Field label of each observation
pub const COL_FIELD: &str = "FIELD";

/// Integer filter identity (absolute filter index)
pub const COL_IFILTOBS: &str = "IFILTOBS";

/// One-character band label matching `IFILTOBS`
pub const COL_BAND: &str = "BAND";

/// Optional significance column used by the `CUTWIN_NSIG` cut
pub const COL_NSIG: &str = "NSIG";

// -------------------------------------------------------------------------------------------------
// Map dimensions
// -------------------------------------------------------------------------------------------------

/// Internal name of the field-group dimension
pub const DIM_IFIELD: &str = "IFIELD";

/// Internal name of the filter dimension
pub const DIM_IFILTOBS: &str = COL_IFILTOBS;

/// Name written in the documentation block for the field-group dimension
pub const DOC_FIELD: &str = "FIELD";

/// Name written in the documentation block for the filter dimension
pub const DOC_BAND: &str = "BAND";

/// Literal markers accepted in `FLUXERRMAP_BINS` to request a filter-dependent map
pub const FILTER_MARKERS: [&str; 2] = ["FILTER", "BAND"];

/// Size of the filter-identity space; `IFILTOBS` values lie in `[0, IFILTOBS_MAX)`
pub const IFILTOBS_MAX: usize = 80;

/// Maximum number of map dimensions supported by the map format
pub const MAX_MAP_DIMENSIONS: usize = 4;

// -------------------------------------------------------------------------------------------------
// Statistics
// -------------------------------------------------------------------------------------------------

/// A cell needs strictly more than this many rows in both samples to get a correction
pub const MIN_CELL_STATS: usize = 5;

/// Normal-consistency factor turning a median absolute deviation into a σ estimate
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Inward offset applied to values clipped onto a continuous dimension boundary
pub const CLIP_EPSILON: f64 = 1.0e-4;

// -------------------------------------------------------------------------------------------------
// Map files
// -------------------------------------------------------------------------------------------------

/// Map name written in every section header
pub const MAPNAME: &str = "FLUXERR_SCALE";

/// Name of the correction column in `VARNAMES`
pub const VARNAME_ERRSCALE: &str = "ERRSCALE";

/// Tag used in file names and documentation for the fake/data map
pub const STRING_FAKE: &str = "FAKE";

/// Tag used in file names and documentation for the simulation map
pub const STRING_SIM: &str = "SIM";

/// Output map for real data and fakes
pub const FLUXERRMODEL_FILENAME_FAKE: &str = "FLUXERRMODEL_FAKE.DAT";

/// Output map for the simulation
pub const FLUXERRMODEL_FILENAME_SIM: &str = "FLUXERRMODEL_SIM.DAT";

/// Flux table produced for the fakes by the table-extraction stage
pub const FLUX_TABLE_FAKE: &str = "STAGE03_fluxTable_FAKE.OUTLIER.TEXT";

/// Flux table produced for the simulation by the table-extraction stage
pub const FLUX_TABLE_SIM: &str = "STAGE03_fluxTable_SIM.OUTLIER.TEXT";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Per-dimension bin indices of one cell (at most [`MAX_MAP_DIMENSIONS`] entries)
pub type BinIndices = smallvec::SmallVec<[usize; MAX_MAP_DIMENSIONS]>;

/// Linear (flattened) cell index
pub type CellIndex = usize;

/// Absolute filter identity
pub type FilterId = usize;
