//! # fluxerrmodel
//!
//! Builds the `FLUXERRMODEL` correction maps that rescale photometric flux uncertainties so that
//! pull distributions become properly calibrated.
//!
//! Two flux tables are compared cell by cell on a multi-dimensional grid (field group, filter and
//! up to a few continuous variables such as `SBMAG` or `PSF`):
//!
//! * **fakes**: synthetic sources of known flux injected into real images,
//! * **simulation**: the same observations produced by the survey simulator.
//!
//! Each cell yields a correction for the reported uncertainty of data and fakes
//! (`FLUXERRMODEL_FAKE.DAT`) and one for the modeled uncertainty of the simulation
//! (`FLUXERRMODEL_SIM.DAT`).
//!
//! ## Modules
//!
//! * [`config`] – YAML configuration of the map stage.
//! * [`grid`] – Map dimensions and the cell ravel/unravel bijection.
//! * [`flux_table`] – Reading the flux tables and preparing them for binning.
//! * [`errscale`] – Robust per-cell correction estimator.
//! * [`map_writer`] – The map text format.
//! * [`fluxerr_map`] – End-to-end map construction.
pub mod config;
pub mod constants;
pub mod errscale;
pub mod field_groups;
pub mod filters;
pub mod flux_table;
pub mod fluxerr_errors;
pub mod fluxerr_map;
pub mod grid;
pub mod map_writer;

pub use config::MapConfig;
pub use errscale::{compute_errscale_cor, CorrectionResult};
pub use field_groups::FieldGroups;
pub use flux_table::FluxTable;
pub use fluxerr_errors::FluxErrError;
pub use fluxerr_map::{FluxErrModel, MapSummary};
pub use grid::GridDefinition;
pub use map_writer::RunMetadata;
