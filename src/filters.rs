//! # Observed filters
//!
//! The filter dimension spans the whole `IFILTOBS` space, but only the identities present in the
//! fake table get a map section. [`FilterSet`] records them in ascending order together with the
//! band label of their first occurrence.
use std::collections::BTreeMap;

use itertools::Itertools;
use log::info;

use crate::{
    constants::{FilterId, IFILTOBS_MAX},
    flux_table::FluxTable,
    fluxerr_errors::FluxErrError,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    bands: BTreeMap<FilterId, String>,
}

impl FilterSet {
    /// Collect the distinct filter identities of parallel `IFILTOBS`/`BAND` columns.
    ///
    /// Return
    /// ----------
    /// * The set, or [`FluxErrError::FilterOutOfRange`] for an identity outside
    ///   `[0, IFILTOBS_MAX)`.
    pub fn from_columns(ifiltobs: &[i64], band: &[String]) -> Result<Self, FluxErrError> {
        let mut bands = BTreeMap::new();
        for (ifilt, band) in ifiltobs.iter().zip(band) {
            let id = usize::try_from(*ifilt)
                .ok()
                .filter(|id| *id < IFILTOBS_MAX)
                .ok_or(FluxErrError::FilterOutOfRange(*ifilt, IFILTOBS_MAX))?;
            bands.entry(id).or_insert_with(|| band.clone());
        }
        Ok(FilterSet { bands })
    }

    /// Filters observed in a flux table.
    pub fn from_table(table: &FluxTable) -> Result<Self, FluxErrError> {
        let filters = Self::from_columns(&table.ifiltobs, &table.band)?;
        info!(
            "    Found IFILTOBS set = [{}]",
            filters.ids().join(", ")
        );
        info!(
            "       -->    BAND set = [{}]  ({})",
            filters.bands.values().join(", "),
            filters.band_string()
        );
        Ok(filters)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band label of an observed filter.
    pub fn band(&self, id: FilterId) -> Option<&str> {
        self.bands.get(&id).map(String::as_str)
    }

    /// Observed identities, ascending.
    pub fn ids(&self) -> impl Iterator<Item = FilterId> + '_ {
        self.bands.keys().copied()
    }

    /// All band labels concatenated in identity order, e.g. `griz`.
    pub fn band_string(&self) -> String {
        self.bands.values().map(String::as_str).collect()
    }
}
