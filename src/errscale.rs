//! # Per-cell error-scale correction
//!
//! For one map cell, compare the pull dispersion of the fakes with the uncertainties reported for
//! them and with the dispersion of the simulation (Kessler et al. 2019, Sec. 6.4):
//!
//! ```text
//! scale_fake = RMS[pull]_fake / median[ERR_DATA / ERR_CALC]_fake     (Eq. 15, data & fakes)
//! scale_sim  = RMS[pull]_fake / RMS[pull]_sim                        (Eq. 14, simulation)
//! ```
//!
//! where `RMS` is the robust scale `1.4826 × median(|x − median(x)|)` of the median-centered pulls.
//!
//! Cells with too few rows in either sample ([`MIN_CELL_STATS`]) get the identity correction, and
//! so do cells where one of the samples has no measurable dispersion.
use ordered_float::OrderedFloat;

use crate::constants::{MAD_TO_SIGMA, MIN_CELL_STATS};

/// Median of a sample.
///
/// Even-length samples return the mean of the two middle values. An empty sample or a sample
/// containing a NaN returns NaN.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }

    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid].0
    } else {
        0.5 * (sorted[mid - 1].0 + sorted[mid].0)
    }
}

/// Normal-consistent robust standard deviation of a sample.
///
/// The sample is centered on its own median first, so a constant bias does not change the result.
pub fn robust_scale(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    MAD_TO_SIGMA * median(&deviations)
}

/// Corrections of one cell, with the sample sizes they were computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionResult {
    pub n_fake: usize,
    pub n_sim: usize,
    /// Scale applied to the reported uncertainty of data and fakes.
    pub scale_fake: f64,
    /// Scale applied to the modeled uncertainty of the simulation.
    pub scale_sim: f64,
}

impl CorrectionResult {
    fn identity(n_fake: usize, n_sim: usize) -> Self {
        CorrectionResult {
            n_fake,
            n_sim,
            scale_fake: 1.0,
            scale_sim: 1.0,
        }
    }
}

/// Compute the fake and simulation corrections of one cell.
///
/// Arguments
/// -----------------
/// * `pull_fake`: `(FLUXCAL_DATA - FLUXCAL_TRUE) / FLUXCAL_ERR_CALC` of the fakes in the cell.
/// * `ratio_fake`: `FLUXCAL_ERR_DATA / FLUXCAL_ERR_CALC` of the same fakes.
/// * `pull_sim`: pulls of the simulated observations in the cell.
///
/// Return
/// ----------
/// * A [`CorrectionResult`]; both scales are exactly `1.0` when either sample has at most
///   [`MIN_CELL_STATS`] rows or zero robust dispersion.
pub fn compute_errscale_cor(pull_fake: &[f64], ratio_fake: &[f64], pull_sim: &[f64]) -> CorrectionResult {
    let n_fake = pull_fake.len();
    let n_sim = pull_sim.len();
    if n_fake <= MIN_CELL_STATS || n_sim <= MIN_CELL_STATS {
        return CorrectionResult::identity(n_fake, n_sim);
    }

    let rms_pull_fake = robust_scale(pull_fake);
    let rms_pull_sim = robust_scale(pull_sim);
    if rms_pull_fake == 0.0 || rms_pull_sim == 0.0 {
        return CorrectionResult::identity(n_fake, n_sim);
    }

    let avg_ratio = median(ratio_fake);

    CorrectionResult {
        n_fake,
        n_sim,
        scale_fake: rms_pull_fake / avg_ratio,
        scale_sim: rms_pull_fake / rms_pull_sim,
    }
}
