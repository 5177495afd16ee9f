#![allow(dead_code)]

use std::{fs::File, io::Write};

use camino::Utf8Path;
use flate2::{write::GzEncoder, Compression};
use fluxerrmodel::FluxTable;
use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, Normal};

/// One synthetic observation, described by its pull instead of its fluxes.
#[derive(Debug, Clone)]
pub struct SyntheticObs {
    pub field: String,
    pub ifiltobs: i64,
    pub band: String,
    pub snr: f64,
    pub pull: f64,
    pub err_ratio: f64,
}

const ERR_CALC: f64 = 10.0;

/// Observations with standard-normal pulls and `ERR_DATA == ERR_CALC`.
///
/// Filters and fields are assigned round-robin, `SNR` is uniform in `snr_range`.
pub fn normal_obs(
    rng: &mut StdRng,
    n: usize,
    filters: &[(i64, &str)],
    fields: &[&str],
    snr_range: (f64, f64),
) -> Vec<SyntheticObs> {
    let normal = Normal::new(0.0, 1.0).unwrap();
    (0..n)
        .map(|i| {
            let (ifiltobs, band) = filters[i % filters.len()];
            SyntheticObs {
                field: fields[i % fields.len()].to_string(),
                ifiltobs,
                band: band.to_string(),
                snr: rng.random_range(snr_range.0..snr_range.1),
                pull: normal.sample(&mut *rng),
                err_ratio: 1.0,
            }
        })
        .collect()
}

/// Columnar table built from synthetic observations, with a `SNR` map variable.
pub fn to_flux_table(name: &str, obs: &[SyntheticObs]) -> FluxTable {
    let mut table = FluxTable {
        name: name.to_string(),
        ..Default::default()
    };
    let mut fields = Vec::with_capacity(obs.len());
    let mut snr = Vec::with_capacity(obs.len());
    for o in obs {
        let flux_true = 1000.0;
        table.flux_true.push(flux_true);
        table.flux_data.push(flux_true + o.pull * ERR_CALC);
        table.err_calc.push(ERR_CALC);
        table.err_data.push(o.err_ratio * ERR_CALC);
        table.ifiltobs.push(o.ifiltobs);
        table.band.push(o.band.clone());
        fields.push(o.field.clone());
        snr.push(o.snr);
    }
    table.field = Some(fields);
    table.variables.insert("SNR".to_string(), snr);
    table
}

/// Text rendering of a flux table in the stage-3 layout.
pub fn to_table_text(obs: &[SyntheticObs]) -> String {
    let mut text = String::from(
        "# synthetic OUTLIER table\n\
         VARNAMES: CID FIELD IFILTOBS BAND FLUXCAL_DATA FLUXCAL_TRUE FLUXCAL_ERR_DATA FLUXCAL_ERR_CALC SNR\n",
    );
    for (cid, o) in obs.iter().enumerate() {
        let flux_true = 1000.0;
        text.push_str(&format!(
            "OBS: {cid} {} {} {} {} {} {} {} {}\n",
            o.field,
            o.ifiltobs,
            o.band,
            flux_true + o.pull * ERR_CALC,
            flux_true,
            o.err_ratio * ERR_CALC,
            ERR_CALC,
            o.snr
        ));
    }
    text
}

pub fn write_table(path: &Utf8Path, obs: &[SyntheticObs]) {
    std::fs::write(path, to_table_text(obs)).unwrap();
}

pub fn write_table_gz(path: &Utf8Path, obs: &[SyntheticObs]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(to_table_text(obs).as_bytes()).unwrap();
    encoder.finish().unwrap();
}

/// Parsed `ROW:` line: bin centers and correction.
pub fn parse_rows(map_text: &str) -> Vec<Vec<f64>> {
    map_text
        .lines()
        .filter_map(|line| line.strip_prefix("ROW:"))
        .map(|row| {
            let values = row.split('#').next().unwrap();
            values
                .split_whitespace()
                .map(|v| v.parse::<f64>().unwrap())
                .collect()
        })
        .collect()
}
