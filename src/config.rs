//! # Map configuration
//!
//! The map stage reads the same YAML input file as the rest of the fluxerr-model pipeline. Only
//! the keys below are interpreted here; every other key (`VERSION_FAKES`, `KCOR_FILE`,
//! `EXTRA_SNLCINP_ARGS`, …) belongs to the simulation/extraction stages and is ignored.
//!
//! ```yaml
//! OUTDIR: FLUXERRMODEL_DES
//!
//! # optional, reject extreme NSIG outliers
//! CUTWIN_NSIG:  0.0  5.0
//!
//! # optional, one map per field group
//! FIELDS:
//!   SHALLOW:  S1 S2 C1 C2 X1 X2 E1 E2
//!   DEEP:     X3 C3
//!
//! FLUXERRMAP_BINS:
//!   - FILTER                 # one map per observed band
//!   - SBMAG   8  20   28     # nbin min max
//!   - PSF     3  1.0  4.0
//! ```
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_yaml_ng::{Mapping, Value};

use crate::{field_groups::FieldGroups, fluxerr_errors::FluxErrError, grid::GridDefinition};

const KEY_BINS: &str = "FLUXERRMAP_BINS";
const KEY_FIELDS: &str = "FIELDS";
const KEY_CUTWIN_NSIG: &str = "CUTWIN_NSIG";

/// Annotated example printed by `make_fluxerr_model --help-config`.
pub const HELP_CONFIG: &str = r#"
# keys for input config file

OUTDIR: [OUTDIR]   # name of output directory

# optional, reject extreme NSIG outliers
CUTWIN_NSIG:  0.0  [NSIG_MAX]

# Optional map-computation in independent groups of fields.
# Here the maps are computed for SHALLOW and DEEP field groups.
FIELDS:
  SHALLOW:  S1 S2 C1 C2 X1 X2 E1 E2
  DEEP:     X3 C3

# Define multi-dimensional map bins using variable(s) from OUTLIER table.
# Values outside map-bin range are pulled into first/last map bin so
# that all obs are used.

FLUXERRMAP_BINS:
  - FILTER                 # auto compute bins from filters in data file
  - SBMAG   8  20   28     # nbin min max (histogram bins)
  - PSF     3  1.0  4.0    # idem
"#;

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "OUTDIR", default)]
    outdir: Option<Utf8PathBuf>,
    #[serde(rename = "FLUXERRMAP_BINS", default)]
    fluxerrmap_bins: Option<Vec<String>>,
    #[serde(rename = "FIELDS", default)]
    fields: Option<Mapping>,
    #[serde(rename = "CUTWIN_NSIG", default)]
    cutwin_nsig: Option<Value>,
}

/// Validated configuration of the map stage.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Output directory of the pipeline (holds the flux tables and the maps).
    pub outdir: Option<Utf8PathBuf>,
    /// Raw `FLUXERRMAP_BINS` entries, parsed by [`GridDefinition::from_config_rows`].
    pub map_bins: Vec<String>,
    /// Field groups, empty when the maps do not depend on the field.
    pub field_groups: FieldGroups,
    /// Rows with `NSIG >= nsig_max` are rejected before binning.
    pub nsig_max: Option<f64>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn invalid(key: &str, value: &Value) -> FluxErrError {
    FluxErrError::InvalidConfigValue {
        key: key.to_string(),
        value: format!("{value:?}"),
    }
}

fn parse_field_groups(fields: &Mapping) -> Result<FieldGroups, FluxErrError> {
    let groups = fields
        .iter()
        .map(|(name, list)| {
            let name = scalar_to_string(name).ok_or_else(|| invalid(KEY_FIELDS, name))?;
            let list = scalar_to_string(list).ok_or_else(|| invalid(KEY_FIELDS, list))?;
            let labels: Vec<String> = list.split_whitespace().map(str::to_string).collect();
            if labels.is_empty() {
                return Err(FluxErrError::InvalidConfigValue {
                    key: format!("{KEY_FIELDS}.{name}"),
                    value: list,
                });
            }
            Ok((name, labels))
        })
        .collect::<Result<Vec<_>, FluxErrError>>()?;

    Ok(FieldGroups::new(groups))
}

/// `CUTWIN_NSIG: min max`; only `max` is used.
fn parse_nsig_max(cutwin: &Value) -> Result<f64, FluxErrError> {
    let text = scalar_to_string(cutwin).ok_or_else(|| invalid(KEY_CUTWIN_NSIG, cutwin))?;
    let bounds: Vec<&str> = text.split_whitespace().collect();
    match bounds.as_slice() {
        [_, max] => max
            .parse::<f64>()
            .map_err(|_| invalid(KEY_CUTWIN_NSIG, cutwin)),
        _ => Err(invalid(KEY_CUTWIN_NSIG, cutwin)),
    }
}

impl MapConfig {
    /// Parse the YAML text of a pipeline input file.
    pub fn from_yaml_str(text: &str) -> Result<Self, FluxErrError> {
        let raw: RawConfig = serde_yaml_ng::from_str(text)?;

        let map_bins = raw
            .fluxerrmap_bins
            .ok_or_else(|| FluxErrError::MissingConfigKey(KEY_BINS.to_string()))?;

        let field_groups = match &raw.fields {
            Some(fields) => parse_field_groups(fields)?,
            None => FieldGroups::default(),
        };

        let nsig_max = raw.cutwin_nsig.as_ref().map(parse_nsig_max).transpose()?;

        Ok(MapConfig {
            outdir: raw.outdir,
            map_bins,
            field_groups,
            nsig_max,
        })
    }

    /// Read and parse a YAML input file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, FluxErrError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Build the map grid, with the field dimension first when field groups are configured.
    pub fn build_grid(&self) -> Result<GridDefinition, FluxErrError> {
        GridDefinition::from_config_rows(&self.map_bins, self.field_groups.len())
    }
}
