//! # FLUXERRMODEL map serializer
//!
//! Writes one map file (data-facing or simulation-facing) to any [`std::io::Write`] sink. The
//! layout is read by the downstream light-curve fitter and simulator, so the text below is an
//! exact contract:
//!
//! ```text
//! DOCUMENTATION:
//!   PURPOSE: ...
//!   ...
//! DOCUMENTATION_END:
//!
//!
//! DEFINE_FIELDGROUP: SHALLOW  S1+S2        (one per field group)
//!
//! MAPNAME: FLUXERR_SCALE
//! FIELD: SHALLOW                           (field-dependent maps only)
//! BAND: g
//! VARNAMES: SBMAG PSF   ERRSCALE
//! ROW:  20.5000    1.5000     1.023    # N_FAKE = 132
//! ...
//! ENDMAP:
//! ```
//!
//! The writer flushes after the global header, after every section header and after every
//! `ENDMAP:` so a partially written map can be followed while the run progresses.
use std::io::{self, Write};

use itertools::Itertools;

use crate::{
    constants::{MAPNAME, STRING_FAKE, STRING_SIM, VARNAME_ERRSCALE},
    errscale::CorrectionResult,
    field_groups::FieldGroups,
    fluxerr_errors::FluxErrError,
};

/// Attribution written in the documentation block of every map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    pub user: String,
    pub host: String,
    /// Command line that created the map.
    pub command: String,
}

/// Which of the two maps a writer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFlavor {
    /// Corrects `FLUXCAL_ERR_DATA` of real data and fakes.
    Fake,
    /// Corrects the modeled uncertainty of the simulation.
    Sim,
}

impl MapFlavor {
    pub fn tag(&self) -> &'static str {
        match self {
            MapFlavor::Fake => STRING_FAKE,
            MapFlavor::Sim => STRING_SIM,
        }
    }

    fn purpose(&self) -> &'static str {
        match self {
            MapFlavor::Fake => "FAKES and DATA",
            MapFlavor::Sim => STRING_SIM,
        }
    }

    fn usage_code(&self) -> &'static str {
        match self {
            MapFlavor::Fake => "snlc_fit.exe",
            MapFlavor::Sim => "snana.exe and snlc_sim.exe",
        }
    }

    fn usage_key(&self) -> &'static str {
        match self {
            MapFlavor::Fake => "FLUXERRMODEL_FILE in &SNLCINP",
            MapFlavor::Sim => "FLUXERRMODEL_FILE",
        }
    }

    /// Correction carried by this map.
    pub fn scale(&self, cor: &CorrectionResult) -> f64 {
        match self {
            MapFlavor::Fake => cor.scale_fake,
            MapFlavor::Sim => cor.scale_sim,
        }
    }

    fn nobs_note(&self, nrow_fake: usize, nrow_sim: usize) -> String {
        match self {
            MapFlavor::Fake => format!("Nobs(FAKE) = {nrow_fake} "),
            MapFlavor::Sim => format!("Nobs(FAKE,SIM) = {nrow_fake}, {nrow_sim}"),
        }
    }

    fn write_row_comment<W: Write>(&self, out: &mut W, cor: &CorrectionResult) -> io::Result<()> {
        match self {
            MapFlavor::Fake => writeln!(out, "    # N_FAKE = {}  ", cor.n_fake),
            MapFlavor::Sim => writeln!(
                out,
                "    # N_[FAKE,SIM] = {} , {} ",
                cor.n_fake, cor.n_sim
            ),
        }
    }
}

/// Inputs of the `DOCUMENTATION:` block.
#[derive(Debug, Clone, Copy)]
pub struct MapDocumentation<'a> {
    /// Map dimensions with the categorical ones named `FIELD` and `BAND`.
    pub varnames: &'a [&'a str],
    pub field_groups: &'a FieldGroups,
    /// Row counts after cuts.
    pub nrow_fake: usize,
    pub nrow_sim: usize,
    pub metadata: &'a RunMetadata,
}

/// Streaming writer of one map file.
pub struct MapWriter<W: Write> {
    out: W,
    flavor: MapFlavor,
}

impl<W: Write> MapWriter<W> {
    pub fn new(out: W, flavor: MapFlavor) -> Self {
        MapWriter { out, flavor }
    }

    pub fn flavor(&self) -> MapFlavor {
        self.flavor
    }

    /// Write the documentation block and the field-group definitions.
    pub fn write_global_header(&mut self, doc: &MapDocumentation) -> Result<(), FluxErrError> {
        let flavor = self.flavor;
        let meta = doc.metadata;
        let notes = [
            format!("  PURPOSE: correct flux uncertainty for {}", flavor.purpose()),
            "  REF:".to_string(),
            "  - AUTHOR: Kessler et al, 2019 (DES3YR sims, see Sec 6.4)".to_string(),
            "    ADS:    https://ui.adsabs.harvard.edu/abs/2019MNRAS.485.1171K".to_string(),
            "  INTENT:  Test".to_string(),
            format!("  USAGE_CODE:  {}", flavor.usage_code()),
            format!("  USAGE_KEY:   {}", flavor.usage_key()),
            "  NOTES:".to_string(),
            format!("  - map dependence is {}", doc.varnames.join(" ")),
            format!("  - {}", flavor.nobs_note(doc.nrow_fake, doc.nrow_sim)),
            format!("  - map-create command =  {} ", meta.command),
            format!("  - created by user={} on HOST={}  ", meta.user, meta.host),
        ];
        write!(self.out, "DOCUMENTATION:\n{}\n    ", notes.join("\n"))?;
        write!(self.out, "\nDOCUMENTATION_END:\n\n\n")?;

        for (name, fields) in doc.field_groups.iter() {
            writeln!(self.out, "DEFINE_FIELDGROUP: {name}  {}", fields.iter().join("+"))?;
        }

        self.out.flush()?;
        Ok(())
    }

    /// Start a map section.
    ///
    /// Arguments
    /// -----------------
    /// * `field`: field-group name, `None` for maps without field dependence.
    /// * `band`: a single band, or all observed bands concatenated when the map has no filter
    ///   dimension.
    /// * `varnames`: continuous dimensions of the map.
    pub fn write_section_header(
        &mut self,
        field: Option<&str>,
        band: &str,
        varnames: &[&str],
    ) -> Result<(), FluxErrError> {
        writeln!(self.out)?;
        writeln!(self.out, "MAPNAME: {MAPNAME} ")?;
        if let Some(field) = field {
            writeln!(self.out, "FIELD: {field} ")?;
        }
        writeln!(self.out, "BAND: {band} ")?;
        writeln!(self.out, "VARNAMES: {}   {VARNAME_ERRSCALE}", varnames.join(" "))?;
        self.out.flush()?;
        Ok(())
    }

    /// Write the `ROW:` line of one cell, then `ENDMAP:` when the cell closes its section.
    pub fn write_row(
        &mut self,
        centers: &[f64],
        cor: &CorrectionResult,
        last_in_section: bool,
    ) -> Result<(), FluxErrError> {
        write!(self.out, "ROW: ")?;
        for center in centers {
            write!(self.out, "{center:8.4}  ")?;
        }
        write!(self.out, "{:8.3}", self.flavor.scale(cor))?;
        self.flavor.write_row_comment(&mut self.out, cor)?;

        if last_in_section {
            write!(self.out, "ENDMAP:\n\n")?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FluxErrError> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(mut self) -> Result<W, FluxErrError> {
        self.out.flush()?;
        Ok(self.out)
    }
}
