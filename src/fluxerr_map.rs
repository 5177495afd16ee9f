//! # FLUXERRMODEL map construction
//!
//! [`FluxErrModel`] ties the stages together:
//!
//! 1. the grid and the field groups come from the [`MapConfig`],
//! 2. both flux tables are prepared against that grid ([`prepare_table`]),
//! 3. rows are grouped by cell and [`compute_errscale_cor`] runs once per visited cell,
//! 4. the data-facing and the simulation-facing maps are written side by side, in ascending cell
//!    order, by two [`MapWriter`]s.
//!
//! Sections
//! -----------------
//! A map section is identified by its `(field group, filter)` bins. A new section header is
//! written whenever that key changes. Filter identities that never occur in the fake table are
//! skipped entirely, so a map with a filter dimension only holds sections for observed bands.
//! Without a filter dimension the `BAND:` line lists every observed band.
//!
//! Example
//! -----------------
//! ```rust,no_run
//! use camino::Utf8Path;
//! use fluxerrmodel::{config::MapConfig, fluxerr_map::FluxErrModel, map_writer::RunMetadata};
//!
//! let config = MapConfig::from_file(Utf8Path::new("FLUXERRMODEL.yml")).unwrap();
//! let model = FluxErrModel::from_config(&config, RunMetadata::default()).unwrap();
//! let summary = model
//!     .run(
//!         Utf8Path::new("OUT/STAGE03_fluxTable_FAKE.OUTLIER.TEXT"),
//!         Utf8Path::new("OUT/STAGE03_fluxTable_SIM.OUTLIER.TEXT"),
//!         Utf8Path::new("OUT"),
//!     )
//!     .unwrap();
//! println!("{summary}");
//! ```
use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use log::{info, warn};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

use crate::{
    config::MapConfig,
    constants::{
        CellIndex, FLUXERRMODEL_FILENAME_FAKE, FLUXERRMODEL_FILENAME_SIM, MIN_CELL_STATS,
    },
    errscale::{compute_errscale_cor, CorrectionResult},
    field_groups::FieldGroups,
    filters::FilterSet,
    flux_table::{
        prepare::{prepare_table, PreparedTable, TableCuts},
        FluxTable, TableColumns,
    },
    fluxerr_errors::FluxErrError,
    grid::GridDefinition,
    map_writer::{MapDocumentation, MapFlavor, MapWriter, RunMetadata},
};

/// One written map row.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSummary {
    pub cell: CellIndex,
    /// Field-group name, for field-dependent maps.
    pub field: Option<String>,
    /// Band of the section the row belongs to.
    pub band: String,
    /// Bin centers of the continuous dimensions.
    pub centers: Vec<f64>,
    pub correction: CorrectionResult,
}

/// Everything written to the two maps, row by row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSummary {
    pub varnames: Vec<String>,
    pub nrow_fake: usize,
    pub nrow_sim: usize,
    /// Number of map sections (`MAPNAME:` blocks) in each file.
    pub n_sections: usize,
    pub cells: Vec<CellSummary>,
}

impl MapSummary {
    /// Rows whose corrections were actually measured (enough statistics in both samples).
    pub fn measured_cells(&self) -> impl Iterator<Item = &CellSummary> {
        self.cells.iter().filter(|c| {
            c.correction.n_fake > MIN_CELL_STATS && c.correction.n_sim > MIN_CELL_STATS
        })
    }
}

impl fmt::Display for MapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "FLUXERRMODEL maps: {} sections, {} rows, Nobs(FAKE,SIM) = {}, {}",
            self.n_sections,
            self.cells.len(),
            self.nrow_fake,
            self.nrow_sim
        )?;

        let with_field = self.cells.iter().any(|c| c.field.is_some());

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let mut header = vec![Cell::new("#")];
        if with_field {
            header.push(Cell::new("FIELD"));
        }
        header.push(Cell::new("BAND"));
        header.extend(self.varnames.iter().map(Cell::new));
        header.extend(
            ["N_FAKE", "N_SIM", "ERRSCALE FAKE", "ERRSCALE SIM"]
                .into_iter()
                .map(Cell::new),
        );
        table.set_header(header);

        for c in &self.cells {
            let mut row = vec![Cell::new(c.cell).set_alignment(CellAlignment::Right)];
            if with_field {
                row.push(Cell::new(c.field.as_deref().unwrap_or("")));
            }
            row.push(Cell::new(&c.band));
            row.extend(
                c.centers
                    .iter()
                    .map(|x| Cell::new(format!("{x:.4}")).set_alignment(CellAlignment::Right)),
            );
            row.push(Cell::new(c.correction.n_fake).set_alignment(CellAlignment::Right));
            row.push(Cell::new(c.correction.n_sim).set_alignment(CellAlignment::Right));
            row.push(
                Cell::new(format!("{:.3}", c.correction.scale_fake))
                    .set_alignment(CellAlignment::Right),
            );
            row.push(
                Cell::new(format!("{:.3}", c.correction.scale_sim))
                    .set_alignment(CellAlignment::Right),
            );
            table.add_row(Row::from(row));
        }

        write!(f, "{table}")
    }
}

/// Both flux tables prepared against the grid, with the filters observed in the fakes.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMaps {
    pub filters: FilterSet,
    pub fake: PreparedTable,
    pub sim: PreparedTable,
}

/// Map builder, configured once and applied to a pair of flux tables.
#[derive(Debug, Clone)]
pub struct FluxErrModel {
    grid: GridDefinition,
    field_groups: FieldGroups,
    cuts: TableCuts,
    metadata: RunMetadata,
}

#[cfg(feature = "progress")]
fn cell_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new((total as u64).max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

fn cell_values(values: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|row| values[*row]).collect()
}

impl FluxErrModel {
    pub fn new(
        grid: GridDefinition,
        field_groups: FieldGroups,
        cuts: TableCuts,
        metadata: RunMetadata,
    ) -> Self {
        FluxErrModel {
            grid,
            field_groups,
            cuts,
            metadata,
        }
    }

    /// Build the grid described by a configuration.
    pub fn from_config(config: &MapConfig, metadata: RunMetadata) -> Result<Self, FluxErrError> {
        Ok(Self::new(
            config.build_grid()?,
            config.field_groups.clone(),
            TableCuts {
                nsig_max: config.nsig_max,
            },
            metadata,
        ))
    }

    pub fn grid(&self) -> &GridDefinition {
        &self.grid
    }

    pub fn field_groups(&self) -> &FieldGroups {
        &self.field_groups
    }

    /// Columns the flux tables must provide for this grid.
    pub fn table_columns(&self) -> TableColumns {
        TableColumns::for_grid(&self.grid)
    }

    /// Read the fake and simulation tables (plain or gzip).
    pub fn read_tables(
        &self,
        fake_path: &Utf8Path,
        sim_path: &Utf8Path,
    ) -> Result<(FluxTable, FluxTable), FluxErrError> {
        let columns = self.table_columns();
        let fake = FluxTable::read(fake_path, &columns)?;
        let sim = FluxTable::read(sim_path, &columns)?;
        Ok((fake, sim))
    }

    /// Observed filters and both prepared tables.
    ///
    /// Every data error of a run (unknown field, filter out of range, missing variable) is raised
    /// here, before anything is written.
    pub fn prepare(&self, fake: &FluxTable, sim: &FluxTable) -> Result<PreparedMaps, FluxErrError> {
        let filters = FilterSet::from_table(fake)?;
        let fake = prepare_table(fake, &self.grid, &self.field_groups, &self.cuts)?;
        let sim = prepare_table(sim, &self.grid, &self.field_groups, &self.cuts)?;
        Ok(PreparedMaps { filters, fake, sim })
    }

    /// Compute both maps and write them to the given sinks.
    ///
    /// Arguments
    /// -----------------
    /// * `fake`, `sim`: flux tables of the fakes and of the simulation.
    /// * `out_fake`: sink of the data-facing map (`scale_fake`, fake counts).
    /// * `out_sim`: sink of the simulation-facing map (`scale_sim`, both counts).
    ///
    /// Return
    /// ----------
    /// * A [`MapSummary`] of every written row, or the first [`FluxErrError`] met while preparing
    ///   the tables or writing the maps. Nothing reaches the sinks when preparation fails.
    pub fn write_maps<WF: Write, WS: Write>(
        &self,
        fake: &FluxTable,
        sim: &FluxTable,
        out_fake: WF,
        out_sim: WS,
    ) -> Result<MapSummary, FluxErrError> {
        let prepared = self.prepare(fake, sim)?;
        self.write_prepared(&prepared, out_fake, out_sim)
    }

    /// Write both maps from already prepared tables.
    pub fn write_prepared<WF: Write, WS: Write>(
        &self,
        prepared: &PreparedMaps,
        out_fake: WF,
        out_sim: WS,
    ) -> Result<MapSummary, FluxErrError> {
        let mut writer_fake = MapWriter::new(out_fake, MapFlavor::Fake);
        let mut writer_sim = MapWriter::new(out_sim, MapFlavor::Sim);

        let doc_varnames = self.grid.documentation_varnames();
        let doc = MapDocumentation {
            varnames: &doc_varnames,
            field_groups: &self.field_groups,
            nrow_fake: prepared.fake.nrow(),
            nrow_sim: prepared.sim.nrow(),
            metadata: &self.metadata,
        };
        writer_fake.write_global_header(&doc)?;
        writer_sim.write_global_header(&doc)?;

        let summary = self.fill_maps(prepared, &mut writer_fake, &mut writer_sim)?;

        writer_fake.flush()?;
        writer_sim.flush()?;
        Ok(summary)
    }

    fn fill_maps<WF: Write, WS: Write>(
        &self,
        prepared: &PreparedMaps,
        writer_fake: &mut MapWriter<WF>,
        writer_sim: &mut MapWriter<WS>,
    ) -> Result<MapSummary, FluxErrError> {
        let PreparedMaps {
            filters,
            fake: prep_fake,
            sim: prep_sim,
        } = prepared;
        let grid = &self.grid;
        let linear_size = grid.linear_size();
        let rows_fake = prep_fake.group_by_cell(linear_size);
        let rows_sim = prep_sim.group_by_cell(linear_size);

        let varnames = grid.header_varnames();
        let all_bands = filters.band_string();

        let mut summary = MapSummary {
            varnames: varnames.iter().map(|v| v.to_string()).collect(),
            nrow_fake: prep_fake.nrow(),
            nrow_sim: prep_sim.nrow(),
            ..Default::default()
        };
        let mut section: Option<(Option<usize>, Option<usize>)> = None;

        info!(" Begin loop over {linear_size} 1D map bins ... ");
        #[cfg(feature = "progress")]
        let pb = cell_progress_bar(linear_size);

        for (cell, bins) in grid.cells() {
            #[cfg(feature = "progress")]
            pb.inc(1);

            let ifield = grid.field_axis().map(|axis| bins[axis]);
            let ifilt = grid.filter_axis().map(|axis| bins[axis]);

            let band = match ifilt {
                Some(id) => match filters.band(id) {
                    Some(band) => band,
                    // padding of the filter space
                    None => continue,
                },
                None => all_bands.as_str(),
            };
            let field = ifield.map(|igroup| self.field_groups.name(igroup));

            if section != Some((ifield, ifilt)) {
                writer_fake.write_section_header(field, band, &varnames)?;
                writer_sim.write_section_header(field, band, &varnames)?;
                section = Some((ifield, ifilt));
                summary.n_sections += 1;
            }

            let fake_rows = &rows_fake[cell];
            let correction = compute_errscale_cor(
                &cell_values(&prep_fake.pull, fake_rows),
                &cell_values(&prep_fake.err_ratio, fake_rows),
                &cell_values(&prep_sim.pull, &rows_sim[cell]),
            );

            let centers = grid.continuous_centers(&bins);
            let last_in_section = grid.is_last_in_section(&bins);
            writer_fake.write_row(&centers, &correction, last_in_section)?;
            writer_sim.write_row(&centers, &correction, last_in_section)?;

            summary.cells.push(CellSummary {
                cell,
                field: field.map(str::to_string),
                band: band.to_string(),
                centers,
                correction,
            });
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        Ok(summary)
    }

    /// Write `FLUXERRMODEL_FAKE.DAT` and `FLUXERRMODEL_SIM.DAT` into `outdir`.
    ///
    /// Existing map files are only replaced once both tables are prepared. A write failure
    /// removes the partially written maps.
    pub fn write_map_files(
        &self,
        fake: &FluxTable,
        sim: &FluxTable,
        outdir: &Utf8Path,
    ) -> Result<MapSummary, FluxErrError> {
        let prepared = self.prepare(fake, sim)?;
        let (path_fake, path_sim) = map_file_paths(outdir);

        let out_fake = BufWriter::new(File::create(&path_fake)?);
        let written = File::create(&path_sim)
            .map_err(FluxErrError::from)
            .and_then(|out_sim| {
                self.write_prepared(&prepared, out_fake, BufWriter::new(out_sim))
            });

        match written {
            Ok(summary) => {
                info!(" Done creating {path_fake} ");
                info!(" Done creating {path_sim} ");
                Ok(summary)
            }
            Err(err) => {
                discard_partial_map(&path_fake);
                discard_partial_map(&path_sim);
                Err(err)
            }
        }
    }

    /// Read both tables and write both map files.
    pub fn run(
        &self,
        fake_path: &Utf8Path,
        sim_path: &Utf8Path,
        outdir: &Utf8Path,
    ) -> Result<MapSummary, FluxErrError> {
        info!("Create FLUXERRMODEL maps in {outdir}");
        let (fake, sim) = self.read_tables(fake_path, sim_path)?;
        self.write_map_files(&fake, &sim, outdir)
    }
}

fn discard_partial_map(path: &Utf8Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!("could not remove partial map {path}: {err}");
    }
}

/// Paths of the two map files written into `outdir`.
pub fn map_file_paths(outdir: &Utf8Path) -> (Utf8PathBuf, Utf8PathBuf) {
    (
        outdir.join(FLUXERRMODEL_FILENAME_FAKE),
        outdir.join(FLUXERRMODEL_FILENAME_SIM),
    )
}

#[cfg(test)]
mod test_fluxerr_map {
    use super::*;

    fn table(rows: &[(i64, &str, &str, f64)]) -> FluxTable {
        let mut table = FluxTable {
            name: "unit".into(),
            ..Default::default()
        };
        let mut fields = Vec::new();
        let mut snr = Vec::new();
        for (i, (ifilt, band, field, value)) in rows.iter().enumerate() {
            // alternating pulls of +-1, +-2, +-3
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let pull = sign * (1 + i % 3) as f64;
            table.flux_data.push(100.0 + pull);
            table.flux_true.push(100.0);
            table.err_data.push(1.0);
            table.err_calc.push(1.0);
            table.ifiltobs.push(*ifilt);
            table.band.push(band.to_string());
            fields.push(field.to_string());
            snr.push(*value);
        }
        table.field = Some(fields);
        table.variables.insert("SNR".into(), snr);
        table
    }

    fn model(rows: &[&str], groups: FieldGroups) -> FluxErrModel {
        let grid = GridDefinition::from_config_rows(rows, groups.len()).unwrap();
        FluxErrModel::new(grid, groups, TableCuts::default(), RunMetadata::default())
    }

    fn run(model: &FluxErrModel, fake: &FluxTable, sim: &FluxTable) -> (MapSummary, String, String) {
        let mut out_fake = Vec::new();
        let mut out_sim = Vec::new();
        let summary = model.write_maps(fake, sim, &mut out_fake, &mut out_sim).unwrap();
        (
            summary,
            String::from_utf8(out_fake).unwrap(),
            String::from_utf8(out_sim).unwrap(),
        )
    }

    #[test]
    fn test_sections_follow_observed_filters() {
        let rows: Vec<(i64, &str, &str, f64)> = (0..40)
            .map(|i| if i % 2 == 0 { (3, "g", "S1", 2.0) } else { (7, "r", "S1", 8.0) })
            .collect();
        let fake = table(&rows);
        let model = model(&["FILTER", "SNR 2 0 10"], FieldGroups::default());
        let (summary, text_fake, text_sim) = run(&model, &fake, &fake);

        assert_eq!(summary.n_sections, 2);
        assert_eq!(summary.cells.len(), 4);
        assert_eq!(text_fake.matches("MAPNAME:").count(), 2);
        assert_eq!(text_fake.matches("ENDMAP:").count(), 2);
        assert_eq!(text_sim.matches("ROW:").count(), 4);
        assert!(text_fake.contains("BAND: g \nVARNAMES: SNR   ERRSCALE\n"));
        assert!(text_fake.contains("BAND: r \n"));
        assert!(!text_fake.contains("FIELD:"));

        let bands: Vec<&str> = summary.cells.iter().map(|c| c.band.as_str()).collect();
        assert_eq!(bands, vec!["g", "g", "r", "r"]);
        // same sample on both sides
        for cell in summary.measured_cells() {
            assert_eq!(cell.correction.scale_sim, 1.0);
        }
        assert_eq!(summary.measured_cells().count(), 2);
    }

    #[test]
    fn test_field_only_map() {
        let groups = FieldGroups::new(vec![
            ("SHALLOW".to_string(), vec!["S1".into()]),
            ("DEEP".to_string(), vec!["X3".into()]),
        ]);
        let rows: Vec<(i64, &str, &str, f64)> = (0..20)
            .map(|i| if i < 10 { (3, "g", "S1", 1.0) } else { (5, "i", "X3", 9.0) })
            .collect();
        let fake = table(&rows);
        let model = model(&["SNR 3 0 10"], groups);
        let (summary, text_fake, _) = run(&model, &fake, &fake);

        assert_eq!(summary.n_sections, 2);
        assert_eq!(summary.cells.len(), 6);
        assert_eq!(text_fake.matches("ENDMAP:").count(), 2);
        assert!(text_fake.contains("DEFINE_FIELDGROUP: SHALLOW  S1\n"));
        assert!(text_fake.contains("MAPNAME: FLUXERR_SCALE \nFIELD: SHALLOW \nBAND: gi \n"));
        assert!(text_fake.contains("MAPNAME: FLUXERR_SCALE \nFIELD: DEEP \nBAND: gi \n"));
        assert!(text_fake.contains("map dependence is FIELD SNR"));
        assert_eq!(summary.cells[0].field.as_deref(), Some("SHALLOW"));
        assert_eq!(summary.cells[5].field.as_deref(), Some("DEEP"));
    }

    #[test]
    fn test_preparation_error_writes_nothing() {
        let groups = FieldGroups::new(vec![("SHALLOW".to_string(), vec!["S1".into()])]);
        let rows: Vec<(i64, &str, &str, f64)> = (0..10)
            .map(|i| if i < 9 { (3, "g", "S1", 1.0) } else { (3, "g", "E2", 1.0) })
            .collect();
        let fake = table(&rows);
        let model = model(&["SNR 2 0 10"], groups);

        let mut out_fake = Vec::new();
        let mut out_sim = Vec::new();
        let err = model
            .write_maps(&fake, &fake, &mut out_fake, &mut out_sim)
            .unwrap_err();
        assert!(matches!(err, FluxErrError::FieldNotInGroup { .. }));
        assert!(out_fake.is_empty());
        assert!(out_sim.is_empty());
    }

    #[test]
    fn test_summary_display() {
        let rows: Vec<(i64, &str, &str, f64)> = (0..12).map(|_| (3, "g", "S1", 5.0)).collect();
        let fake = table(&rows);
        let model = model(&["SNR 1 0 10"], FieldGroups::default());
        let (summary, _, _) = run(&model, &fake, &fake);

        let text = summary.to_string();
        assert!(text.starts_with("FLUXERRMODEL maps: 1 sections, 1 rows, Nobs(FAKE,SIM) = 12, 12"));
        assert!(text.contains("ERRSCALE FAKE"));
        assert!(text.contains("5.0000"));
        assert!(!text.contains("FIELD"));
    }

    #[test]
    fn test_map_file_paths() {
        let (fake, sim) = map_file_paths(Utf8Path::new("OUT"));
        assert_eq!(fake, Utf8PathBuf::from("OUT/FLUXERRMODEL_FAKE.DAT"));
        assert_eq!(sim, Utf8PathBuf::from("OUT/FLUXERRMODEL_SIM.DAT"));
    }
}
