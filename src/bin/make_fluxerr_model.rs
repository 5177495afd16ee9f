//! Create the FLUXERRMODEL maps from the stage-3 flux tables of a fluxerr-model run.
//!
//! Usage:
//! ```text
//! make_fluxerr_model FLUXERRMODEL_DES.yml
//! make_fluxerr_model FLUXERRMODEL_DES.yml --outdir OUT --summary -v
//! make_fluxerr_model --help-config
//! ```

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use log::{error, info, LevelFilter};

use fluxerrmodel::{
    config::{MapConfig, HELP_CONFIG},
    constants::{FLUX_TABLE_FAKE, FLUX_TABLE_SIM},
    FluxErrError, FluxErrModel, RunMetadata,
};

#[derive(Parser)]
#[command(name = "make_fluxerr_model")]
#[command(about = "Create FLUXERRMODEL maps correcting flux uncertainties of data and simulation")]
#[command(version)]
struct Args {
    /// YAML input file of the fluxerr-model pipeline
    #[arg(required_unless_present = "help_config")]
    config: Option<Utf8PathBuf>,

    /// Flux table of the fakes (default: OUTDIR/STAGE03_fluxTable_FAKE.OUTLIER.TEXT)
    #[arg(long, value_name = "FILE")]
    fake_table: Option<Utf8PathBuf>,

    /// Flux table of the simulation (default: OUTDIR/STAGE03_fluxTable_SIM.OUTLIER.TEXT)
    #[arg(long, value_name = "FILE")]
    sim_table: Option<Utf8PathBuf>,

    /// Output directory, overrides OUTDIR of the input file
    #[arg(long, value_name = "DIR")]
    outdir: Option<Utf8PathBuf>,

    /// Print every map row with its counts and corrections
    #[arg(long)]
    summary: bool,

    /// Print help for the input config file
    #[arg(short = 'H', long)]
    help_config: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn env_or_unknown(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

fn run(args: &Args, config_path: &Utf8PathBuf) -> Result<(), FluxErrError> {
    let config = MapConfig::from_file(config_path)?;

    let outdir = args
        .outdir
        .clone()
        .or_else(|| config.outdir.clone())
        .ok_or_else(|| FluxErrError::MissingConfigKey("OUTDIR".to_string()))?;
    let fake_table = args
        .fake_table
        .clone()
        .unwrap_or_else(|| outdir.join(FLUX_TABLE_FAKE));
    let sim_table = args
        .sim_table
        .clone()
        .unwrap_or_else(|| outdir.join(FLUX_TABLE_SIM));

    let metadata = RunMetadata {
        user: env_or_unknown("USER"),
        host: env_or_unknown("HOSTNAME"),
        command: std::env::args().collect::<Vec<_>>().join(" "),
    };

    let model = FluxErrModel::from_config(&config, metadata)?;
    let summary = model.run(&fake_table, &sim_table, &outdir)?;

    info!(
        "Wrote {} map rows in {} sections",
        summary.cells.len(),
        summary.n_sections
    );
    if args.summary {
        println!("{summary}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if args.help_config {
        println!("{HELP_CONFIG}");
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = args.config.as_ref() else {
        error!("missing input config file");
        return ExitCode::FAILURE;
    };

    match run(&args, config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
