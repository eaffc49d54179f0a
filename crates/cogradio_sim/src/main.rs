//! Scenario driver for the cognitive-radio spectrum manager.
//!
//! ```text
//! cogradio-sim run --config scenarios/two_cells.toml --csv stats.csv
//! cogradio-sim gen-map --count 20 --channels 11 --area 1000 --out pu_map.toml
//! cogradio-sim check-map pu_map.toml
//! ```

mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cogradio_core::pu::map_file;
use cogradio_core::{MapGenerator, PuModel, Scenario, ScenarioConfig};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "cogradio-sim")]
#[command(about = "Cognitive-radio spectrum management simulator")]
struct Cli {
    /// Emit JSON logs and a JSON run summary
    #[arg(long, global = true)]
    json: bool,

    /// Log every state change and decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario to its configured duration
    Run {
        /// Scenario TOML file
        #[arg(long)]
        config: PathBuf,
        /// PU map file, replaces the one named in the scenario
        #[arg(long)]
        pu_map: Option<PathBuf>,
        /// Simulated seconds, replaces scenario.duration_secs
        #[arg(long)]
        duration: Option<f64>,
        /// Seed for PU timelines and fallback draws
        #[arg(long)]
        seed: Option<u64>,
        /// Write per-node statistics as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Generate a random PU map
    GenMap {
        /// Number of PU records
        #[arg(long, default_value = "10")]
        count: usize,
        /// Spectrum width
        #[arg(long, default_value = "11")]
        channels: usize,
        /// Side of the square deployment area (metres)
        #[arg(long, default_value = "1000.0")]
        area: f64,
        /// Output file
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "1")]
        seed: u64,
    },
    /// Validate a PU map file
    CheckMap {
        file: PathBuf,
        /// Spectrum width to validate against (default: widest channel used)
        #[arg(long)]
        channels: Option<usize>,
    },
}

fn init_logging(json: bool, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("setting default subscriber failed")
}

fn run(
    config_path: PathBuf,
    pu_map: Option<PathBuf>,
    duration: Option<f64>,
    seed: Option<u64>,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = ScenarioConfig::load(&config_path)
        .with_context(|| format!("loading scenario {}", config_path.display()))?;
    if let Some(path) = pu_map {
        config.scenario.pu_map = Some(path);
        config.activity.clear();
    }
    if let Some(secs) = duration {
        config.scenario.duration_secs = secs;
    }
    if let Some(seed) = seed {
        config.scenario.seed = seed;
    }

    let mut scenario = Scenario::new(&config).context("building scenario")?;
    let report = scenario.run().context("running scenario")?;

    if let Some(path) = csv {
        output::write_csv(&path, &report)?;
        info!(path = %path.display(), rows = report.nodes.len(), "Wrote statistics");
    }
    if json {
        println!("{}", report.to_json()?);
    } else {
        output::print_table(&report);
    }
    Ok(())
}

fn gen_map(count: usize, channels: usize, area: f64, out: PathBuf, seed: u64) -> Result<()> {
    let generator = MapGenerator {
        count,
        num_channels: channels,
        area,
        ..MapGenerator::default()
    };
    let mut model = PuModel::new(channels);
    model.set_activities(generator.generate(seed)?)?;
    model
        .write_pu_map_file(&out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), records = count, channels, seed, "PU map written");
    Ok(())
}

fn check_map(file: PathBuf, channels: Option<usize>) -> Result<()> {
    let activities = map_file::read(&file)?;
    let widest = activities
        .iter()
        .map(|a| a.main_channel.saturating_add(a.number_data).saturating_add(1))
        .max()
        .unwrap_or(0);
    let width = channels.unwrap_or(widest);
    if width == 0 {
        bail!("{} has no PU records", file.display());
    }

    let mut model = PuModel::new(width);
    model
        .set_activities(activities)
        .with_context(|| format!("validating {}", file.display()))?;

    let permanent = model
        .activities()
        .iter()
        .filter(|a| a.alpha == 0.0 && a.beta.is_infinite())
        .count();
    info!(
        path = %file.display(),
        records = model.len(),
        channels = width,
        permanent,
        "PU map is valid"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.json, cli.verbose) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Run {
            config,
            pu_map,
            duration,
            seed,
            csv,
        } => run(config, pu_map, duration, seed, csv, cli.json),
        Commands::GenMap {
            count,
            channels,
            area,
            out,
            seed,
        } => gen_map(count, channels, area, out, seed),
        Commands::CheckMap { file, channels } => check_map(file, channels),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            ExitCode::FAILURE
        }
    }
}
