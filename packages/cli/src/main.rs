#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `smoke`: wildfire smoke research pipeline for Kingman, AZ.
//!
//! Reduces the USGS combined wildland fire dataset to one row per fire
//! (closest perimeter point and distance to Kingman), aggregates yearly
//! county AQI from EPA AQS, and provides tooling to inspect and subset the
//! fire dataset.
//!
//! Uses `indicatif-log-bridge` (via [`smoke_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use smoke_fire::extract::FireTarget;
use smoke_geodesy::Crs;

use crate::config::{CONFIG_ENV, SmokeConfig};

#[derive(Parser)]
#[command(name = "smoke", about = "Wildfire smoke research pipeline")]
struct Cli {
    /// Config file (defaults to `$SMOKE_CONFIG`, then `smoke.toml` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce fire perimeters to the closest point and distance (wf_data.csv)
    Reduce {
        /// Fire dataset (JSON record array or Esri `FeatureSet`)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output CSV
        #[arg(long)]
        output: Option<PathBuf>,
        /// CRS of inputs that do not declare one (e.g. "ESRI:102008")
        #[arg(long, value_parser = Crs::parse_code)]
        crs: Option<Crs>,
    },
    /// Aggregate yearly mean AQI for the county (aqi_data.csv)
    Aqi {
        /// First year, inclusive
        #[arg(long)]
        start_year: Option<i32>,
        /// Last year, inclusive
        #[arg(long)]
        end_year: Option<i32>,
        /// Output CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run both stages
    Run,
    /// Stream a fire dataset and report its header and feature count
    Inspect {
        /// Fire dataset
        #[arg(long)]
        input: PathBuf,
    },
    /// Copy named fires from a large dataset into a small one
    Extract {
        /// Fire dataset
        #[arg(long)]
        input: PathBuf,
        /// Destination file
        #[arg(long, default_value = "extraction_sample.json")]
        output: PathBuf,
        /// Fire to extract as NAME or NAME:YEAR (repeatable)
        #[arg(long = "fire", required = true)]
        fires: Vec<FireTarget>,
        /// Keep prescribed and unknown fire types too
        #[arg(long)]
        all_types: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = smoke_cli_utils::init_logger();

    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = SmokeConfig::load(config_path.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());

    match cli.command {
        Commands::Reduce { input, output, crs } => {
            if let Some(input) = input {
                config.fire.input = input;
            }
            if let Some(output) = output {
                config.fire.output = output;
            }
            if let Some(crs) = crs {
                config.fire.input_crs = crs;
            }
            config.validate()?;
            pipeline::reduce(&config, &multi)?;
        }
        Commands::Aqi {
            start_year,
            end_year,
            output,
        } => {
            if let Some(start_year) = start_year {
                config.aqi.start_year = start_year;
            }
            if let Some(end_year) = end_year {
                config.aqi.end_year = end_year;
            }
            if let Some(output) = output {
                config.aqi.output = output;
            }
            config.validate()?;
            pipeline::aqi(&config, &multi).await?;
        }
        Commands::Run => {
            config.validate()?;
            let mut failed = Vec::new();
            if let Err(e) = pipeline::reduce(&config, &multi) {
                log::error!("Fire stage failed: {e}");
                failed.push("fire");
            }
            if let Err(e) = pipeline::aqi(&config, &multi).await {
                log::error!("AQI stage failed: {e}");
                failed.push("aqi");
            }
            if !failed.is_empty() {
                return Err(format!("stage(s) failed: {}", failed.join(", ")).into());
            }
        }
        Commands::Inspect { input } => pipeline::inspect(&input, &multi)?,
        Commands::Extract {
            input,
            output,
            fires,
            all_types,
        } => pipeline::extract(&input, &output, &fires, !all_types, &multi)?,
        Commands::ShowConfig => print!("{}", config.to_redacted_toml()?),
    }

    Ok(())
}
