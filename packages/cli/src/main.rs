#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for the tisza map tools.
//!
//! Ingests TrashOut waste reports into a local `DuckDB` file and tags each
//! report with the nearest river from an `OpenStreetMap` `GeoJSON` export.
//! `schedule` repeats ingest and enrichment on a fixed interval.
//!
//! Uses `indicatif-log-bridge` (via [`tisza_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tisza_map_database::WasteStore;
use tisza_map_projection::CoordinateProjector;
use tisza_map_river::NearestRiverFinder;

use crate::config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "tisza_map", about = "Waste report ingestion and river enrichment")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Configuration file (default: `tisza_map.toml` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// `DuckDB` waste database (overrides `TISZA_MAP_DATABASE`)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// River `GeoJSON` file (overrides `TISZA_MAP_RIVERS`)
    #[arg(long, global = true)]
    rivers: Option<PathBuf>,
    /// Maximum distance to a river, in meters (overrides `TISZA_MAP_THRESHOLD_METERS`)
    #[arg(long, global = true)]
    threshold_meters: Option<f64>,
    /// Nearest-river search strategy: `r-tree` or `linear-scan`
    #[arg(long, global = true)]
    strategy: Option<String>,
    /// Prune reports inactive for longer than this many years
    #[arg(long, global = true)]
    retention_years: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign the nearest river to every unchecked waste report
    Enrich,
    /// Fetch the TrashOut feed into the waste database
    Ingest,
    /// Ingest, then enrich, once
    Run,
    /// Ingest and enrich on a fixed interval until interrupted
    Schedule {
        /// Hours between cycles (overrides `TISZA_MAP_INTERVAL_HOURS`)
        #[arg(long)]
        interval_hours: Option<u64>,
    },
    /// Look up the rivers near a coordinate
    Nearest {
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Show recent ingestion runs
    Logs {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            database: self.global.database.clone(),
            rivers: self.global.rivers.clone(),
            threshold_meters: self.global.threshold_meters,
            strategy: self.global.strategy.clone(),
            interval_hours: if let Commands::Schedule { interval_hours } = self.command {
                interval_hours
            } else {
                None
            },
            retention_years: self.global.retention_years,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = tisza_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = Config::load(cli.global.config.as_deref(), &cli.overrides())?;

    match cli.command {
        Commands::Enrich => {
            let store: Arc<dyn WasteStore> = Arc::new(pipeline::open_store(&config)?);
            let summary = pipeline::enrich_in_background(&config, store, &multi).await?;
            println!(
                "{} checked, {} matched, {} no match, {} invalid, {} save failures",
                summary.candidates,
                summary.matched,
                summary.no_match,
                summary.invalid,
                summary.save_failed,
            );
        }
        Commands::Ingest => {
            let store = pipeline::open_store(&config)?;
            let result = pipeline::ingest(&config, &store).await?;
            println!(
                "{} fetched, {} saved, {} deleted, {} total",
                result.records_fetched,
                result.records_saved,
                result.records_deleted,
                result.total_count,
            );
        }
        Commands::Run => {
            let store: Arc<dyn WasteStore> = Arc::new(pipeline::open_store(&config)?);
            pipeline::run_cycle(&config, &store, &multi).await?;
        }
        Commands::Schedule { .. } => {
            let store: Arc<dyn WasteStore> = Arc::new(pipeline::open_store(&config)?);
            pipeline::schedule(&config, &store, &multi).await?;
        }
        Commands::Nearest { lon, lat } => nearest(&config, lon, lat)?,
        Commands::Logs { limit } => {
            let store = pipeline::open_store(&config)?;
            println!("{:<6} {:<26} {:>8} {:>8} {:>8}", "ID", "TIME", "SAVED", "DELETED", "TOTAL");
            println!("{}", "-".repeat(60));
            for entry in store.recent_update_logs(limit)? {
                println!(
                    "{:<6} {:<26} {:>8} {:>8} {:>8}",
                    entry.id.unwrap_or_default(),
                    entry.update_time.format("%Y-%m-%d %H:%M:%S UTC"),
                    entry.update_count,
                    entry.delete_count,
                    entry.total_count,
                );
            }
        }
    }

    Ok(())
}

/// Prints every river within the threshold of a coordinate, nearest first.
fn nearest(config: &Config, lon: f64, lat: f64) -> Result<(), Box<dyn std::error::Error>> {
    let projector = CoordinateProjector::new()?;
    let rivers = tisza_map_river::load_path(&config.rivers, &projector)?;
    let finder = NearestRiverFinder::new(&rivers, &projector, config.index_strategy()?);

    let point = projector.project(lon, lat)?;
    let ranked = finder.ranked_within(point, config.threshold_meters);

    if ranked.is_empty() {
        println!("No river within {} m of ({lon}, {lat})", config.threshold_meters);
        return Ok(());
    }

    for m in ranked {
        println!("{:<30} {:>10.1} m", m.name, m.distance);
    }

    Ok(())
}
