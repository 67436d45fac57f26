//! Ingest and enrichment cycles.
//!
//! A cycle syncs the waste feed into the store and then runs one
//! enrichment pass. An ingestion failure is logged and the pass still runs
//! over whatever the store already holds.
//!
//! The pass itself is synchronous (river loading, projection and `DuckDB`
//! writes), so cycles hand it to the blocking thread pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::MultiProgress;
use thiserror::Error;
use tisza_map_cli_utils::IndicatifProgress;
use tisza_map_database::{DbError, DuckDbWasteStore, WasteStore};
use tisza_map_enrich::{EnrichError, EnrichmentPass, PassSummary, RiverSource};
use tisza_map_ingest::{IngestError, TrashOutFeed};
use tisza_map_ingest_models::SyncResult;
use tokio::time::MissedTickBehavior;

use crate::config::{Config, ConfigError};

/// Errors that stop an enrichment pass from completing.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error("Enrichment task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Opens the configured waste database. Missing parent directories are
/// created by the store.
///
/// # Errors
///
/// Returns [`DbError`] if the directory cannot be created or the database
/// cannot be opened.
pub fn open_store(config: &Config) -> Result<DuckDbWasteStore, DbError> {
    DuckDbWasteStore::open(&config.database)
}

/// Runs one enrichment pass over every unchecked waste point.
///
/// # Errors
///
/// Returns [`PipelineError`] if the strategy is unknown, the river source is
/// unavailable, or the store cannot be queried.
pub fn enrich(
    config: &Config,
    store: &dyn WasteStore,
    multi: &MultiProgress,
) -> Result<PassSummary, PipelineError> {
    let pass = EnrichmentPass::new(config.threshold_meters, config.index_strategy()?);
    let source = RiverSource::from(config.rivers.as_path());
    let progress = IndicatifProgress::enrichment_bar(multi, "Loading rivers");

    Ok(pass.run(store, &source, Some(progress))?)
}

/// Runs [`enrich`] on the blocking thread pool.
///
/// # Errors
///
/// Returns [`PipelineError`] if the pass fails or its task panics.
pub async fn enrich_in_background(
    config: &Config,
    store: Arc<dyn WasteStore>,
    multi: &MultiProgress,
) -> Result<PassSummary, PipelineError> {
    let config = config.clone();
    let multi = multi.clone();

    tokio::task::spawn_blocking(move || enrich(&config, store.as_ref(), &multi)).await?
}

/// Fetches the TrashOut feed and syncs it into the store.
///
/// # Errors
///
/// Returns [`IngestError`] if the feed is misconfigured or unreachable, or
/// the store fails.
pub async fn ingest(config: &Config, store: &dyn WasteStore) -> Result<SyncResult, IngestError> {
    let feed = TrashOutFeed::new(config.trashout.clone())?;
    tisza_map_ingest::ingest(&feed, store, config.retention_years).await
}

/// Runs one full cycle: ingest, then enrich.
///
/// # Errors
///
/// Returns [`PipelineError`] only if the enrichment pass fails.
#[allow(clippy::future_not_send)]
pub async fn run_cycle(
    config: &Config,
    store: &Arc<dyn WasteStore>,
    multi: &MultiProgress,
) -> Result<PassSummary, PipelineError> {
    let start = Instant::now();

    match ingest(config, store.as_ref()).await {
        Ok(result) => log::info!(
            "Ingestion: {} fetched, {} parsed, {} skipped, {} saved, {} deleted",
            result.records_fetched,
            result.records_parsed,
            result.records_skipped,
            result.records_saved,
            result.records_deleted,
        ),
        Err(e) => log::error!("Ingestion failed, enriching existing records: {e}"),
    }

    let summary = enrich_in_background(config, Arc::clone(store), multi).await?;
    log::info!("Cycle finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(summary)
}

/// Runs a cycle every `interval_hours` until interrupted.
///
/// The first cycle starts immediately. Cycles never overlap: a cycle that
/// overruns the interval delays the next tick instead of stacking one up.
///
/// # Errors
///
/// Returns an error if the interval is invalid or the shutdown signal
/// cannot be installed.
#[allow(clippy::future_not_send)]
pub async fn schedule(
    config: &Config,
    store: &Arc<dyn WasteStore>,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let period = interval_period(config.interval_hours)?;
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "Scheduling a cycle every {} hours (Ctrl-C to stop)",
        config.interval_hours
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(config, store, multi).await {
                    log::error!("Enrichment pass failed: {e}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                log::info!("Shutting down scheduler");
                return Ok(());
            }
        }
    }
}

fn interval_period(hours: u64) -> Result<Duration, ConfigError> {
    hours
        .checked_mul(3600)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: "interval_hours".to_string(),
            value: hours.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;
    use tisza_map_database::MemoryWasteStore;

    use super::*;

    #[test]
    fn interval_is_whole_hours() {
        assert_eq!(interval_period(4).unwrap(), Duration::from_secs(14_400));
        assert!(interval_period(0).is_err());
        assert!(interval_period(u64::MAX).is_err());
    }

    #[test]
    fn missing_river_file_fails_the_pass() {
        let config = Config {
            rivers: "does/not/exist.geojson".into(),
            ..Config::default()
        };
        let store = MemoryWasteStore::new();
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());

        let err = enrich(&config, &store, &multi).unwrap_err();
        assert!(matches!(err, PipelineError::Enrich(_)), "{err}");
    }

    #[test]
    fn unknown_strategy_fails_before_loading_rivers() {
        let config = Config {
            strategy: "quadtree".to_string(),
            ..Config::default()
        };
        let store = MemoryWasteStore::new();
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());

        let err = enrich(&config, &store, &multi).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "{err}");
    }

    #[test]
    fn open_store_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("tisza_map_open_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let config = Config {
            database: dir.join("nested").join("wastes.duckdb"),
            ..Config::default()
        };

        let store = open_store(&config).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(dir.join("nested").is_dir());

        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn background_pass_reports_a_missing_river_file() {
        let config = Config {
            rivers: "does/not/exist.geojson".into(),
            ..Config::default()
        };
        let store: Arc<dyn WasteStore> = Arc::new(MemoryWasteStore::new());
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());

        let err = enrich_in_background(&config, store, &multi).await.unwrap_err();
        assert!(matches!(err, PipelineError::Enrich(_)), "{err}");
    }

    #[tokio::test]
    async fn cycle_survives_an_unconfigured_feed() {
        let dir = std::env::temp_dir().join(format!("tisza_map_cycle_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let rivers = dir.join("rivers.geojson");
        std::fs::write(
            &rivers,
            r#"{"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "properties": {"name": "Tisza"},
                "geometry": {"type": "LineString", "coordinates": [[20.0, 46.0], [20.0, 46.5]]}
            }]}"#,
        )
        .unwrap();

        let config = Config {
            rivers,
            ..Config::default()
        };
        let store: Arc<dyn WasteStore> = Arc::new(MemoryWasteStore::new());
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());

        let summary = run_cycle(&config, &store, &multi).await.unwrap();
        assert_eq!(summary.rivers_loaded, 1);
        assert_eq!(summary.candidates, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
