#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! River enrichment pass.
//!
//! One pass loads the full river set, then walks every waste point whose
//! river assignment is still unchecked and stores the nearest river within
//! the threshold (or an explicit "no match"). Each point is saved as soon
//! as it is resolved, so an interrupted pass keeps the work it finished and
//! the next pass picks up the rest.
//!
//! Callers must not run two passes against the same store at once.

pub mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tisza_map_database::{DbError, WasteStore};
use tisza_map_projection::{CoordinateProjector, ProjectionError};
use tisza_map_river::{IndexStrategy, NearestRiverFinder, RiverError, RiverGeometry};
use tisza_map_waste_models::RiverAssignment;

use crate::progress::{ProgressCallback, null_progress};

/// Default qualifying distance, in meters.
pub const DEFAULT_THRESHOLD_METERS: f64 = 500.0;

/// Errors that abort an enrichment pass.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The river source could not be loaded.
    #[error(transparent)]
    River(#[from] RiverError),

    /// The waste store could not be queried.
    #[error("Waste store error: {0}")]
    Store(#[from] DbError),

    /// The projector could not be built.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// The threshold is negative or not a number.
    #[error("Invalid threshold: {0} meters")]
    InvalidThreshold(f64),
}

/// Where a pass reads river geometry from.
#[derive(Debug, Clone)]
pub enum RiverSource {
    /// A `GeoJSON` file on disk.
    File(PathBuf),
    /// `GeoJSON` text already in memory.
    Inline(String),
}

impl RiverSource {
    /// Loads and projects every river line in the source.
    ///
    /// # Errors
    ///
    /// Returns [`RiverError::SourceUnavailable`] if the source cannot be
    /// read or parsed at all.
    pub fn load(&self, projector: &CoordinateProjector) -> Result<Vec<RiverGeometry>, RiverError> {
        match self {
            Self::File(path) => tisza_map_river::load_path(path, projector),
            Self::Inline(body) => tisza_map_river::load_str(body, projector),
        }
    }
}

impl From<&Path> for RiverSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// River lines searched.
    pub rivers_loaded: u64,
    /// Unchecked points found at the start of the pass.
    pub candidates: u64,
    /// Points assigned a river.
    pub matched: u64,
    /// Points checked with no river in range.
    pub no_match: u64,
    /// Points skipped for coordinates that cannot be projected.
    pub invalid: u64,
    /// Points resolved but not saved.
    pub save_failed: u64,
}

impl PassSummary {
    /// Points whose assignment was persisted.
    #[must_use]
    pub const fn enriched(&self) -> u64 {
        self.matched + self.no_match
    }
}

/// Configuration of an enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentPass {
    /// Qualifying distance in meters; a river exactly this far away matches.
    pub threshold_meters: f64,
    /// How candidate rivers are searched.
    pub strategy: IndexStrategy,
}

impl Default for EnrichmentPass {
    fn default() -> Self {
        Self {
            threshold_meters: DEFAULT_THRESHOLD_METERS,
            strategy: IndexStrategy::default(),
        }
    }
}

impl EnrichmentPass {
    /// Creates a pass with the given threshold and search strategy.
    #[must_use]
    pub const fn new(threshold_meters: f64, strategy: IndexStrategy) -> Self {
        Self {
            threshold_meters,
            strategy,
        }
    }

    /// Loads rivers from `source` and enriches every unchecked waste point.
    ///
    /// A source that cannot be loaded aborts the pass before any point is
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the threshold is invalid, the river source
    /// is unavailable, or the unchecked points cannot be listed. Per-point
    /// failures are counted in the summary instead.
    pub fn run(
        &self,
        store: &dyn WasteStore,
        source: &RiverSource,
        progress: Option<Arc<dyn ProgressCallback>>,
    ) -> Result<PassSummary, EnrichError> {
        self.check_threshold()?;

        let progress = progress.unwrap_or_else(null_progress);
        let projector = CoordinateProjector::new()?;
        let rivers = source.load(&projector).map_err(|e| {
            log::error!("Enrichment pass aborted: {e}");
            progress.finish_and_clear();
            e
        })?;

        self.run_with_rivers(store, &rivers, &projector, Some(progress))
    }

    /// Enriches every unchecked waste point against an already loaded river
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the threshold is invalid or the unchecked
    /// points cannot be listed.
    pub fn run_with_rivers(
        &self,
        store: &dyn WasteStore,
        rivers: &[RiverGeometry],
        projector: &CoordinateProjector,
        progress: Option<Arc<dyn ProgressCallback>>,
    ) -> Result<PassSummary, EnrichError> {
        self.check_threshold()?;

        let start = Instant::now();
        let progress = progress.unwrap_or_else(null_progress);
        let finder = NearestRiverFinder::new(rivers, projector, self.strategy);

        let candidates = store.find_unenriched()?;
        let mut summary = PassSummary {
            rivers_loaded: finder.line_count() as u64,
            candidates: candidates.len() as u64,
            ..PassSummary::default()
        };

        log::info!(
            "Enrichment pass starting: {} unchecked points, {} river lines, threshold {} m ({})",
            summary.candidates,
            summary.rivers_loaded,
            self.threshold_meters,
            self.strategy,
        );

        progress.set_total(summary.candidates);
        progress.set_message("Enriching".to_string());

        for mut point in candidates {
            match finder.find_nearest(&point, self.threshold_meters) {
                Ok(nearest) => {
                    point.river = RiverAssignment::from_lookup(nearest);
                    match store.save(&point) {
                        Ok(()) if point.river == RiverAssignment::NoMatch => summary.no_match += 1,
                        Ok(()) => summary.matched += 1,
                        Err(e) => {
                            log::warn!("Failed to save river for waste {}: {e}", point.id);
                            summary.save_failed += 1;
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Skipping waste {}: {e}", point.id);
                    summary.invalid += 1;
                }
            }
            progress.inc(1);
        }

        progress.finish(format!(
            "Enriched {} points ({} matched)",
            summary.enriched(),
            summary.matched
        ));

        log::info!(
            "Enrichment pass finished in {:.2}s: {} checked, {} matched, {} no match, \
             {} invalid coordinates, {} save failures",
            start.elapsed().as_secs_f64(),
            summary.candidates,
            summary.matched,
            summary.no_match,
            summary.invalid,
            summary.save_failed,
        );

        Ok(summary)
    }

    fn check_threshold(&self) -> Result<(), EnrichError> {
        if self.threshold_meters.is_finite() && self.threshold_meters >= 0.0 {
            Ok(())
        } else {
            Err(EnrichError::InvalidThreshold(self.threshold_meters))
        }
    }
}
