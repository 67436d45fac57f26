//! Nearest-river lookup under a distance threshold.
//!
//! Distances are Euclidean, in Web Mercator meters, from the projected point
//! to the nearest point on each river's polyline. A river qualifies when its
//! distance is `<=` the threshold. Among qualifying rivers the smallest
//! distance wins and exact ties go to the lexicographically smallest name.

use std::collections::{BTreeMap, BTreeSet};

use geo::{Distance as _, Euclidean, LineString, Point};
use strum_macros::{AsRefStr, Display, EnumString};
use tisza_map_projection::{CoordinateProjector, ProjectedPoint, ProjectionError};
use tisza_map_waste_models::WastePoint;

use crate::{RiverGeometry, index::RTreeIndex};

/// A river within the threshold of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiverMatch<'a> {
    /// Display name of the river.
    pub name: &'a str,
    /// Distance in meters from the query point to the nearest point on the
    /// river line.
    pub distance: f64,
}

/// Source of candidate rivers for a projected point.
///
/// Implementations must report every river line whose distance is
/// `<= threshold`, using [`line_distance`] so that every strategy agrees on
/// the exact same floating point values.
pub trait RiverIndex: Send + Sync {
    /// Returns one entry per river line within `threshold` meters of `point`.
    fn candidates_within(&self, point: ProjectedPoint, threshold: f64) -> Vec<RiverMatch<'_>>;

    /// Number of river lines indexed.
    fn line_count(&self) -> usize;
}

/// How river lines are searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum IndexStrategy {
    /// Measure every line for every point.
    LinearScan,
    /// Prefilter segments with an R-tree.
    #[default]
    RTree,
}

/// Minimum distance from `point` to any segment of `line`, in the line's
/// units.
#[must_use]
pub fn line_distance(point: Point<f64>, line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| Euclidean.distance(&point, &segment))
        .fold(f64::INFINITY, f64::min)
}

/// Baseline strategy: measures every river for every query.
pub struct LinearScan<'a> {
    rivers: &'a [RiverGeometry],
}

impl<'a> LinearScan<'a> {
    #[must_use]
    pub const fn new(rivers: &'a [RiverGeometry]) -> Self {
        Self { rivers }
    }
}

impl RiverIndex for LinearScan<'_> {
    fn candidates_within(&self, point: ProjectedPoint, threshold: f64) -> Vec<RiverMatch<'_>> {
        let point = Point::from(point);

        self.rivers
            .iter()
            .filter_map(|river| {
                let distance = line_distance(point, river.projected());
                (distance <= threshold).then_some(RiverMatch {
                    name: river.name(),
                    distance,
                })
            })
            .collect()
    }

    fn line_count(&self) -> usize {
        self.rivers.len()
    }
}

/// Picks the winner among candidates: smallest distance, then smallest name.
fn closest<'a>(candidates: impl IntoIterator<Item = RiverMatch<'a>>) -> Option<RiverMatch<'a>> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(best)
            if best.distance < candidate.distance
                || (best.distance.total_cmp(&candidate.distance).is_eq()
                    && best.name <= candidate.name) =>
        {
            Some(best)
        }
        _ => Some(candidate),
    })
}

/// Finds the river nearest to waste points, within a threshold.
///
/// Holds a borrowed river list and projector for the duration of one
/// enrichment pass.
pub struct NearestRiverFinder<'a> {
    projector: &'a CoordinateProjector,
    index: Box<dyn RiverIndex + 'a>,
}

impl<'a> NearestRiverFinder<'a> {
    /// Builds a finder over `rivers` using the given search strategy.
    #[must_use]
    pub fn new(
        rivers: &'a [RiverGeometry],
        projector: &'a CoordinateProjector,
        strategy: IndexStrategy,
    ) -> Self {
        let index: Box<dyn RiverIndex + 'a> = match strategy {
            IndexStrategy::LinearScan => Box::new(LinearScan::new(rivers)),
            IndexStrategy::RTree => Box::new(RTreeIndex::new(rivers)),
        };

        Self::with_index(projector, index)
    }

    /// Builds a finder over a custom index.
    #[must_use]
    pub fn with_index(projector: &'a CoordinateProjector, index: Box<dyn RiverIndex + 'a>) -> Self {
        Self { projector, index }
    }

    /// Number of river lines searched.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.index.line_count()
    }

    /// Returns the name of the nearest river within `threshold_meters` of
    /// the waste point, or `None` if no river is that close.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the point's coordinates are out of
    /// range or cannot be projected.
    pub fn find_nearest(
        &self,
        point: &WastePoint,
        threshold_meters: f64,
    ) -> Result<Option<String>, ProjectionError> {
        let projected = self.projector.project(point.longitude, point.latitude)?;
        Ok(self
            .nearest_to(projected, threshold_meters)
            .map(|m| m.name.to_string()))
    }

    /// Returns every distinct river name within `threshold_meters` of the
    /// waste point.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the point's coordinates are out of
    /// range or cannot be projected.
    pub fn find_all_within(
        &self,
        point: &WastePoint,
        threshold_meters: f64,
    ) -> Result<BTreeSet<String>, ProjectionError> {
        let projected = self.projector.project(point.longitude, point.latitude)?;
        Ok(self
            .index
            .candidates_within(projected, threshold_meters)
            .into_iter()
            .map(|m| m.name.to_string())
            .collect())
    }

    /// Nearest river to an already projected point.
    #[must_use]
    pub fn nearest_to(&self, point: ProjectedPoint, threshold_meters: f64) -> Option<RiverMatch<'_>> {
        closest(self.index.candidates_within(point, threshold_meters))
    }

    /// Every river within the threshold of a projected point with its
    /// distance, one entry per name, closest first.
    #[must_use]
    pub fn ranked_within(&self, point: ProjectedPoint, threshold_meters: f64) -> Vec<RiverMatch<'_>> {
        let mut by_name: BTreeMap<&str, f64> = BTreeMap::new();
        for m in self.index.candidates_within(point, threshold_meters) {
            by_name
                .entry(m.name)
                .and_modify(|d| *d = d.min(m.distance))
                .or_insert(m.distance);
        }

        let mut ranked: Vec<RiverMatch<'_>> = by_name
            .into_iter()
            .map(|(name, distance)| RiverMatch { name, distance })
            .collect();
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.name.cmp(b.name)));
        ranked
    }
}

/// One-shot lookup with the linear scan strategy.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the point's coordinates are out of range
/// or cannot be projected.
pub fn find_nearest(
    point: &WastePoint,
    rivers: &[RiverGeometry],
    threshold_meters: f64,
    projector: &CoordinateProjector,
) -> Result<Option<String>, ProjectionError> {
    NearestRiverFinder::new(rivers, projector, IndexStrategy::LinearScan)
        .find_nearest(point, threshold_meters)
}
