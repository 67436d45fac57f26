//! R-tree over projected river segments.
//!
//! Every two-vertex segment of every river line goes into the tree with the
//! index of the line it belongs to. A query collects the segments whose
//! envelope lies near the point, keeps the minimum distance per line, and
//! then applies the same `<=` comparison as [`LinearScan`](crate::finder::LinearScan).

use std::collections::BTreeMap;

use geo::{Distance as _, Euclidean, Line, Point};
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use tisza_map_projection::ProjectedPoint;

use crate::{
    RiverGeometry,
    finder::{RiverIndex, RiverMatch},
};

/// Relative slack added to the query radius so that rounding in the squared
/// distances the tree works with never drops a segment at the boundary.
const RADIUS_SLACK: f64 = 1e-9;

/// One segment of a river line.
struct RiverSegment {
    line: Line<f64>,
    /// Position of the owning line in the river list.
    river: usize,
}

impl RiverSegment {
    fn distance(&self, point: Point<f64>) -> f64 {
        Euclidean.distance(&point, &self.line)
    }
}

impl RTreeObject for RiverSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.line.start.x, self.line.start.y],
            [self.line.end.x, self.line.end.y],
        )
    }
}

impl PointDistance for RiverSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = self.distance(Point::new(point[0], point[1]));
        d * d
    }
}

/// Spatial index strategy backed by an `rstar` R-tree.
pub struct RTreeIndex<'a> {
    rivers: &'a [RiverGeometry],
    tree: RTree<RiverSegment>,
}

impl<'a> RTreeIndex<'a> {
    /// Bulk-loads every segment of every river line.
    #[must_use]
    pub fn new(rivers: &'a [RiverGeometry]) -> Self {
        let segments: Vec<RiverSegment> = rivers
            .iter()
            .enumerate()
            .flat_map(|(river, geometry)| {
                geometry
                    .projected()
                    .lines()
                    .map(move |line| RiverSegment { line, river })
            })
            .collect();

        log::debug!(
            "Indexed {} segments from {} river lines",
            segments.len(),
            rivers.len()
        );

        Self {
            rivers,
            tree: RTree::bulk_load(segments),
        }
    }

    /// Number of segments in the tree.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.tree.size()
    }
}

impl RiverIndex for RTreeIndex<'_> {
    fn candidates_within(&self, point: ProjectedPoint, threshold: f64) -> Vec<RiverMatch<'_>> {
        if threshold.is_nan() || threshold < 0.0 {
            return Vec::new();
        }

        let radius = threshold.mul_add(1.0 + RADIUS_SLACK, RADIUS_SLACK);
        let query = Point::from(point);

        // Segments of the same line are folded in tree order; `min` makes the
        // result independent of that order.
        let mut nearest_per_line: BTreeMap<usize, f64> = BTreeMap::new();
        for segment in self
            .tree
            .locate_within_distance([point.x, point.y], radius * radius)
        {
            let d = segment.distance(query);
            nearest_per_line
                .entry(segment.river)
                .and_modify(|best| *best = best.min(d))
                .or_insert(d);
        }

        nearest_per_line
            .into_iter()
            .filter(|(_, distance)| *distance <= threshold)
            .map(|(river, distance)| RiverMatch {
                name: self.rivers[river].name(),
                distance,
            })
            .collect()
    }

    fn line_count(&self) -> usize {
        self.rivers.len()
    }
}

#[cfg(test)]
mod tests {
    use geo::LineString;
    use tisza_map_projection::CoordinateProjector;

    use super::*;
    use crate::finder::{LinearScan, line_distance};

    fn rivers(projector: &CoordinateProjector) -> Vec<RiverGeometry> {
        vec![
            RiverGeometry::from_projected(
                "TISZA",
                LineString::from(vec![(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0)]),
                projector,
            )
            .unwrap(),
            RiverGeometry::from_projected(
                "MAROS",
                LineString::from(vec![(5000.0, 5000.0), (6000.0, 5000.0)]),
                projector,
            )
            .unwrap(),
        ]
    }

    #[test]
    fn indexes_every_segment() {
        let projector = CoordinateProjector::new().unwrap();
        let rivers = rivers(&projector);
        let index = RTreeIndex::new(&rivers);
        assert_eq!(index.segment_count(), 3);
        assert_eq!(index.line_count(), 2);
    }

    #[test]
    fn reports_minimum_distance_per_line() {
        let projector = CoordinateProjector::new().unwrap();
        let rivers = rivers(&projector);
        let index = RTreeIndex::new(&rivers);

        let hits = index.candidates_within(ProjectedPoint::new(900.0, 100.0), 200.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "TISZA");
        assert!((hits[0].distance - 100.0).abs() < 1e-9);
        assert_eq!(
            hits[0].distance,
            line_distance(Point::new(900.0, 100.0), rivers[0].projected())
        );
    }

    #[test]
    fn distances_match_linear_scan_exactly() {
        let projector = CoordinateProjector::new().unwrap();
        let rivers = rivers(&projector);
        let tree = RTreeIndex::new(&rivers);
        let scan = LinearScan::new(&rivers);

        for p in [
            ProjectedPoint::new(1000.0, 1500.0),
            ProjectedPoint::new(3000.0, 3000.0),
            ProjectedPoint::new(5500.0, 4999.0),
            ProjectedPoint::new(-0.5, 0.0),
        ] {
            assert_eq!(
                tree.candidates_within(p, 3000.0),
                scan.candidates_within(p, 3000.0),
                "{p:?}"
            );
        }
    }

    #[test]
    fn negative_or_nan_threshold_matches_nothing() {
        let projector = CoordinateProjector::new().unwrap();
        let rivers = rivers(&projector);
        let index = RTreeIndex::new(&rivers);
        let on_river = ProjectedPoint::new(500.0, 0.0);

        assert!(index.candidates_within(on_river, -1.0).is_empty());
        assert!(index.candidates_within(on_river, f64::NAN).is_empty());
        assert_eq!(index.candidates_within(on_river, 0.0).len(), 1);
    }
}
