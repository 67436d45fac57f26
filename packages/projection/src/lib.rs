#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reprojection between geographic longitude/latitude (degrees) and the
//! Web Mercator plane (meters).
//!
//! Nearest-river lookups measure Euclidean distance, which only makes sense
//! on a planar metric projection. [`CoordinateProjector`] builds both PROJ.4
//! definitions once and is then reused for every vertex and waste point in
//! an enrichment pass.

use geo::{Coord, LineString, MapCoords as _};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use thiserror::Error;

/// Geographic source definition. Web Mercator interprets WGS84 degrees on a
/// sphere, so both sides use the same sphere and no datum shift is applied.
const GEOGRAPHIC_PROJ4: &str = "+proj=longlat +a=6378137 +b=6378137 +no_defs";

/// Spherical Web Mercator (EPSG:3857).
const WEB_MERCATOR_PROJ4: &str =
    "+proj=merc +a=6378137 +b=6378137 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

/// Errors that can occur while projecting coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Longitude or latitude is outside the valid geographic range.
    #[error("Invalid coordinates: longitude {longitude}, latitude {latitude}")]
    InvalidCoordinate {
        /// Offending longitude in degrees.
        longitude: f64,
        /// Offending latitude in degrees.
        latitude: f64,
    },

    /// The input is in range but the projection is undefined there
    /// (Web Mercator diverges at the poles).
    #[error("Projection of ({x}, {y}) failed: {message}")]
    Transform {
        /// Input x (longitude or easting).
        x: f64,
        /// Input y (latitude or northing).
        y: f64,
        /// Description of what went wrong.
        message: String,
    },

    /// A PROJ.4 definition could not be parsed.
    #[error("Failed to build projection from {definition:?}: {message}")]
    Definition {
        /// The PROJ.4 string.
        definition: String,
        /// Parser error.
        message: String,
    },
}

/// A point on the Web Mercator plane, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// Easting in meters.
    pub x: f64,
    /// Northing in meters.
    pub y: f64,
}

impl ProjectedPoint {
    /// Creates a point from easting and northing in meters.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<ProjectedPoint> for geo::Point<f64> {
    fn from(p: ProjectedPoint) -> Self {
        Self::new(p.x, p.y)
    }
}

impl From<ProjectedPoint> for Coord<f64> {
    fn from(p: ProjectedPoint) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// Checks that a longitude/latitude pair lies within geographic bounds.
///
/// # Errors
///
/// Returns [`ProjectionError::InvalidCoordinate`] if either value is out of
/// range or not a number.
pub fn validate(longitude: f64, latitude: f64) -> Result<(), ProjectionError> {
    if (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude) {
        Ok(())
    } else {
        Err(ProjectionError::InvalidCoordinate {
            longitude,
            latitude,
        })
    }
}

/// Geographic (degrees) to Web Mercator (meters) transform.
///
/// Construction parses both PROJ.4 definitions; projecting is then a pure
/// function of its input.
pub struct CoordinateProjector {
    geographic: Proj4,
    mercator: Proj4,
}

impl CoordinateProjector {
    /// Builds the geographic and Web Mercator definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Definition`] if a PROJ.4 string is rejected.
    pub fn new() -> Result<Self, ProjectionError> {
        Ok(Self {
            geographic: build(GEOGRAPHIC_PROJ4)?,
            mercator: build(WEB_MERCATOR_PROJ4)?,
        })
    }

    /// Projects a longitude/latitude pair to Web Mercator meters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidCoordinate`] for out-of-range input
    /// and [`ProjectionError::Transform`] at the poles.
    #[allow(clippy::float_cmp)]
    pub fn project(&self, longitude: f64, latitude: f64) -> Result<ProjectedPoint, ProjectionError> {
        validate(longitude, latitude)?;

        if latitude.abs() == 90.0 {
            return Err(ProjectionError::Transform {
                x: longitude,
                y: latitude,
                message: "Web Mercator is undefined at the poles".to_string(),
            });
        }

        let mut point = (longitude.to_radians(), latitude.to_radians(), 0.0);
        transform(&self.geographic, &self.mercator, &mut point).map_err(|e| {
            ProjectionError::Transform {
                x: longitude,
                y: latitude,
                message: e.to_string(),
            }
        })?;

        finite(longitude, latitude, point.0, point.1)?;
        Ok(ProjectedPoint::new(point.0, point.1))
    }

    /// Converts a Web Mercator point back to `(longitude, latitude)` degrees.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transform`] if the point is not finite or
    /// the inverse transform fails.
    pub fn inverse(&self, point: ProjectedPoint) -> Result<(f64, f64), ProjectionError> {
        finite(point.x, point.y, point.x, point.y)?;

        let mut p = (point.x, point.y, 0.0);
        transform(&self.mercator, &self.geographic, &mut p).map_err(|e| {
            ProjectionError::Transform {
                x: point.x,
                y: point.y,
                message: e.to_string(),
            }
        })?;

        let (longitude, latitude) = (p.0.to_degrees(), p.1.to_degrees());
        finite(point.x, point.y, longitude, latitude)?;
        Ok((longitude, latitude))
    }

    /// Projects every vertex of a geographic line.
    ///
    /// # Errors
    ///
    /// Fails on the first vertex that [`Self::project`] rejects.
    pub fn project_line_string(
        &self,
        line: &LineString<f64>,
    ) -> Result<LineString<f64>, ProjectionError> {
        line.try_map_coords(|c: Coord<f64>| self.project(c.x, c.y).map(Coord::from))
    }
}

fn build(definition: &str) -> Result<Proj4, ProjectionError> {
    Proj4::from_proj_string(definition).map_err(|e| ProjectionError::Definition {
        definition: definition.to_string(),
        message: e.to_string(),
    })
}

fn finite(x: f64, y: f64, out_x: f64, out_y: f64) -> Result<(), ProjectionError> {
    if out_x.is_finite() && out_y.is_finite() {
        Ok(())
    } else {
        Err(ProjectionError::Transform {
            x,
            y,
            message: format!("non-finite result ({out_x}, {out_y})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Half the circumference of the Web Mercator sphere.
    const HALF_WORLD: f64 = 20_037_508.342_789_244;

    #[test]
    fn projects_origin_to_origin() {
        let projector = CoordinateProjector::new().unwrap();
        let p = projector.project(0.0, 0.0).unwrap();
        assert!(p.x.abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn matches_known_web_mercator_values() {
        let projector = CoordinateProjector::new().unwrap();

        let east = projector.project(180.0, 0.0).unwrap();
        assert!((east.x.abs() - HALF_WORLD).abs() < 1e-3, "x = {}", east.x);

        let p = projector.project(20.0, 47.0).unwrap();
        assert!((p.x - 2_226_389.815_865_471).abs() < 1e-3, "x = {}", p.x);
        assert!((p.y - 5_942_074.072_431_108).abs() < 1e-3, "y = {}", p.y);
    }

    #[test]
    fn round_trips_a_grid_of_coordinates() {
        let projector = CoordinateProjector::new().unwrap();

        for lon in (-170..=170).step_by(17) {
            for lat in (-85..=85).step_by(5) {
                let (lon, lat) = (f64::from(lon) + 0.123_456, f64::from(lat) + 0.654_321);
                let p = projector.project(lon, lat).unwrap();
                let (back_lon, back_lat) = projector.inverse(p).unwrap();
                assert!((back_lon - lon).abs() < 1e-6, "lon {lon} -> {back_lon}");
                assert!((back_lat - lat).abs() < 1e-6, "lat {lat} -> {back_lat}");
            }
        }
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        let projector = CoordinateProjector::new().unwrap();
        assert_eq!(
            projector.project(200.0, 45.0),
            Err(ProjectionError::InvalidCoordinate {
                longitude: 200.0,
                latitude: 45.0,
            })
        );
    }

    #[test]
    fn rejects_out_of_range_latitude_and_nan() {
        let projector = CoordinateProjector::new().unwrap();
        assert!(matches!(
            projector.project(19.0, -91.0),
            Err(ProjectionError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            projector.project(f64::NAN, 10.0),
            Err(ProjectionError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn poles_are_degenerate() {
        let projector = CoordinateProjector::new().unwrap();
        assert!(matches!(
            projector.project(10.0, 90.0),
            Err(ProjectionError::Transform { .. })
        ));
        assert!(matches!(
            projector.project(10.0, -90.0),
            Err(ProjectionError::Transform { .. })
        ));
    }

    #[test]
    fn projection_is_deterministic() {
        let projector = CoordinateProjector::new().unwrap();
        let a = projector.project(20.123, 46.253).unwrap();
        let b = projector.project(20.123, 46.253).unwrap();
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());

        let other = CoordinateProjector::new().unwrap();
        let c = other.project(20.123, 46.253).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn projects_line_strings_vertex_by_vertex() {
        let projector = CoordinateProjector::new().unwrap();
        let line = LineString::from(vec![(20.0, 46.0), (20.1, 46.1), (20.2, 46.3)]);
        let projected = projector.project_line_string(&line).unwrap();

        assert_eq!(projected.0.len(), 3);
        for (geo, merc) in line.0.iter().zip(projected.0.iter()) {
            let expected = projector.project(geo.x, geo.y).unwrap();
            assert_eq!(merc.x, expected.x);
            assert_eq!(merc.y, expected.y);
        }
    }

    #[test]
    fn line_string_with_invalid_vertex_fails() {
        let projector = CoordinateProjector::new().unwrap();
        let line = LineString::from(vec![(20.0, 46.0), (200.0, 46.1)]);
        assert!(projector.project_line_string(&line).is_err());
    }
}
