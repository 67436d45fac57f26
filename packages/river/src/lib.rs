#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! River geometries and nearest-river lookups.
//!
//! [`loader`] turns a `GeoJSON` feature collection of river lines into a
//! list of [`RiverGeometry`] values, each carrying its Web Mercator
//! projection. [`finder`] then answers "which river is closest to this
//! waste point, within N meters?" using either a linear scan or the R-tree
//! in [`index`].
//!
//! The river list is an explicit value: it is loaded once per enrichment
//! pass and passed by reference into the finder, never cached globally.

pub mod finder;
pub mod index;
pub mod loader;

use geo::{Coord, LineString};
use thiserror::Error;
use tisza_map_projection::{CoordinateProjector, ProjectedPoint, ProjectionError};

pub use finder::{IndexStrategy, NearestRiverFinder, RiverIndex, RiverMatch, find_nearest};
pub use loader::{load_path, load_str};

/// Errors that can occur while loading river data.
#[derive(Debug, Error)]
pub enum RiverError {
    /// The river source could not be read or is not a feature collection.
    #[error("River source {origin} unavailable: {message}")]
    SourceUnavailable {
        /// Path or label of the source.
        origin: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The projector could not be constructed.
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

/// One named river line with its geographic and projected coordinates.
///
/// A river split into several unconnected segments in the source data is
/// represented by several `RiverGeometry` values sharing a name.
#[derive(Debug, Clone, PartialEq)]
pub struct RiverGeometry {
    name: String,
    geographic: LineString<f64>,
    projected: LineString<f64>,
}

impl RiverGeometry {
    /// Builds a river from geographic (degree) coordinates, projecting every
    /// vertex.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if any vertex cannot be projected.
    pub fn new(
        name: impl Into<String>,
        geographic: LineString<f64>,
        projector: &CoordinateProjector,
    ) -> Result<Self, ProjectionError> {
        let projected = projector.project_line_string(&geographic)?;
        Ok(Self {
            name: name.into(),
            geographic,
            projected,
        })
    }

    /// Builds a river from projected (meter) coordinates, deriving the
    /// geographic line through the inverse transform.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if any vertex cannot be inverted.
    pub fn from_projected(
        name: impl Into<String>,
        projected: LineString<f64>,
        projector: &CoordinateProjector,
    ) -> Result<Self, ProjectionError> {
        let geographic = projected
            .0
            .iter()
            .map(|c| {
                projector
                    .inverse(ProjectedPoint::new(c.x, c.y))
                    .map(|(x, y)| Coord { x, y })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.into(),
            geographic: LineString::new(geographic),
            projected,
        })
    }

    /// Display name (uppercased, first comma-separated segment).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The line as loaded, in degrees.
    #[must_use]
    pub const fn geographic(&self) -> &LineString<f64> {
        &self.geographic
    }

    /// The line in Web Mercator meters.
    #[must_use]
    pub const fn projected(&self) -> &LineString<f64> {
        &self.projected
    }
}

/// Derives a display name from a source `name` property.
///
/// Keeps the text before the first comma, trimmed and uppercased
/// (`"Tisza, Hungary"` becomes `"TISZA"`). Returns `None` if nothing is
/// left.
#[must_use]
pub fn display_name(raw: &str) -> Option<String> {
    let head = raw.split(',').next().unwrap_or_default().trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_uppercase())
    }
}
