//! `GeoJSON` river loader.
//!
//! Reads a `FeatureCollection` whose features are `LineString` or
//! `MultiLineString` rivers with a `name` property. Every line of every
//! feature becomes its own [`RiverGeometry`]. The source is third-party
//! data, so individual features with missing or broken geometry, missing
//! names, or unprojectable vertices are skipped rather than failing the
//! whole load.

use std::path::Path;

use tisza_map_projection::CoordinateProjector;

use crate::{RiverError, RiverGeometry, display_name};

/// Counters collected while loading a river source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Features present in the collection.
    pub features: usize,
    /// Features skipped for missing geometry, coordinates, or name.
    pub skipped_features: usize,
    /// Lines skipped for having fewer than two vertices or failing to project.
    pub skipped_lines: usize,
    /// Lines loaded.
    pub lines: usize,
}

/// Reads and parses a river `GeoJSON` file.
///
/// # Errors
///
/// Returns [`RiverError::SourceUnavailable`] if the file cannot be read or
/// is not a feature collection.
pub fn load_path(
    path: &Path,
    projector: &CoordinateProjector,
) -> Result<Vec<RiverGeometry>, RiverError> {
    let origin = path.display().to_string();
    let body = std::fs::read_to_string(path).map_err(|e| RiverError::SourceUnavailable {
        origin: origin.clone(),
        message: e.to_string(),
    })?;

    load_labeled(&body, &origin, projector)
}

/// Parses river `GeoJSON` already held in memory.
///
/// # Errors
///
/// Returns [`RiverError::SourceUnavailable`] if the text is not a feature
/// collection.
pub fn load_str(
    body: &str,
    projector: &CoordinateProjector,
) -> Result<Vec<RiverGeometry>, RiverError> {
    load_labeled(body, "<memory>", projector)
}

fn load_labeled(
    body: &str,
    origin: &str,
    projector: &CoordinateProjector,
) -> Result<Vec<RiverGeometry>, RiverError> {
    let (rivers, stats) = parse_collection(body, origin, projector)?;

    log::info!(
        "Loaded {} river lines from {origin} ({} features, {} skipped features, {} skipped lines)",
        stats.lines,
        stats.features,
        stats.skipped_features,
        stats.skipped_lines,
    );

    Ok(rivers)
}

/// Parses a feature collection and returns the rivers with load counters.
///
/// # Errors
///
/// Returns [`RiverError::SourceUnavailable`] if `body` is not JSON or has no
/// `features` array.
pub fn parse_collection(
    body: &str,
    origin: &str,
    projector: &CoordinateProjector,
) -> Result<(Vec<RiverGeometry>, LoadStats), RiverError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RiverError::SourceUnavailable {
            origin: origin.to_string(),
            message: format!("Failed to parse GeoJSON: {e}"),
        })?;

    let features = json["features"]
        .as_array()
        .ok_or_else(|| RiverError::SourceUnavailable {
            origin: origin.to_string(),
            message: "No features array in GeoJSON".to_string(),
        })?;

    let mut stats = LoadStats {
        features: features.len(),
        ..LoadStats::default()
    };
    let mut rivers = Vec::new();

    for (i, feature) in features.iter().enumerate() {
        let Some((name, lines)) = parse_feature(feature) else {
            log::debug!("Skipping river feature #{i}: missing geometry or name");
            stats.skipped_features += 1;
            continue;
        };

        for line in lines {
            if line.0.len() < 2 {
                stats.skipped_lines += 1;
                continue;
            }

            match RiverGeometry::new(name.clone(), line, projector) {
                Ok(river) => {
                    rivers.push(river);
                    stats.lines += 1;
                }
                Err(e) => {
                    log::warn!("Skipping a line of river {name}: {e}");
                    stats.skipped_lines += 1;
                }
            }
        }
    }

    Ok((rivers, stats))
}

/// Extracts the display name and the lines of one feature.
fn parse_feature(feature: &serde_json::Value) -> Option<(String, Vec<geo::LineString<f64>>)> {
    let name = feature
        .get("properties")?
        .get("name")?
        .as_str()
        .and_then(display_name)?;

    let geometry = feature.get("geometry").filter(|g| !g.is_null())?;
    let geometry = geojson::Geometry::from_json_value(geometry.clone()).ok()?;
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;

    let lines = match geo_geom {
        geo::Geometry::LineString(line) => vec![line],
        geo::Geometry::MultiLineString(multi) => multi.0,
        _ => return None,
    };

    Some((name, lines))
}
