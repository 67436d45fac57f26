#![allow(clippy::module_name_repetitions)]
//! Default file locations.
//!
//! All paths are relative to the working directory's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Returns the default path of the waste `DuckDB` file.
#[must_use]
pub fn waste_db_path() -> PathBuf {
    data_dir().join("wastes.duckdb")
}

/// Returns the default path of the river `GeoJSON` file.
#[must_use]
pub fn rivers_path() -> PathBuf {
    data_dir().join("osm_rivers.geojson")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data() {
        assert_eq!(waste_db_path(), Path::new("data/wastes.duckdb"));
        assert_eq!(rivers_path(), Path::new("data/osm_rivers.geojson"));
    }

    #[test]
    fn ensure_dir_accepts_empty_parent() {
        ensure_dir(Path::new("")).unwrap();
    }
}
