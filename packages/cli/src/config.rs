//! Runtime configuration.
//!
//! Values come from three layers, later ones winning: the TOML file,
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tisza_map_database::paths;
use tisza_map_enrich::DEFAULT_THRESHOLD_METERS;
use tisza_map_ingest::DEFAULT_RETENTION_YEARS;
use tisza_map_ingest_models::TrashOutConfig;
use tisza_map_river::IndexStrategy;

/// Configuration file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_PATH: &str = "tisza_map.toml";

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Everything the commands need to run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `DuckDB` waste database file.
    pub database: PathBuf,
    /// River `GeoJSON` file.
    pub rivers: PathBuf,
    /// Qualifying distance for a river match, in meters.
    pub threshold_meters: f64,
    /// Nearest-river search strategy (`r-tree` or `linear-scan`).
    pub strategy: String,
    /// Hours between scheduled cycles.
    pub interval_hours: u64,
    /// Reports with no activity for this many years are pruned.
    pub retention_years: u32,
    pub trashout: TrashOutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: paths::waste_db_path(),
            rivers: paths::rivers_path(),
            threshold_meters: DEFAULT_THRESHOLD_METERS,
            strategy: IndexStrategy::default().to_string(),
            interval_hours: 4,
            retention_years: DEFAULT_RETENTION_YEARS,
            trashout: TrashOutConfig::default(),
        }
    }
}

/// Command-line overrides. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub rivers: Option<PathBuf>,
    pub threshold_meters: Option<f64>,
    pub strategy: Option<String>,
    pub interval_hours: Option<u64>,
    pub retention_years: Option<u32>,
}

impl Config {
    /// Loads the file layer, then applies the process environment and
    /// `overrides`.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`]
    /// is read if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// environment variable holds an unparseable value.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&text)
    }

    /// Parses the TOML file layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not
    /// parse.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("TISZA_MAP_DATABASE") {
            self.database = PathBuf::from(value);
        }
        if let Some(value) = lookup("TISZA_MAP_RIVERS") {
            self.rivers = PathBuf::from(value);
        }
        if let Some(value) = env_number(&lookup, "TISZA_MAP_THRESHOLD_METERS")? {
            self.threshold_meters = value;
        }
        if let Some(value) = env_number(&lookup, "TISZA_MAP_INTERVAL_HOURS")? {
            self.interval_hours = value;
        }
        if let Some(value) = env_number(&lookup, "TISZA_MAP_RETENTION_YEARS")? {
            self.retention_years = value;
        }
        if let Some(token) = lookup("TRASHOUT_TOKEN").filter(|t| !t.is_empty()) {
            self.trashout.token = Some(token);
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(database) = &overrides.database {
            self.database.clone_from(database);
        }
        if let Some(rivers) = &overrides.rivers {
            self.rivers.clone_from(rivers);
        }
        if let Some(threshold) = overrides.threshold_meters {
            self.threshold_meters = threshold;
        }
        if let Some(strategy) = &overrides.strategy {
            self.strategy.clone_from(strategy);
        }
        if let Some(hours) = overrides.interval_hours {
            self.interval_hours = hours;
        }
        if let Some(years) = overrides.retention_years {
            self.retention_years = years;
        }
    }

    /// The configured search strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown strategy name.
    pub fn index_strategy(&self) -> Result<IndexStrategy, ConfigError> {
        IndexStrategy::from_str(&self.strategy).map_err(|_| ConfigError::InvalidValue {
            name: "strategy".to_string(),
            value: self.strategy.clone(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.index_strategy()?;

        if !self.threshold_meters.is_finite() || self.threshold_meters < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "threshold_meters".to_string(),
                value: self.threshold_meters.to_string(),
            });
        }
        if self.interval_hours == 0 {
            return Err(ConfigError::InvalidValue {
                name: "interval_hours".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: name.to_string(),
                    value,
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.database, PathBuf::from("data/wastes.duckdb"));
        assert_eq!(config.rivers, PathBuf::from("data/osm_rivers.geojson"));
        assert!((config.threshold_meters - 500.0).abs() < f64::EPSILON);
        assert_eq!(config.interval_hours, 4);
        assert_eq!(config.retention_years, 6);
        assert_eq!(config.index_strategy().unwrap(), IndexStrategy::RTree);
    }

    #[test]
    fn toml_fields_are_optional() {
        let config = Config::from_toml(
            r#"
            threshold_meters = 250.0
            strategy = "linear-scan"

            [trashout]
            token = "from-file"
            "#,
        )
        .unwrap();

        assert!((config.threshold_meters - 250.0).abs() < f64::EPSILON);
        assert_eq!(config.index_strategy().unwrap(), IndexStrategy::LinearScan);
        assert_eq!(config.trashout.token.as_deref(), Some("from-file"));
        assert_eq!(config.interval_hours, 4);
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut config = Config::from_toml("interval_hours = 12").unwrap();
        config
            .apply_env(env(&[
                ("TISZA_MAP_INTERVAL_HOURS", "2"),
                ("TISZA_MAP_RIVERS", "/srv/rivers.geojson"),
                ("TRASHOUT_TOKEN", "from-env"),
            ]))
            .unwrap();

        assert_eq!(config.interval_hours, 2);
        assert_eq!(config.rivers, PathBuf::from("/srv/rivers.geojson"));
        assert_eq!(config.trashout.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn flags_override_the_environment() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TISZA_MAP_THRESHOLD_METERS", "100")]))
            .unwrap();
        config.apply_overrides(&Overrides {
            threshold_meters: Some(50.0),
            ..Overrides::default()
        });

        assert!((config.threshold_meters - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_environment_values_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("TISZA_MAP_RETENTION_YEARS", "six")]))
            .unwrap_err();
        assert!(err.to_string().contains("TISZA_MAP_RETENTION_YEARS"), "{err}");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = Config {
            strategy: "quadtree".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            threshold_meters: -1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            interval_hours: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
