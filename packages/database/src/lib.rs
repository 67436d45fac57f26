#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste report persistence.
//!
//! [`WasteStore`] is the interface the ingestion and enrichment code talk
//! to. [`waste_db::DuckDbWasteStore`] keeps records in a local `DuckDB`
//! file; [`memory::MemoryWasteStore`] keeps them in a map for tests and dry
//! runs.

pub mod memory;
pub mod paths;
pub mod waste_db;

use chrono::{DateTime, Utc};
use tisza_map_waste_models::{UpdateLog, WastePoint};

pub use memory::MemoryWasteStore;
pub use waste_db::DuckDbWasteStore;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be converted back into a model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A previous holder of the store lock panicked.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Storage for waste points and ingestion update logs.
///
/// Every write is applied immediately; there is no pass-level transaction.
pub trait WasteStore: Send + Sync {
    /// Fetches one waste point by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    fn get(&self, id: i64) -> Result<Option<WastePoint>, DbError>;

    /// Inserts or replaces a waste point.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn save(&self, point: &WastePoint) -> Result<(), DbError>;

    /// Inserts or replaces several waste points, returning how many were
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any write fails.
    fn save_all(&self, points: &[WastePoint]) -> Result<u64, DbError>;

    /// Removes a waste point. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Removes several waste points, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    fn delete_many(&self, ids: &[i64]) -> Result<u64, DbError>;

    /// All stored waste points, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn find_all(&self) -> Result<Vec<WastePoint>, DbError>;

    /// Waste points whose river assignment is still unchecked, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn find_unenriched(&self) -> Result<Vec<WastePoint>, DbError>;

    /// Waste points last updated strictly before `cutoff`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<WastePoint>, DbError>;

    /// Number of stored waste points.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn count(&self) -> Result<u64, DbError>;

    /// Appends an ingestion update log and returns it with its id set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    fn record_update_log(&self, log: &UpdateLog) -> Result<UpdateLog, DbError>;

    /// The most recent update logs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn recent_update_logs(&self, limit: usize) -> Result<Vec<UpdateLog>, DbError>;
}
