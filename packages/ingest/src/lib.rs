#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste report ingestion.
//!
//! Fetches the current trash list from a [`WasteFeed`], prunes reports that
//! have seen no activity within the retention window, and upserts every new
//! or changed report into a [`WasteStore`]. Each sync leaves an
//! [`UpdateLog`](tisza_map_waste_models::UpdateLog) row behind.

pub mod feed;
pub mod parse;
pub mod retry;
pub mod sync;

use chrono::Utc;
use thiserror::Error;
use tisza_map_database::{DbError, WasteStore};
use tisza_map_ingest_models::SyncResult;

pub use feed::{TrashOutFeed, WasteFeed};
pub use parse::parse_waste;
pub use sync::{DEFAULT_RETENTION_YEARS, retention_cutoff, sync};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store operation failed.
    #[error("Database error: {0}")]
    Store(#[from] DbError),

    /// No usable credentials, or the login was rejected.
    #[error("Authentication error: {message}")]
    Auth {
        /// Description of the problem.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Description of the failure.
        message: String,
    },

    /// The feed answered with an unexpected shape.
    #[error("Feed error: {message}")]
    Feed {
        /// Description of the problem.
        message: String,
    },

    /// A single record could not be turned into a waste point.
    #[error("Record {}: {message}", .id.map_or_else(|| "?".to_string(), |id| id.to_string()))]
    Parse {
        /// Record id, when the record had one.
        id: Option<i64>,
        /// What was wrong with the record.
        message: String,
    },
}

/// Fetches `feed` and syncs the result into `store`.
///
/// # Errors
///
/// Returns [`IngestError`] if the fetch fails or any store operation fails.
/// Individual unparseable records are skipped, not errors.
pub async fn ingest(
    feed: &dyn WasteFeed,
    store: &dyn WasteStore,
    retention_years: u32,
) -> Result<SyncResult, IngestError> {
    log::info!("Ingesting from {}...", feed.name());

    let records = feed.fetch().await?;
    log::info!("{}: fetched {} records", feed.name(), records.len());

    sync(store, &records, Utc::now(), retention_years)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tisza_map_database::MemoryWasteStore;

    use super::*;

    struct FixedFeed(Vec<Value>);

    #[async_trait]
    impl WasteFeed for FixedFeed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
            Ok(self.0.clone())
        }
    }

    struct DownFeed;

    #[async_trait]
    impl WasteFeed for DownFeed {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
            Err(IngestError::Status {
                status: 503,
                message: "giving up after 5 retries".to_string(),
            })
        }
    }

    fn fresh_record(id: i64) -> Value {
        let updated = Utc::now().to_rfc3339();
        json!({
            "id": id,
            "gps": {"lat": 46.25, "long": 20.15},
            "types": ["glass"],
            "size": "car",
            "status": "more",
            "created": updated,
            "updateTime": updated
        })
    }

    #[tokio::test]
    async fn ingest_saves_fetched_records() {
        let store = MemoryWasteStore::new();
        let feed = FixedFeed(vec![fresh_record(1), fresh_record(2), json!({"id": 3})]);

        let result = ingest(&feed, &store, DEFAULT_RETENTION_YEARS).await.unwrap();

        assert_eq!(result.records_fetched, 3);
        assert_eq!(result.records_saved, 2);
        assert_eq!(result.records_skipped, 1);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.recent_update_logs(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_the_store_untouched() {
        let store = MemoryWasteStore::new();

        let err = ingest(&DownFeed, &store, DEFAULT_RETENTION_YEARS)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Status { status: 503, .. }));
        assert!(store.recent_update_logs(10).unwrap().is_empty());
    }

    #[test]
    fn parse_error_names_the_record() {
        let err = IngestError::Parse {
            id: Some(42),
            message: "missing size".to_string(),
        };
        assert_eq!(err.to_string(), "Record 42: missing size");
    }
}
