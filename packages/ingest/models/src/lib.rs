#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste feed configuration and sync result types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// TrashOut trash list, restricted to the fields the waste model needs.
pub const DEFAULT_TRASHOUT_URL: &str = "https://api.trashout.ngo/v1/trash/?attributesNeeded=id,gpsFull,types,size,note,status,images,updateTime,created,spam&limit=999999&geoAreaContinent=Europe";

/// Identity toolkit endpoint that exchanges an email/password for a token.
/// The API key is appended.
pub const DEFAULT_LOGIN_URL: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/verifyPassword?key=";

/// Email/password login for the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub email: String,
    pub password: String,
    /// API key appended to the login URL.
    pub api_key: String,
}

/// Configuration for the TrashOut waste feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashOutConfig {
    /// Trash list URL.
    pub url: String,
    /// Login URL prefix; the API key is appended.
    pub login_url: String,
    /// Stored `x-token`. Takes precedence over `login` when set.
    pub token: Option<String>,
    /// Credentials used when no stored token is configured.
    pub login: Option<LoginConfig>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TrashOutConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TRASHOUT_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            token: None,
            login: None,
            timeout_secs: 120,
        }
    }
}

/// Result of one ingestion sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// When the sync ran.
    pub synced_at: DateTime<Utc>,
    /// Raw records returned by the feed.
    pub records_fetched: u64,
    /// Records that parsed into waste points.
    pub records_parsed: u64,
    /// Records that could not be parsed.
    pub records_skipped: u64,
    /// New or changed records written to the store.
    pub records_saved: u64,
    /// Records pruned for inactivity.
    pub records_deleted: u64,
    /// Records in the store afterwards.
    pub total_count: u64,
    /// How long the sync took.
    pub duration: Duration,
}
