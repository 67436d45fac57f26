//! Waste feeds.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tisza_map_ingest_models::{LoginConfig, TrashOutConfig};

use crate::IngestError;
use crate::retry;

/// A source of raw waste records.
#[async_trait]
pub trait WasteFeed: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Fetches the full current list of raw records.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the feed cannot be reached or its response
    /// is not a list.
    async fn fetch(&self) -> Result<Vec<Value>, IngestError>;
}

/// The TrashOut public trash list.
pub struct TrashOutFeed {
    config: TrashOutConfig,
    client: reqwest::Client,
}

impl TrashOutFeed {
    /// Creates the feed client.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Auth`] if neither a token nor login
    /// credentials are configured, or [`IngestError::Http`] if the HTTP
    /// client cannot be built.
    pub fn new(config: TrashOutConfig) -> Result<Self, IngestError> {
        if config.token.as_deref().is_none_or(str::is_empty) && config.login.is_none() {
            return Err(IngestError::Auth {
                message: "no TrashOut token or login configured".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent("tisza-map/0.1 (river waste monitor)")
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { config, client })
    }

    async fn token(&self) -> Result<String, IngestError> {
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        let login = self.config.login.as_ref().ok_or_else(|| IngestError::Auth {
            message: "no TrashOut login configured".to_string(),
        })?;

        log::info!("Logging in to TrashOut as {}", login.email);
        let url = format!("{}{}", self.config.login_url, login.api_key);
        let body = login_body(login);
        let response = retry::send_json(|| self.client.post(&url).json(&body)).await?;

        id_token(&response)
    }
}

fn login_body(login: &LoginConfig) -> Value {
    json!({
        "email": login.email,
        "password": login.password,
        "returnSecureToken": true,
    })
}

fn id_token(response: &Value) -> Result<String, IngestError> {
    response["idToken"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| IngestError::Auth {
            message: "login response has no idToken".to_string(),
        })
}

fn into_records(body: Value) -> Result<Vec<Value>, IngestError> {
    match body {
        Value::Array(records) => Ok(records),
        other => Err(IngestError::Feed {
            message: format!(
                "expected a JSON array of trash records, got {}",
                match other {
                    Value::Object(_) => "an object",
                    Value::Null => "null",
                    _ => "a scalar",
                }
            ),
        }),
    }
}

#[async_trait]
impl WasteFeed for TrashOutFeed {
    fn name(&self) -> &'static str {
        "TrashOut"
    }

    async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
        let token = self.token().await?;
        log::info!("Fetching trash list from {}", self.config.url);

        let body = retry::send_json(|| {
            self.client
                .get(&self.config.url)
                .header("x-token", &token)
                .header(reqwest::header::ACCEPT, "application/json")
        })
        .await?;

        into_records(body)
    }
}
