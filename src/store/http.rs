//! PostgREST-style HTTP state store.
//!
//! Reads the game row with `GET {base}/rest/v1/{table}?{column}=eq.{id}&select=*`
//! and the `apikey` / bearer headers a hosted backend expects.

use super::StateStore;
use crate::error::FetchError;
use crate::record::GameSnapshot;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP store configuration
#[derive(Clone, Debug, Deserialize)]
pub struct HttpStoreConfig {
    /// Backend base URL (e.g., "https://project.example.co")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Anonymous API key, sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_table() -> String {
    "games".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            table: default_table(),
            id_column: default_id_column(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

pub struct HttpStateStore {
    config: HttpStoreConfig,
    http_client: reqwest::Client,
}

impl HttpStateStore {
    pub fn new(config: HttpStoreConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!(
                    error = %e,
                    request_timeout_ms = config.request_timeout_ms,
                    "Failed to build HTTP client, using defaults without request timeout"
                );
                reqwest::Client::new()
            });

        Self {
            config,
            http_client,
        }
    }

    /// Row URL for `game_id`
    fn record_url(&self, game_id: &str) -> String {
        format!(
            "{}/rest/v1/{}?{}=eq.{}&select=*",
            self.config.base_url.trim_end_matches('/'),
            self.config.table,
            self.config.id_column,
            urlencoding::encode(game_id)
        )
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    async fn fetch_record(&self, game_id: &str) -> Result<GameSnapshot, FetchError> {
        let url = self.record_url(game_id);
        debug!(url = %url, "Fetching game record");

        let mut request = self.http_client.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(FetchError::Network(format!(
                "store returned status {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Network(format!("invalid response body: {}", e)))?;

        match body {
            Value::Array(rows) => rows
                .into_iter()
                .next()
                .map(GameSnapshot::new)
                .ok_or_else(|| FetchError::NotFound(game_id.to_string())),
            other => Err(FetchError::Network(format!(
                "expected a row array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
