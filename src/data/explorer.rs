//! Explorer REST API client
//!
//! Fetches daily statistic series and chain statistics from the explorer API.
//! The API speaks JSON:API (`{"data": {"attributes": {...}}}`) and encodes most
//! numbers as strings, so parsing goes through `serde_json::Value`.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::{DailyStatistic, EpochInfo, Statistics};

/// Default base URL of the mainnet explorer API
pub const DEFAULT_API_URL: &str = "https://mainnet-api.explorer.nervos.org/api/v1";

const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Errors that can occur when fetching explorer data
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API answered with a non-success status
    #[error("API returned status {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),
}

/// Client for the explorer API
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    base_url: String,
}

impl Default for ExplorerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerClient {
    /// Create a client pointed at the mainnet API
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Create a client with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Point the client at another API deployment (e.g. testnet)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a daily statistic series
    ///
    /// # Arguments
    /// * `indicator` - API name of the statistic (e.g. `transactions_count`)
    ///
    /// # Returns
    /// * `Ok(Vec<DailyStatistic>)` - One entry per day, in API order
    /// * `Err(ExplorerError)` - If the request or parsing fails
    pub async fn fetch_daily_statistic(
        &self,
        indicator: &str,
    ) -> Result<Vec<DailyStatistic>, ExplorerError> {
        let body = self.get(&format!("daily_statistics/{}", indicator)).await?;
        parse_daily_statistics(&body, indicator)
    }

    /// Fetch current chain statistics
    pub async fn fetch_statistics(&self) -> Result<Statistics, ExplorerError> {
        let body = self.get("statistics").await?;
        parse_statistics(&body)
    }

    async fn get(&self, path: &str) -> Result<String, ExplorerError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(url = %url, "fetching explorer data");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, JSON_API_MEDIA_TYPE)
            .header(CONTENT_TYPE, JSON_API_MEDIA_TYPE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Parse a `daily_statistics/<indicator>` response body
pub(crate) fn parse_daily_statistics(
    body: &str,
    indicator: &str,
) -> Result<Vec<DailyStatistic>, ExplorerError> {
    let root: Value = serde_json::from_str(body)?;
    let data = root
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ExplorerError::MissingField("data".to_string()))?;

    let mut series = Vec::with_capacity(data.len());
    for wrapper in data {
        let attributes = wrapper
            .get("attributes")
            .ok_or_else(|| ExplorerError::MissingField("attributes".to_string()))?;

        let created_at_unixtimestamp = attributes
            .get("created_at_unixtimestamp")
            .and_then(as_i64)
            .ok_or_else(|| ExplorerError::MissingField("created_at_unixtimestamp".to_string()))?;

        let value = attributes
            .get(indicator)
            .and_then(as_decimal_string)
            .ok_or_else(|| ExplorerError::MissingField(indicator.to_string()))?;

        series.push(DailyStatistic {
            created_at_unixtimestamp,
            value,
        });
    }

    Ok(series)
}

/// Parse a `statistics` response body
pub(crate) fn parse_statistics(body: &str) -> Result<Statistics, ExplorerError> {
    let root: Value = serde_json::from_str(body)?;
    let attributes = root
        .get("data")
        .and_then(|data| data.get("attributes"))
        .ok_or_else(|| ExplorerError::MissingField("data.attributes".to_string()))?;

    let epoch = attributes
        .get("epoch_info")
        .ok_or_else(|| ExplorerError::MissingField("epoch_info".to_string()))?;

    let field = |name: &str| {
        epoch
            .get(name)
            .and_then(as_u64)
            .ok_or_else(|| ExplorerError::MissingField(format!("epoch_info.{}", name)))
    };

    let epoch_info = EpochInfo {
        epoch_number: field("epoch_number")?,
        epoch_length: field("epoch_length")?,
        index: field("index")?,
    };

    let estimated_epoch_time_ms = attributes
        .get("estimated_epoch_time")
        .and_then(as_f64)
        .ok_or_else(|| ExplorerError::MissingField("estimated_epoch_time".to_string()))?;

    Ok(Statistics {
        epoch_info,
        estimated_epoch_time_ms,
    })
}

/// Reads a finite number the API may send either as JSON number or numeric string
fn as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
