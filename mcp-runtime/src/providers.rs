//! External HTTP providers: Tavily search and Yahoo Finance quotes.
//!
//! The traits are the seams the tool layer talks through; tests substitute
//! in-memory stubs, the binaries wire up the real HTTP implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

const HTTP_TIMEOUT_SECS: u64 = 8;
const STATUS_DETAIL_MAX_CHARS: usize = 200;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const YAHOO_CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection_error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider_status: {provider} returned HTTP {status}: {detail}")]
    Status {
        provider: &'static str,
        status: u16,
        detail: String,
    },
    #[error("decode_error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns the provider's decoded response body as-is. Interpreting its
    /// shape, including a missing `results` field, is the mediator's job.
    async fn search(&self, query: &str, api_key: &str) -> Result<Value, ProviderError>;
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest trading day's close prices for `symbol`, oldest first. An empty
    /// vector means the provider had no data, which is not an error here.
    async fn latest_closes(&self, symbol: &str) -> Result<Vec<f64>, ProviderError>;
}

/// Shared outbound client. All provider calls carry the same bounded timeout;
/// a timeout surfaces as `ProviderError::Http` like any other failure.
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub struct TavilySearchProvider {
    http: reqwest::Client,
}

impl TavilySearchProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, query: &str, api_key: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(TAVILY_SEARCH_URL)
            .json(&json!({ "api_key": api_key, "query": query }))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "tavily",
                status: status.as_u16(),
                detail: status_detail(&bytes),
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decode(format!("invalid JSON from tavily: {e}")))
    }
}

pub struct YahooChartProvider {
    http: reqwest::Client,
}

impl YahooChartProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl QuoteProvider for YahooChartProvider {
    async fn latest_closes(&self, symbol: &str) -> Result<Vec<f64>, ProviderError> {
        let response = self
            .http
            .get(format!("{YAHOO_CHART_BASE_URL}/{symbol}"))
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "yahoo-finance",
                status: status.as_u16(),
                detail: status_detail(&bytes),
            });
        }

        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decode(format!("invalid JSON from yahoo-finance: {e}")))?;

        // Nulls appear in the close series for halted intervals; skip them.
        let closes = body
            .pointer("/chart/result/0/indicators/quote/0/close")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        Ok(closes)
    }
}

fn status_detail(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() <= STATUS_DETAIL_MAX_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(STATUS_DETAIL_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_detail_bounds_long_bodies() {
        let body = "x".repeat(1000);
        assert_eq!(status_detail(body.as_bytes()).len(), STATUS_DETAIL_MAX_CHARS);
    }

    #[test]
    fn status_detail_trims_short_bodies() {
        assert_eq!(status_detail(b"  rate limited \n"), "rate limited");
    }

    #[test]
    fn provider_error_display_carries_kind_and_detail() {
        let err = ProviderError::Status {
            provider: "tavily",
            status: 401,
            detail: "unauthorized".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("provider_status"));
        assert!(rendered.contains("401"));
        assert!(rendered.contains("unauthorized"));
    }
}
