//! Source HTTP Client - Rate-limited REST Polling
//!
//! Wraps reqwest with a per-source request budget (governor) for the
//! public price APIs. Requests are one-shot: the controller retries
//! the whole fetch stage, so nothing here retries on its own.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::ports::price_source::SourceStatus;

/// Rate-limited JSON GET client for one price source.
pub struct SourceHttpClient {
  /// Underlying HTTP client.
  http: Client,
  /// Base URL without trailing slash.
  base_url: String,
  /// Request budget.
  limiter: DefaultDirectRateLimiter,
  /// Source id, for logs.
  source_id: String,
}

impl SourceHttpClient {
  /// Build a client from source config, falling back to `default_base_url`.
  pub fn from_config(config: &SourceConfig, default_base_url: &str) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_millis(config.timeout_ms))
      .pool_max_idle_per_host(2)
      .user_agent(concat!("price-oracle/", env!("CARGO_PKG_VERSION")))
      .build()
      .context("Failed to build HTTP client")?;

    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    let base_url = config
      .base_url
      .as_deref()
      .unwrap_or(default_base_url)
      .trim_end_matches('/')
      .to_string();

    Ok(Self {
      http,
      base_url,
      limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
      source_id: config.id.clone(),
    })
  }

  /// GET `path` with `query` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
    self.limiter.until_ready().await;

    let url = format!("{}{}", self.base_url, path);
    debug!(source = %self.source_id, url = %url, "GET");

    let response = self
      .http
      .get(&url)
      .query(query)
      .send()
      .await
      .with_context(|| format!("{} request failed", self.source_id))?;

    match response.status() {
      StatusCode::OK => response
        .json::<T>()
        .await
        .with_context(|| format!("{} returned an unparseable body", self.source_id)),
      StatusCode::TOO_MANY_REQUESTS => {
        warn!(source = %self.source_id, "Rate limited by source");
        Err(anyhow::anyhow!("{} rate limited", self.source_id))
      }
      status => {
        let body = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!("{} API error {status}: {body}", self.source_id))
      }
    }
  }
}

/// Availability tracker shared by every source adapter.
pub struct SourceHealth {
  status: RwLock<SourceStatus>,
}

impl SourceHealth {
  /// Start as offline with no history.
  pub fn new(source_id: &str) -> Self {
    Self {
      status: RwLock::new(SourceStatus {
        source_id: source_id.to_string(),
        online: false,
        last_success_at: None,
        error_count: 0,
        last_error: None,
      }),
    }
  }

  /// Record the outcome of one fetch and pass it through.
  pub async fn track<T>(&self, result: Result<T>) -> Result<T> {
    let mut status = self.status.write().await;
    match &result {
      Ok(_) => {
        status.online = true;
        status.last_success_at = Some(Utc::now());
      }
      Err(e) => {
        status.online = false;
        status.error_count += 1;
        status.last_error = Some(format!("{e:#}"));
      }
    }
    result
  }

  /// Current availability.
  pub async fn snapshot(&self) -> SourceStatus {
    self.status.read().await.clone()
  }
}

/// Parse a decimal string field as `f64`.
pub fn parse_decimal(field: &str, value: &str) -> Result<f64> {
  value
    .parse::<f64>()
    .with_context(|| format!("invalid {field}: {value:?}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_health_tracks_outcomes() {
    let health = SourceHealth::new("binance");
    assert!(!health.snapshot().await.online);

    let _ = health.track::<()>(Err(anyhow::anyhow!("timeout"))).await;
    let status = health.snapshot().await;
    assert_eq!(status.error_count, 1);
    assert_eq!(status.last_error.as_deref(), Some("timeout"));

    health.track(Ok(1)).await.unwrap();
    let status = health.snapshot().await;
    assert!(status.online);
    assert!(status.last_success_at.is_some());
    assert_eq!(status.error_count, 1);
  }

  #[test]
  fn test_parse_decimal() {
    assert_eq!(parse_decimal("price", "65000.5").unwrap(), 65000.5);
    assert!(parse_decimal("price", "n/a").is_err());
  }

  #[test]
  fn test_base_url_override_trims_slash() {
    let config = SourceConfig {
      id: "binance".to_string(),
      enabled: true,
      weight: 1.0,
      base_url: Some("http://localhost:8080/".to_string()),
      timeout_ms: 1_000,
      requests_per_minute: 0,
      asset_ids: Default::default(),
    };
    let client = SourceHttpClient::from_config(&config, "https://api.binance.com").unwrap();
    assert_eq!(client.base_url, "http://localhost:8080");
  }
}
