//! Coinbase Exchange REST Source - Ticker + 24h Stats
//!
//! Price and time come from `/products/{BASE-QUOTE}/ticker`. The 24h
//! change is derived from `/stats` when that second call succeeds; a
//! stats failure never fails the observation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::http::{SourceHealth, SourceHttpClient, parse_decimal};
use crate::config::SourceConfig;
use crate::domain::observation::Observation;
use crate::ports::price_source::{PriceSource, SourceStatus};

/// Public REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Product ticker.
#[derive(Debug, Deserialize)]
struct ProductTicker {
    price: String,
    /// Base-asset volume over 24h.
    volume: Option<String>,
    time: Option<DateTime<Utc>>,
}

/// Product 24h stats.
#[derive(Debug, Deserialize)]
struct ProductStats {
    open: String,
    last: String,
}

/// Coinbase price source.
pub struct CoinbaseSource {
    client: SourceHttpClient,
    health: SourceHealth,
}

impl CoinbaseSource {
    /// Create a source from config.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: SourceHttpClient::from_config(config, DEFAULT_BASE_URL)?,
            health: SourceHealth::new(&config.id),
        })
    }

    /// Coinbase product id (e.g. BTC/USD → "BTC-USD").
    pub fn product_id(base: &str, quote: &str) -> String {
        format!("{}-{}", base.to_uppercase(), quote.to_uppercase())
    }

    async fn request(&self, base: &str, quote: &str) -> Result<Observation> {
        let product = Self::product_id(base, quote);
        let ticker: ProductTicker = self
            .client
            .get_json(&format!("/products/{product}/ticker"), &[])
            .await?;
        let mut observation = parse_ticker(base, quote, &ticker)?;

        match self
            .client
            .get_json::<ProductStats>(&format!("/products/{product}/stats"), &[])
            .await
        {
            Ok(stats) => observation.change_24h = change_percent(&stats),
            Err(e) => debug!(product = %product, error = %e, "Coinbase stats unavailable"),
        }

        Ok(observation)
    }
}

fn parse_ticker(base: &str, quote: &str, ticker: &ProductTicker) -> Result<Observation> {
    let price = parse_decimal("price", &ticker.price)?;
    let timestamp = ticker.time.unwrap_or_else(Utc::now);

    let mut observation = Observation::new(&format!("{base}/{quote}"), "coinbase", price, timestamp);
    // Reported in base units; convert to quote for parity with the other sources.
    observation.volume_24h = ticker
        .volume
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v * price);
    Ok(observation)
}

fn change_percent(stats: &ProductStats) -> Option<f64> {
    let open = stats.open.parse::<f64>().ok()?;
    let last = stats.last.parse::<f64>().ok()?;
    (open != 0.0).then(|| (last - open) / open * 100.0)
}

#[async_trait]
impl PriceSource for CoinbaseSource {
    fn id(&self) -> &str {
        "coinbase"
    }

    async fn fetch_price(&self, base: &str, quote: &str) -> Result<Observation> {
        self.health.track(self.request(base, quote).await).await
    }

    async fn status(&self) -> SourceStatus {
        self.health.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id() {
        assert_eq!(CoinbaseSource::product_id("eth", "usd"), "ETH-USD");
    }

    #[test]
    fn test_parse_ticker() {
        let ticker: ProductTicker = serde_json::from_str(
            r#"{
                "ask": "3501.10",
                "bid": "3500.90",
                "volume": "100.0",
                "trade_id": 123456,
                "price": "3501.00",
                "size": "0.01",
                "time": "2024-06-11T00:00:00.000000Z"
            }"#,
        )
        .unwrap();
        let obs = parse_ticker("ETH", "USD", &ticker).unwrap();
        assert_eq!(obs.price, 3501.0);
        assert_eq!(obs.source_id, "coinbase");
        assert_eq!(obs.volume_24h, Some(350_100.0));
        assert_eq!(obs.timestamp.to_rfc3339(), "2024-06-11T00:00:00+00:00");
    }

    #[test]
    fn test_change_percent() {
        let stats = ProductStats {
            open: "100".to_string(),
            last: "105".to_string(),
        };
        assert_eq!(change_percent(&stats), Some(5.0));

        let zero = ProductStats {
            open: "0".to_string(),
            last: "105".to_string(),
        };
        assert_eq!(change_percent(&zero), None);
    }
}
