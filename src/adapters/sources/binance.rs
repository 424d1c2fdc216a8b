//! Binance REST Source - 24h Ticker Polling
//!
//! Reads `/api/v3/ticker/24hr` for one symbol. Binance has no fiat USD
//! books, so a `USD` quote is served from the `USDT` market.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::http::{SourceHealth, SourceHttpClient, parse_decimal};
use crate::config::SourceConfig;
use crate::domain::observation::Observation;
use crate::ports::price_source::{PriceSource, SourceStatus};

/// Public REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance 24h ticker response (numbers arrive as strings).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: String,
    quote_volume: String,
    /// Window close time (Unix ms).
    close_time: i64,
}

/// Binance price source.
pub struct BinanceSource {
    client: SourceHttpClient,
    health: SourceHealth,
}

impl BinanceSource {
    /// Create a source from config.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: SourceHttpClient::from_config(config, DEFAULT_BASE_URL)?,
            health: SourceHealth::new(&config.id),
        })
    }

    /// Map a pair to a Binance market symbol (e.g. BTC/USD → "BTCUSDT").
    pub fn market_symbol(base: &str, quote: &str) -> String {
        let quote = match quote.to_uppercase().as_str() {
            "USD" => "USDT".to_string(),
            other => other.to_string(),
        };
        format!("{}{}", base.to_uppercase(), quote)
    }

    async fn request(&self, base: &str, quote: &str) -> Result<Observation> {
        let symbol = Self::market_symbol(base, quote);
        let ticker: Ticker24h = self
            .client
            .get_json("/api/v3/ticker/24hr", &[("symbol", symbol.as_str())])
            .await?;
        parse_ticker(base, quote, &ticker)
    }
}

fn parse_ticker(base: &str, quote: &str, ticker: &Ticker24h) -> Result<Observation> {
    let price = parse_decimal("lastPrice", &ticker.last_price)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(ticker.close_time).unwrap_or_else(Utc::now);

    let mut observation = Observation::new(&format!("{base}/{quote}"), "binance", price, timestamp);
    observation.volume_24h = parse_decimal("quoteVolume", &ticker.quote_volume).ok();
    observation.change_24h = parse_decimal("priceChangePercent", &ticker.price_change_percent).ok();
    Ok(observation)
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn id(&self) -> &str {
        "binance"
    }

    async fn fetch_price(&self, base: &str, quote: &str) -> Result<Observation> {
        self.health.track(self.request(base, quote).await).await
    }

    async fn status(&self) -> SourceStatus {
        self.health.snapshot().await
    }
}
