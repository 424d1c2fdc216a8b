//! CoinGecko REST Source - Aggregated Market Price
//!
//! Reads `/api/v3/simple/price`. CoinGecko is itself an aggregate of
//! exchanges and refreshes more slowly, so its observations carry a
//! lower source confidence.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::http::{SourceHealth, SourceHttpClient};
use crate::config::SourceConfig;
use crate::domain::observation::Observation;
use crate::ports::price_source::{PriceSource, SourceStatus};

/// Public REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

/// Confidence attached to CoinGecko observations.
pub const SOURCE_CONFIDENCE: f64 = 90.0;

/// `{asset_id: {field: value}}`; thinly traded assets report `null`
/// for volume, change or market cap.
type SimplePrice = HashMap<String, HashMap<String, Option<f64>>>;

/// CoinGecko price source.
pub struct CoinGeckoSource {
    client: SourceHttpClient,
    health: SourceHealth,
    asset_ids: BTreeMap<String, String>,
}

impl CoinGeckoSource {
    /// Create a source from config.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: SourceHttpClient::from_config(config, DEFAULT_BASE_URL)?,
            health: SourceHealth::new(&config.id),
            asset_ids: config.asset_ids.clone(),
        })
    }

    /// CoinGecko asset id for a ticker; configured ids win.
    pub fn asset_id(&self, base: &str) -> String {
        let ticker = base.to_uppercase();
        if let Some(id) = self.asset_ids.get(&ticker) {
            return id.clone();
        }
        match ticker.as_str() {
            "BTC" => "bitcoin".to_string(),
            "ETH" => "ethereum".to_string(),
            "SOL" => "solana".to_string(),
            "USDC" => "usd-coin".to_string(),
            "USDT" => "tether".to_string(),
            _ => ticker.to_lowercase(),
        }
    }

    async fn request(&self, base: &str, quote: &str) -> Result<Observation> {
        let id = self.asset_id(base);
        let vs = quote.to_lowercase();
        let body: SimplePrice = self
            .client
            .get_json(
                "/api/v3/simple/price",
                &[
                    ("ids", id.as_str()),
                    ("vs_currencies", vs.as_str()),
                    ("include_market_cap", "true"),
                    ("include_24hr_vol", "true"),
                    ("include_24hr_change", "true"),
                    ("include_last_updated_at", "true"),
                ],
            )
            .await?;
        parse_simple_price(base, quote, &id, &body)
    }
}

fn parse_simple_price(base: &str, quote: &str, id: &str, body: &SimplePrice) -> Result<Observation> {
    let vs = quote.to_lowercase();
    let fields = body
        .get(id)
        .with_context(|| format!("coingecko has no data for {id}"))?;
    let field = |name: &str| fields.get(name).copied().flatten();
    let price = field(&vs).with_context(|| format!("coingecko has no {vs} price for {id}"))?;

    #[allow(clippy::cast_possible_truncation)]
    let timestamp = field("last_updated_at")
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
        .unwrap_or_else(Utc::now);

    let mut observation = Observation::new(&format!("{base}/{quote}"), "coingecko", price, timestamp);
    observation.volume_24h = field(&format!("{vs}_24h_vol"));
    observation.change_24h = field(&format!("{vs}_24h_change"));
    observation.market_cap = field(&format!("{vs}_market_cap"));
    observation.confidence = SOURCE_CONFIDENCE;
    Ok(observation)
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn id(&self) -> &str {
        "coingecko"
    }

    async fn fetch_price(&self, base: &str, quote: &str) -> Result<Observation> {
        self.health.track(self.request(base, quote).await).await
    }

    async fn status(&self) -> SourceStatus {
        self.health.snapshot().await
    }
}
