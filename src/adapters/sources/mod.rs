//! Price Source Adapters - REST Polling of Public Price APIs
//!
//! One adapter per external API, all behind the `PriceSource` port:
//! - Binance: 24h ticker (USD served from USDT markets)
//! - Coinbase: product ticker plus 24h stats
//! - CoinGecko: simple price, lower source confidence

pub mod binance;
pub mod coinbase;
pub mod coingecko;
pub mod http;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;
pub use coingecko::CoinGeckoSource;

use crate::config::SourceConfig;
use crate::ports::price_source::PriceSource;

/// Build adapters for every enabled source.
///
/// # Errors
/// Returns error for an unknown source id or when an HTTP client
/// cannot be constructed.
pub fn build_sources(configs: &[SourceConfig]) -> Result<Vec<Arc<dyn PriceSource>>> {
    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    for config in configs.iter().filter(|c| c.enabled) {
        let source: Arc<dyn PriceSource> = match config.id.as_str() {
            "binance" => Arc::new(BinanceSource::new(config)?),
            "coinbase" => Arc::new(CoinbaseSource::new(config)?),
            "coingecko" => Arc::new(CoinGeckoSource::new(config)?),
            other => anyhow::bail!("unknown price source '{other}'"),
        };
        info!(source = %config.id, weight = config.weight, "Price source enabled");
        sources.push(source);
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, enabled: bool) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            enabled,
            weight: 1.0,
            base_url: None,
            timeout_ms: 1_000,
            requests_per_minute: 60,
            asset_ids: Default::default(),
        }
    }

    #[test]
    fn test_builds_enabled_sources_only() {
        let sources = build_sources(&[
            config("binance", true),
            config("coinbase", false),
            config("coingecko", true),
        ])
        .unwrap();
        let ids: Vec<_> = sources.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["binance", "coingecko"]);
    }

    #[test]
    fn test_unknown_source_fails() {
        assert!(build_sources(&[config("kraken", true)]).is_err());
    }
}
