//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::observation::AggregationMethod;

/// Source adapter ids this build knows how to construct.
pub const KNOWN_SOURCES: [&str; 3] = ["binance", "coinbase", "coingecko"];

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    pairs = config.pairs.len(),
    sources = config.sources.len(),
    interval_secs = config.oracle.update_interval_secs,
    method = %config.oracle.aggregation_method,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - At least one active pair with a sane price band
/// - At least one enabled, known, uniquely named source
/// - Positive quorum, retry attempts and interval
/// - Finite, non-negative thresholds and weights
fn validate_config(config: &AppConfig) -> Result<()> {
  // Pair validation
  anyhow::ensure!(
    config.pairs.iter().any(|p| p.active),
    "At least one active pair must be configured"
  );

  let mut symbols = HashSet::new();
  for (i, pair) in config.pairs.iter().enumerate() {
    let symbol = pair.to_trading_pair().symbol;
    anyhow::ensure!(
      symbols.insert(symbol.clone()),
      "Pair '{}' is configured more than once",
      symbol
    );
    anyhow::ensure!(
      !pair.base.is_empty() && !pair.quote.is_empty(),
      "Pair {} has an empty base or quote",
      i
    );
    anyhow::ensure!(
      pair.min_price.is_finite() && pair.max_price.is_finite(),
      "Pair {}/{} has a non-finite price band",
      pair.base,
      pair.quote
    );
    anyhow::ensure!(
      pair.min_price >= 0.0 && pair.min_price < pair.max_price,
      "Pair {}/{} needs 0 <= min_price < max_price, got [{}, {}]",
      pair.base,
      pair.quote,
      pair.min_price,
      pair.max_price
    );
    anyhow::ensure!(
      pair.decimal_places <= 18,
      "Pair {}/{} decimal_places must be <= 18, got {}",
      pair.base,
      pair.quote,
      pair.decimal_places
    );
  }

  // Source validation
  anyhow::ensure!(
    config.sources.iter().any(|s| s.enabled),
    "At least one source must be enabled"
  );

  let mut seen = HashSet::new();
  for source in &config.sources {
    anyhow::ensure!(
      KNOWN_SOURCES.contains(&source.id.as_str()),
      "Unknown source id '{}' (expected one of {:?})",
      source.id,
      KNOWN_SOURCES
    );
    anyhow::ensure!(
      seen.insert(source.id.as_str()),
      "Source '{}' is configured more than once",
      source.id
    );
    anyhow::ensure!(
      source.weight.is_finite() && source.weight >= 0.0,
      "Source '{}' weight must be finite and non-negative, got {}",
      source.id,
      source.weight
    );
    anyhow::ensure!(
      source.requests_per_minute > 0,
      "Source '{}' requests_per_minute must be positive",
      source.id
    );
  }

  // Oracle thresholds
  let oracle = &config.oracle;
  anyhow::ensure!(
    oracle.update_interval_secs >= 1,
    "update_interval_secs must be at least 1"
  );
  anyhow::ensure!(
    oracle.min_sources_required >= 1,
    "min_sources_required must be at least 1"
  );
  anyhow::ensure!(
    oracle.retry_attempts >= 1,
    "retry_attempts must be at least 1"
  );
  anyhow::ensure!(
    oracle.deviation_threshold_percent.is_finite() && oracle.deviation_threshold_percent >= 0.0,
    "deviation_threshold_percent must be finite and non-negative, got {}",
    oracle.deviation_threshold_percent
  );
  anyhow::ensure!(
    oracle.outlier_threshold.is_finite() && oracle.outlier_threshold >= 0.0,
    "outlier_threshold must be finite and non-negative, got {}",
    oracle.outlier_threshold
  );

  if oracle.aggregation_method == AggregationMethod::Weighted {
    let total: f64 = config.enabled_sources().map(|s| s.weight).sum();
    anyhow::ensure!(
      total > 0.0,
      "weighted aggregation needs a positive total weight across enabled sources"
    );
  }

  // Ledger validation
  anyhow::ensure!(
    !config.ledger.rpc_url.is_empty(),
    "Ledger RPC URL must not be empty"
  );
  anyhow::ensure!(
    !config.ledger.contract_address.is_empty(),
    "Ledger contract address must not be empty"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use tokio_test::{assert_err, assert_ok};

  use super::*;
  use crate::domain::gate::GateReference;

  const VALID: &str = r#"
    [oracle]
    name = "test-oracle"
    update_interval_secs = 30
    aggregation_method = "weighted"

    [[pairs]]
    base = "BTC"
    quote = "USD"
    min_price = 1000.0
    max_price = 500000.0

    [[pairs]]
    base = "ETH"
    quote = "USD"
    min_price = 10.0
    max_price = 50000.0
    active = false

    [[sources]]
    id = "binance"
    weight = 2.0

    [[sources]]
    id = "coinbase"

    [ledger]
    rpc_url = "http://localhost:8545"
    contract_address = "0x0000000000000000000000000000000000000001"
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_valid_config_with_defaults() {
    let config = parse_config(VALID).unwrap();
    assert_eq!(config.oracle.update_interval_secs, 30);
    assert_eq!(config.oracle.retry_attempts, 3);
    assert_eq!(config.oracle.min_sources_required, 2);
    assert_eq!(config.oracle.outlier_threshold, 2.0);
    assert_eq!(config.oracle.gate_reference, GateReference::LastAggregated);
    assert_eq!(config.health.error_window_secs, 600);
    assert!(config.persistence.journal_enabled);

    let pairs = config.trading_pairs();
    assert_eq!(pairs[0].symbol, "BTC/USD");
    assert!(pairs[0].is_active);
    assert!(!pairs[1].is_active);

    let settings = config.settings();
    assert_eq!(settings.source_weights["binance"], 2.0);
    assert_eq!(settings.source_weights["coinbase"], 1.0);
  }

  #[test]
  fn test_rejects_inverted_price_band() {
    let bad = VALID.replace("min_price = 1000.0", "min_price = 900000.0");
    let err = parse_config(&bad).unwrap_err();
    assert!(err.to_string().contains("min_price < max_price"));
  }

  #[test]
  fn test_rejects_unknown_source() {
    let bad = VALID.replace("id = \"coinbase\"", "id = \"kraken\"");
    assert_err!(parse_config(&bad));
  }

  #[test]
  fn test_rejects_duplicate_source() {
    let bad = VALID.replace("id = \"coinbase\"", "id = \"binance\"");
    let err = parse_config(&bad).unwrap_err();
    assert!(err.to_string().contains("more than once"));
  }

  #[test]
  fn test_rejects_duplicate_pair() {
    let bad = VALID.replace("base = \"ETH\"", "base = \"btc\"");
    let err = parse_config(&bad).unwrap_err();
    assert!(err.to_string().contains("Pair 'BTC/USD' is configured more than once"));
  }

  #[test]
  fn test_rejects_zero_weight_total_for_weighted() {
    let bad = VALID
      .replace("weight = 2.0", "weight = 0.0")
      .replace("id = \"coinbase\"", "id = \"coinbase\"\n    weight = 0.0");
    let err = parse_config(&bad).unwrap_err();
    assert!(err.to_string().contains("positive total weight"));
  }

  #[test]
  fn test_rejects_zero_retry_attempts() {
    let bad = VALID.replace(
      "update_interval_secs = 30",
      "update_interval_secs = 30\n    retry_attempts = 0",
    );
    assert_err!(parse_config(&bad));
  }

  #[test]
  fn test_sample_config_is_valid() {
    let config = assert_ok!(parse_config(include_str!("../../config.toml")));
    assert!(config.oracle.dry_run);
    assert_eq!(config.enabled_sources().count(), 3);
    assert_eq!(config.sources[2].asset_ids["BTC"], "bitcoin");
  }
}
