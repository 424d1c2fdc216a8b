//! Configuration Module - TOML-based Oracle Configuration
//!
//! Loads and validates configuration from `config.toml`. The ledger
//! signing key comes from the environment (`ORACLE_PRIVATE_KEY`),
//! never from the file. Nothing in the domain layer is hardcoded:
//! pairs, sources, thresholds and endpoints all live here.

pub mod loader;

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::domain::gate::GateReference;
use crate::domain::observation::{AggregationMethod, TradingPair};

/// Top-level oracle configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the oracle starts its first cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Cycle thresholds and scheduling.
  pub oracle: OracleConfig,
  /// Tracked asset pairs.
  pub pairs: Vec<PairConfig>,
  /// External price sources.
  pub sources: Vec<SourceConfig>,
  /// Ledger endpoint and contract.
  pub ledger: LedgerConfig,
  /// Health rule tuning.
  #[serde(default)]
  pub health: HealthConfig,
  /// Metrics and status server.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Oracle cycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
  /// Human-readable oracle name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Seconds between cycle starts.
  #[serde(default = "default_update_interval")]
  pub update_interval_secs: u64,
  /// Minimum move (percent) that warrants a commit.
  #[serde(default = "default_deviation_threshold")]
  pub deviation_threshold_percent: f64,
  /// z-score above which an observation is an outlier.
  #[serde(default = "default_outlier_threshold")]
  pub outlier_threshold: f64,
  /// Quorum per pair.
  #[serde(default = "default_min_sources")]
  pub min_sources_required: usize,
  /// Oldest reading (seconds) before a stale warning.
  #[serde(default = "default_max_price_age")]
  pub max_price_age_secs: u64,
  /// Price combination method.
  #[serde(default)]
  pub aggregation_method: AggregationMethod,
  /// Fetch attempts per cycle; also the circuit breaker threshold.
  #[serde(default = "default_retry_attempts")]
  pub retry_attempts: u32,
  /// What the update gate compares against.
  #[serde(default)]
  pub gate_reference: GateReference,
  /// Log commits instead of submitting them.
  #[serde(default)]
  pub dry_run: bool,
}

/// Individual pair configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
  /// Base asset ticker.
  pub base: String,
  /// Quote asset ticker.
  pub quote: String,
  /// Symbol override; defaults to `BASE/QUOTE`.
  pub symbol: Option<String>,
  /// Whether the pair participates in cycles.
  #[serde(default = "default_true")]
  pub active: bool,
  /// Lowest plausible price.
  pub min_price: f64,
  /// Highest plausible price.
  pub max_price: f64,
  /// Fixed-point precision for ledger commits.
  #[serde(default = "default_decimal_places")]
  pub decimal_places: u32,
}

impl PairConfig {
  /// Convert into the domain entity.
  pub fn to_trading_pair(&self) -> TradingPair {
    let mut pair = TradingPair::new(&self.base, &self.quote, self.min_price, self.max_price);
    if let Some(symbol) = &self.symbol {
      pair.symbol = symbol.clone();
    }
    pair.is_active = self.active;
    pair.decimal_places = self.decimal_places;
    pair
  }
}

/// External price source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  /// Adapter id: `binance`, `coinbase` or `coingecko`.
  pub id: String,
  /// Whether the source is queried.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Weight for the weighted aggregation method.
  #[serde(default = "default_weight")]
  pub weight: f64,
  /// Base URL override (tests, proxies).
  pub base_url: Option<String>,
  /// Request timeout in milliseconds.
  #[serde(default = "default_source_timeout")]
  pub timeout_ms: u64,
  /// Request budget for the source.
  #[serde(default = "default_requests_per_minute")]
  pub requests_per_minute: u32,
  /// Ticker → provider asset id (CoinGecko: "BTC" → "bitcoin").
  #[serde(default)]
  pub asset_ids: BTreeMap<String, String>,
}

/// Ledger (EVM chain) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  /// JSON-RPC endpoint.
  pub rpc_url: String,
  /// Price feed contract address.
  pub contract_address: String,
  /// Chain id to enforce at startup.
  pub expected_chain_id: Option<u64>,
  /// Confirmations to wait for before a commit counts.
  #[serde(default = "default_confirmations")]
  pub confirmations: u64,
  /// Receipt wait timeout in seconds.
  #[serde(default = "default_receipt_timeout")]
  pub receipt_timeout_secs: u64,
}

/// Health rule configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
  /// Window (seconds) over which recent cycle failures are counted.
  #[serde(default = "default_error_window")]
  pub error_window_secs: u64,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      error_window_secs: default_error_window(),
    }
  }
}

/// Metrics and status server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Serve /metrics, /health and /status.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the state snapshot and cycle journal.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Append every cycle to the JSONL journal.
  #[serde(default = "default_true")]
  pub journal_enabled: bool,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      journal_enabled: true,
    }
  }
}

/// The numbers the controller and domain need, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSettings {
  pub update_interval_secs: u64,
  pub deviation_threshold_percent: f64,
  pub outlier_threshold: f64,
  pub min_sources_required: usize,
  pub max_price_age_secs: u64,
  pub aggregation_method: AggregationMethod,
  pub retry_attempts: u32,
  pub gate_reference: GateReference,
  pub error_window_secs: u64,
  pub source_weights: HashMap<String, f64>,
}

impl Default for OracleSettings {
  fn default() -> Self {
    Self {
      update_interval_secs: default_update_interval(),
      deviation_threshold_percent: default_deviation_threshold(),
      outlier_threshold: default_outlier_threshold(),
      min_sources_required: default_min_sources(),
      max_price_age_secs: default_max_price_age(),
      aggregation_method: AggregationMethod::default(),
      retry_attempts: default_retry_attempts(),
      gate_reference: GateReference::default(),
      error_window_secs: default_error_window(),
      source_weights: HashMap::new(),
    }
  }
}

impl AppConfig {
  /// Flatten the thresholds into controller settings.
  pub fn settings(&self) -> OracleSettings {
    OracleSettings {
      update_interval_secs: self.oracle.update_interval_secs,
      deviation_threshold_percent: self.oracle.deviation_threshold_percent,
      outlier_threshold: self.oracle.outlier_threshold,
      min_sources_required: self.oracle.min_sources_required,
      max_price_age_secs: self.oracle.max_price_age_secs,
      aggregation_method: self.oracle.aggregation_method,
      retry_attempts: self.oracle.retry_attempts,
      gate_reference: self.oracle.gate_reference,
      error_window_secs: self.health.error_window_secs,
      source_weights: self
        .sources
        .iter()
        .filter(|s| s.enabled)
        .map(|s| (s.id.clone(), s.weight))
        .collect(),
    }
  }

  /// Domain pairs, active and inactive.
  pub fn trading_pairs(&self) -> Vec<TradingPair> {
    self.pairs.iter().map(PairConfig::to_trading_pair).collect()
  }

  /// Enabled sources only.
  pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
    self.sources.iter().filter(|s| s.enabled)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_update_interval() -> u64 {
  60
}

fn default_deviation_threshold() -> f64 {
  0.5
}

fn default_outlier_threshold() -> f64 {
  2.0
}

fn default_min_sources() -> usize {
  2
}

fn default_max_price_age() -> u64 {
  300
}

fn default_retry_attempts() -> u32 {
  3
}

fn default_decimal_places() -> u32 {
  8
}

fn default_weight() -> f64 {
  1.0
}

fn default_source_timeout() -> u64 {
  5_000
}

fn default_requests_per_minute() -> u32 {
  60
}

fn default_confirmations() -> u64 {
  1
}

fn default_receipt_timeout() -> u64 {
  60
}

fn default_error_window() -> u64 {
  600
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}
