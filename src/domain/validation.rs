//! Observation validation - structural and freshness screening.
//!
//! Runs before aggregation over the whole fetched batch. Errors are
//! hard failures that abort the entire cycle (all pairs); warnings
//! flag stale readings that are still used.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::observation::{Observation, TradingPair, ValidationOutcome};

/// Screens observations against the configured pairs.
#[derive(Debug, Clone)]
pub struct ObservationValidator {
    /// Oldest acceptable reading, in seconds, before a stale warning.
    max_price_age_secs: i64,
    /// Minimum observations per active pair after error-filtering.
    min_sources_required: usize,
}

impl ObservationValidator {
    /// Create a validator from the oracle thresholds.
    pub fn new(max_price_age_secs: u64, min_sources_required: usize) -> Self {
        Self {
            max_price_age_secs: i64::try_from(max_price_age_secs).unwrap_or(i64::MAX),
            min_sources_required,
        }
    }

    /// Validate a batch of observations as of `now`.
    ///
    /// Per observation:
    /// - unknown or inactive pair → error, dropped
    /// - non-finite or non-positive price → error, dropped
    /// - price outside `[min_price, max_price]` → error, dropped
    /// - older than `max_price_age_secs` → warning, kept
    ///
    /// Then per active pair: fewer than `min_sources_required` kept
    /// observations → error.
    pub fn validate(
        &self,
        observations: &[Observation],
        pairs: &[TradingPair],
        now: DateTime<Utc>,
    ) -> ValidationOutcome {
        let active: HashMap<&str, &TradingPair> = pairs
            .iter()
            .filter(|p| p.is_active)
            .map(|p| (p.symbol.as_str(), p))
            .collect();

        let mut outcome = ValidationOutcome::default();
        let mut kept_per_pair: HashMap<&str, usize> = HashMap::new();

        for obs in observations {
            let Some(pair) = active.get(obs.pair.as_str()) else {
                outcome.errors.push(format!(
                    "unknown pair {} from source {}",
                    obs.pair, obs.source_id
                ));
                continue;
            };

            if !obs.price.is_finite() {
                outcome.errors.push(format!(
                    "invalid price {} for {} from {}",
                    obs.price, obs.pair, obs.source_id
                ));
                continue;
            }

            if !pair.in_range(obs.price) {
                outcome.errors.push(format!(
                    "price {} for {} from {} outside [{}, {}]",
                    obs.price, obs.pair, obs.source_id, pair.min_price, pair.max_price
                ));
                continue;
            }

            let age_secs = (now - obs.timestamp).num_seconds();
            if age_secs > self.max_price_age_secs {
                outcome.warnings.push(format!(
                    "stale price for {} from {}: {}s old (max {}s)",
                    obs.pair, obs.source_id, age_secs, self.max_price_age_secs
                ));
            }

            *kept_per_pair.entry(pair.symbol.as_str()).or_default() += 1;
            outcome.accepted.push(obs.clone());
        }

        let mut symbols: Vec<&str> = active.keys().copied().collect();
        symbols.sort_unstable();
        for symbol in symbols {
            let count = kept_per_pair.get(symbol).copied().unwrap_or(0);
            if count < self.min_sources_required {
                outcome.errors.push(format!(
                    "insufficient sources for pair {symbol}: {count} < {}",
                    self.min_sources_required
                ));
            }
        }

        outcome.valid = outcome.errors.is_empty();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn btc() -> TradingPair {
        TradingPair::new("BTC", "USD", 1_000.0, 500_000.0)
    }

    fn obs(source: &str, price: f64, age_secs: i64, now: DateTime<Utc>) -> Observation {
        Observation::new("BTC/USD", source, price, now - Duration::seconds(age_secs))
    }

    #[test]
    fn test_valid_batch() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 2);
        let out = v.validate(
            &[obs("binance", 60_000.0, 5, now), obs("coinbase", 60_010.0, 5, now)],
            &[btc()],
            now,
        );
        assert!(out.valid);
        assert!(out.errors.is_empty());
        assert!(out.warnings.is_empty());
        assert_eq!(out.accepted.len(), 2);
    }

    #[test]
    fn test_unknown_pair_is_error_and_dropped() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 1);
        let stray = Observation::new("DOGE/USD", "binance", 0.1, now);
        let out = v.validate(&[obs("binance", 60_000.0, 0, now), stray], &[btc()], now);
        assert!(!out.valid);
        assert_eq!(out.accepted.len(), 1);
        assert!(out.errors[0].contains("unknown pair DOGE/USD"));
    }

    #[test]
    fn test_inactive_pair_counts_as_unknown() {
        let now = Utc::now();
        let mut pair = btc();
        pair.is_active = false;
        let v = ObservationValidator::new(300, 1);
        let out = v.validate(&[obs("binance", 60_000.0, 0, now)], &[pair], now);
        assert!(!out.valid);
        assert!(out.accepted.is_empty());
    }

    #[test]
    fn test_out_of_range_price_is_error() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 1);
        let out = v.validate(
            &[obs("binance", 60_000.0, 0, now), obs("coinbase", 999.0, 0, now)],
            &[btc()],
            now,
        );
        assert!(!out.valid);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("outside"));
    }

    #[test]
    fn test_zero_price_is_judged_by_range_only() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 1);
        let floor = TradingPair::new("BTC", "USD", 0.0, 500_000.0);
        let out = v.validate(&[obs("binance", 0.0, 0, now)], &[floor], now);
        assert!(out.valid);
        assert_eq!(out.accepted.len(), 1);

        let out = v.validate(&[obs("binance", 0.0, 0, now)], &[btc()], now);
        assert!(!out.valid);
        assert!(out.errors[0].contains("outside"));
    }

    #[test]
    fn test_non_finite_price_is_error() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 1);
        let floor = TradingPair::new("BTC", "USD", 0.0, f64::MAX);
        let out = v.validate(&[obs("binance", f64::INFINITY, 0, now)], &[floor], now);
        assert!(!out.valid);
        assert!(out.errors[0].contains("invalid price inf"));
    }

    #[test]
    fn test_stale_is_warning_only() {
        let now = Utc::now();
        let v = ObservationValidator::new(60, 2);
        let out = v.validate(
            &[obs("binance", 60_000.0, 120, now), obs("coinbase", 60_000.0, 1, now)],
            &[btc()],
            now,
        );
        assert!(out.valid);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("stale"));
        assert_eq!(out.accepted.len(), 2);
    }

    #[test]
    fn test_insufficient_sources_after_filtering() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 2);
        let out = v.validate(
            &[obs("binance", 60_000.0, 0, now), obs("coinbase", f64::NAN, 0, now)],
            &[btc()],
            now,
        );
        assert!(!out.valid);
        assert!(out
            .errors
            .iter()
            .any(|e| e.starts_with("insufficient sources for pair BTC/USD")));
    }

    #[test]
    fn test_pair_with_no_observations_fails_whole_batch() {
        let now = Utc::now();
        let v = ObservationValidator::new(300, 1);
        let eth = TradingPair::new("ETH", "USD", 10.0, 50_000.0);
        let out = v.validate(&[obs("binance", 60_000.0, 0, now)], &[btc(), eth], now);
        assert!(!out.valid);
        assert_eq!(out.errors, vec!["insufficient sources for pair ETH/USD: 0 < 1"]);
    }
}
