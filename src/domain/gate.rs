//! Update gate - withholds ledger commits for insignificant moves.
//!
//! Bounds on-chain write volume to price moves of at least the
//! configured deviation threshold.

use serde::{Deserialize, Serialize};

use super::observation::{AggregatedObservation, SkipReason};

/// Which stored value the gate compares a new aggregate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReference {
    /// Previous cycle's aggregated value (last-known-good table).
    #[default]
    LastAggregated,
    /// Last value actually written to the ledger.
    LastCommitted,
}

/// Percentage move from `previous` to `current`.
///
/// `None` when `previous` is zero (no meaningful relative move).
pub fn deviation_percent(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some(((current - previous) / previous).abs() * 100.0)
}

/// Commit if there is no previous value or the move reaches the threshold.
pub fn should_commit(
    previous: Option<&AggregatedObservation>,
    current: &AggregatedObservation,
    deviation_threshold_percent: f64,
) -> bool {
    evaluate(previous, current, deviation_threshold_percent).is_ok()
}

/// Like [`should_commit`] but returns the skip reason when withheld.
pub fn evaluate(
    previous: Option<&AggregatedObservation>,
    current: &AggregatedObservation,
    deviation_threshold_percent: f64,
) -> Result<(), SkipReason> {
    let Some(previous) = previous else {
        return Ok(());
    };
    match deviation_percent(previous.price, current.price) {
        None => Ok(()),
        Some(deviation) if deviation >= deviation_threshold_percent => Ok(()),
        Some(deviation) => Err(SkipReason::BelowDeviationThreshold {
            deviation_percent: deviation,
            threshold_percent: deviation_threshold_percent,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;

    fn at(price: f64) -> AggregatedObservation {
        AggregatedObservation {
            pair: "BTC/USD".to_string(),
            price,
            timestamp: Utc::now(),
            contributing_sources: BTreeSet::new(),
            source_count: 2,
            standard_deviation: 0.0,
            confidence: 100.0,
            rejected_outliers: vec![],
        }
    }

    #[test]
    fn test_first_observation_always_commits() {
        assert!(should_commit(None, &at(100.0), 1.0));
        assert!(should_commit(None, &at(100.0), 1_000.0));
    }

    #[test]
    fn test_small_move_is_withheld() {
        assert!(!should_commit(Some(&at(100.0)), &at(100.5), 1.0));
        let reason = evaluate(Some(&at(100.0)), &at(100.5), 1.0).unwrap_err();
        assert_eq!(reason.label(), "below_threshold");
    }

    #[test]
    fn test_large_move_commits_in_both_directions() {
        assert!(should_commit(Some(&at(100.0)), &at(101.5), 1.0));
        assert!(should_commit(Some(&at(100.0)), &at(98.5), 1.0));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(should_commit(Some(&at(200.0)), &at(202.0), 1.0));
    }

    #[test]
    fn test_zero_previous_price_commits() {
        assert!(should_commit(Some(&at(0.0)), &at(1.0), 1.0));
        assert_eq!(deviation_percent(0.0, 1.0), None);
    }
}
