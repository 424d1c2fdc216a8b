//! Aggregation engine - reconciles disagreeing sources into one price.
//!
//! Per pair: z-score outlier removal, quorum re-check, price combination
//! (average / median / weighted), freshest timestamp, dispersion and a
//! 0-100 confidence score. Pure function of its input plus static config.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::observation::{
    AggregatedObservation, AggregationMethod, Observation, PairSymbol, SkipReason, SourceId,
};

/// Weight used for sources without an explicit configured weight.
pub const DEFAULT_SOURCE_WEIGHT: f64 = 1.0;

/// Maximum confidence deducted for source disagreement.
const MAX_DISPERSION_PENALTY: f64 = 30.0;

/// Penalty points per unit of coefficient of variation.
const DISPERSION_PENALTY_SCALE: f64 = 50.0;

/// Result of aggregating one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PairAggregate {
    /// Quorum met; a value is published.
    Ready(AggregatedObservation),
    /// Quorum not met after outlier removal.
    Skipped(SkipReason),
}

/// Aggregation result for a whole cycle, keyed by pair symbol.
pub type AggregationReport = BTreeMap<PairSymbol, PairAggregate>;

/// Static aggregation configuration.
#[derive(Debug, Clone)]
pub struct PriceAggregator {
    /// Combination method.
    method: AggregationMethod,
    /// z-score above which an observation is an outlier.
    outlier_threshold: f64,
    /// Quorum after outlier removal.
    min_sources_required: usize,
    /// Per-source weights for the weighted method.
    weights: HashMap<SourceId, f64>,
}

impl PriceAggregator {
    /// Create an aggregator.
    pub fn new(
        method: AggregationMethod,
        outlier_threshold: f64,
        min_sources_required: usize,
        weights: HashMap<SourceId, f64>,
    ) -> Self {
        Self {
            method,
            outlier_threshold,
            min_sources_required: min_sources_required.max(1),
            weights,
        }
    }

    /// Group observations by pair and aggregate each group.
    pub fn aggregate(&self, observations: &[Observation]) -> AggregationReport {
        let mut groups: BTreeMap<PairSymbol, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            groups.entry(obs.pair.clone()).or_default().push(obs.clone());
        }

        groups
            .into_iter()
            .map(|(pair, group)| {
                let result = self.aggregate_pair(&pair, group);
                (pair, result)
            })
            .collect()
    }

    /// Aggregate a single pair's observations.
    pub fn aggregate_pair(&self, pair: &str, observations: Vec<Observation>) -> PairAggregate {
        let (cleaned, rejected) = remove_outliers(observations, self.outlier_threshold);

        if cleaned.len() < self.min_sources_required {
            return PairAggregate::Skipped(SkipReason::InsufficientQuorum {
                surviving: cleaned.len(),
                required: self.min_sources_required,
            });
        }

        let prices: Vec<f64> = cleaned.iter().map(|o| o.price).collect();
        let price = match self.method {
            AggregationMethod::Average => mean(&prices),
            AggregationMethod::Median => median(&prices),
            AggregationMethod::Weighted => {
                let weighted: Vec<(f64, f64)> = cleaned
                    .iter()
                    .map(|o| (o.price, self.weight_of(&o.source_id)))
                    .collect();
                weighted_average(&weighted)
            }
        };

        let standard_deviation = population_std_dev(&prices);
        let confidence = confidence_score(
            cleaned.len(),
            self.min_sources_required,
            mean(&prices),
            standard_deviation,
        );

        // Non-empty: quorum is at least one.
        let timestamp = cleaned
            .iter()
            .map(|o| o.timestamp)
            .max()
            .unwrap_or_default();

        let contributing_sources: BTreeSet<SourceId> =
            cleaned.iter().map(|o| o.source_id.clone()).collect();

        PairAggregate::Ready(AggregatedObservation {
            pair: pair.to_string(),
            price,
            timestamp,
            contributing_sources,
            source_count: cleaned.len(),
            standard_deviation,
            confidence,
            rejected_outliers: rejected,
        })
    }

    fn weight_of(&self, source_id: &str) -> f64 {
        self.weights
            .get(source_id)
            .copied()
            .unwrap_or(DEFAULT_SOURCE_WEIGHT)
    }
}

/// Split observations into `(kept, rejected)` by z-score.
///
/// Groups of two or fewer are returned untouched, as are groups whose
/// prices are all identical (zero standard deviation).
pub fn remove_outliers(
    observations: Vec<Observation>,
    threshold: f64,
) -> (Vec<Observation>, Vec<Observation>) {
    if observations.len() <= 2 {
        return (observations, Vec::new());
    }

    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let mu = mean(&prices);
    let sigma = population_std_dev(&prices);
    if sigma == 0.0 {
        return (observations, Vec::new());
    }

    observations
        .into_iter()
        .partition(|o| (o.price - mu).abs() / sigma <= threshold)
}

/// Arithmetic mean; zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; zero for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median; average of the two middle values for even counts.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// `Σ(price·weight) / Σ(weight)`; zero when the total weight is zero.
pub fn weighted_average(prices_and_weights: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = prices_and_weights.iter().map(|(_, w)| w).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    prices_and_weights.iter().map(|(p, w)| p * w).sum::<f64>() / total_weight
}

/// Confidence in `[0, 100]`: quorum coverage minus a capped dispersion penalty.
///
/// `base = min(count / min_sources, 1) × 100`,
/// `penalty = min((std_dev / mean) × 50, 30)`.
pub fn confidence_score(count: usize, min_sources: usize, mean: f64, std_dev: f64) -> f64 {
    let coverage = (count as f64 / min_sources.max(1) as f64).min(1.0);
    let base = coverage * 100.0;
    let cv = if mean.abs() > f64::EPSILON {
        (std_dev / mean).abs()
    } else {
        0.0
    };
    let penalty = (cv * DISPERSION_PENALTY_SCALE).min(MAX_DISPERSION_PENALTY);
    (base - penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn observations(prices: &[f64]) -> Vec<Observation> {
        let now = Utc::now();
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Observation::new(
                    "BTC/USD",
                    &format!("src{i}"),
                    *p,
                    now - Duration::seconds(i as i64),
                )
            })
            .collect()
    }

    fn aggregator(method: AggregationMethod, min_sources: usize) -> PriceAggregator {
        PriceAggregator::new(method, 2.0, min_sources, HashMap::new())
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[300.0, 100.0, 200.0]), 200.0);
        assert_eq!(median(&[100.0, 200.0]), 150.0);
    }

    #[test]
    fn test_weighted_average() {
        assert_eq!(weighted_average(&[(100.0, 1.0), (300.0, 3.0)]), 250.0);
        assert_eq!(weighted_average(&[(100.0, 0.0), (300.0, 0.0)]), 0.0);
    }

    #[test]
    fn test_small_groups_skip_outlier_removal() {
        let (kept, rejected) = remove_outliers(observations(&[1.0, 1_000.0]), 0.1);
        assert_eq!(kept.len(), 2);
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_identical_prices_have_no_outliers() {
        let (kept, rejected) = remove_outliers(observations(&[5.0, 5.0, 5.0, 5.0]), 0.0);
        assert_eq!(kept.len(), 4);
        assert!(rejected.is_empty());
        assert_eq!(population_std_dev(&[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_three_source_scenario_rejects_nothing() {
        // mean ≈ 116.3, σ ≈ 23.8, z ≈ {0.73, 0.69, 1.41}
        let agg = aggregator(AggregationMethod::Average, 2);
        let PairAggregate::Ready(result) = agg.aggregate_pair("BTC/USD", observations(&[99.0, 100.0, 150.0]))
        else {
            panic!("expected a published aggregate");
        };
        assert_eq!(result.source_count, 3);
        assert!(result.rejected_outliers.is_empty());
        assert!((result.price - 116.333).abs() < 0.01);
    }

    #[test]
    fn test_large_deviation_with_three_sources_is_still_kept() {
        // With n = 3 the maximum attainable z-score is √2, so a 2.0 threshold never fires.
        let agg = aggregator(AggregationMethod::Median, 2);
        let PairAggregate::Ready(result) = agg.aggregate_pair("BTC/USD", observations(&[99.0, 100.0, 500.0]))
        else {
            panic!("expected a published aggregate");
        };
        assert!(result.rejected_outliers.is_empty());
        assert_eq!(result.price, 100.0);
    }

    #[test]
    fn test_outlier_rejected_in_larger_group() {
        let agg = aggregator(AggregationMethod::Average, 3);
        let prices = [100.0, 100.5, 99.5, 100.2, 99.8, 100.1, 160.0];
        let PairAggregate::Ready(result) = agg.aggregate_pair("BTC/USD", observations(&prices)) else {
            panic!("expected a published aggregate");
        };
        assert_eq!(result.rejected_outliers.len(), 1);
        assert_eq!(result.rejected_outliers[0].price, 160.0);
        assert_eq!(result.source_count, 6);
        assert!(!result.contributing_sources.contains("src6"));
        assert!((result.price - 100.016).abs() < 0.01);
    }

    #[test]
    fn test_quorum_failure_after_removal_is_skip() {
        let agg = aggregator(AggregationMethod::Average, 7);
        let prices = [100.0, 100.5, 99.5, 100.2, 99.8, 100.1, 160.0];
        let result = agg.aggregate_pair("BTC/USD", observations(&prices));
        assert_eq!(
            result,
            PairAggregate::Skipped(SkipReason::InsufficientQuorum {
                surviving: 6,
                required: 7
            })
        );
    }

    #[test]
    fn test_freshest_timestamp_wins() {
        let agg = aggregator(AggregationMethod::Median, 1);
        let obs = observations(&[10.0, 11.0, 12.0]);
        let freshest = obs.iter().map(|o| o.timestamp).max().unwrap();
        let PairAggregate::Ready(result) = agg.aggregate_pair("BTC/USD", obs) else {
            panic!("expected a published aggregate");
        };
        assert_eq!(result.timestamp, freshest);
    }

    #[test]
    fn test_weighted_method_uses_configured_weights() {
        let mut weights = HashMap::new();
        weights.insert("src1".to_string(), 3.0);
        let agg = PriceAggregator::new(AggregationMethod::Weighted, 2.0, 2, weights);
        let PairAggregate::Ready(result) = agg.aggregate_pair("BTC/USD", observations(&[100.0, 300.0]))
        else {
            panic!("expected a published aggregate");
        };
        assert_eq!(result.price, 250.0);
    }

    #[test]
    fn test_aggregate_groups_by_pair() {
        let now = Utc::now();
        let mut obs = observations(&[100.0, 101.0]);
        obs.push(Observation::new("ETH/USD", "src0", 3_000.0, now));
        let report = aggregator(AggregationMethod::Median, 2).aggregate(&obs);
        assert!(matches!(report["BTC/USD"], PairAggregate::Ready(_)));
        assert!(matches!(report["ETH/USD"], PairAggregate::Skipped(_)));
    }

    #[test]
    fn test_confidence_full_for_agreeing_quorum() {
        assert_eq!(confidence_score(2, 2, 100.0, 0.0), 100.0);
        assert_eq!(confidence_score(1, 2, 100.0, 0.0), 50.0);
        // cv = 0.1 → penalty 5
        assert!((confidence_score(3, 3, 100.0, 10.0) - 95.0).abs() < 1e-9);
        // penalty capped at 30, never negative
        assert_eq!(confidence_score(3, 3, 100.0, 100.0), 70.0);
        assert_eq!(confidence_score(0, 3, 100.0, 100.0), 0.0);
    }
}
