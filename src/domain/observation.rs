//! Core oracle domain types.
//!
//! Defines the configured trading pairs, the per-source observations
//! fetched each cycle, and the aggregated values the controller keeps
//! in its last-known-good table. These types are the inner ring of the
//! hexagonal architecture: no I/O, fully serializable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ────────────────────────────────────────────
// Type aliases consumed by ports and adapters
// ────────────────────────────────────────────

/// Pair symbol used as the key everywhere (e.g. "BTC/USD").
pub type PairSymbol = String;

/// Identifier of an external price source (e.g. "binance").
pub type SourceId = String;

/// Handle returned by the ledger for a committed price (tx hash).
pub type CommitHandle = String;

// ────────────────────────────────────────────
// Configuration entities
// ────────────────────────────────────────────

/// A base/quote asset combination tracked by the oracle.
///
/// Immutable once loaded at startup. Inactive pairs are never
/// fetched, validated, or committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    /// Base asset ticker (e.g. "BTC").
    pub base: String,
    /// Quote asset ticker (e.g. "USD").
    pub quote: String,
    /// Canonical symbol, the table key.
    pub symbol: PairSymbol,
    /// Whether the pair participates in cycles.
    pub is_active: bool,
    /// Lowest plausible price; anything below is rejected.
    pub min_price: f64,
    /// Highest plausible price; anything above is rejected.
    pub max_price: f64,
    /// Fixed-point precision used when committing to the ledger.
    pub decimal_places: u32,
}

impl TradingPair {
    /// Build an active pair with `BASE/QUOTE` as its symbol.
    pub fn new(base: &str, quote: &str, min_price: f64, max_price: f64) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            symbol: format!("{}/{}", base.to_uppercase(), quote.to_uppercase()),
            is_active: true,
            min_price,
            max_price,
            decimal_places: 8,
        }
    }

    /// Whether `price` lies inside `[min_price, max_price]`.
    pub fn in_range(&self, price: f64) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// How cleaned prices are combined into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Arithmetic mean.
    Average,
    /// Middle value (mean of the two middle values for even counts).
    #[default]
    Median,
    /// Mean weighted by static per-source weights.
    Weighted,
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Median => write!(f, "median"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

// ────────────────────────────────────────────
// Per-cycle values
// ────────────────────────────────────────────

/// One source's reading for one pair. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Pair symbol this reading is for.
    pub pair: PairSymbol,
    /// Reported price in quote units.
    pub price: f64,
    /// When the source produced the price.
    pub timestamp: DateTime<Utc>,
    /// Which source produced it.
    pub source_id: SourceId,
    /// 24h traded volume, when the source reports it.
    pub volume_24h: Option<f64>,
    /// 24h change in percent, when the source reports it.
    pub change_24h: Option<f64>,
    /// Market capitalisation, when the source reports it.
    pub market_cap: Option<f64>,
    /// Source-assigned confidence in the reading (0-100).
    pub confidence: f64,
}

impl Observation {
    /// Minimal observation with full source confidence.
    pub fn new(pair: &str, source_id: &str, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair: pair.to_string(),
            price,
            timestamp,
            source_id: source_id.to_string(),
            volume_24h: None,
            change_24h: None,
            market_cap: None,
            confidence: 100.0,
        }
    }
}

/// Result of screening a batch of observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Hard violations; any entry aborts the cycle.
    pub errors: Vec<String>,
    /// Soft violations (stale readings); observations are kept.
    pub warnings: Vec<String>,
    /// Observations that passed error-filtering, in input order.
    pub accepted: Vec<Observation>,
}

/// The reconciled value for one pair in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedObservation {
    /// Pair symbol.
    pub pair: PairSymbol,
    /// Combined price.
    pub price: f64,
    /// Freshest timestamp among the contributing observations.
    pub timestamp: DateTime<Utc>,
    /// Sources that survived outlier removal.
    pub contributing_sources: BTreeSet<SourceId>,
    /// Number of observations that survived outlier removal.
    pub source_count: usize,
    /// Population standard deviation of the surviving prices.
    pub standard_deviation: f64,
    /// Confidence score, 0-100.
    pub confidence: f64,
    /// Observations dropped as outliers, kept for audit.
    pub rejected_outliers: Vec<Observation>,
}

/// Why a pair produced no commit this cycle. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fewer than the quorum survived outlier removal.
    InsufficientQuorum {
        /// Survivors after outlier removal.
        surviving: usize,
        /// Configured quorum.
        required: usize,
    },
    /// The price moved less than the deviation threshold.
    BelowDeviationThreshold {
        /// Observed move in percent.
        deviation_percent: f64,
        /// Configured threshold in percent.
        threshold_percent: f64,
    },
}

impl SkipReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsufficientQuorum { .. } => "insufficient_quorum",
            Self::BelowDeviationThreshold { .. } => "below_threshold",
        }
    }
}

/// Per-pair outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    /// Aggregated and written to the ledger.
    Committed {
        /// Aggregated value that was committed.
        aggregate: AggregatedObservation,
        /// Ledger commit handle.
        handle: CommitHandle,
    },
    /// Aggregated but the gate withheld the commit.
    Withheld {
        /// Aggregated value (still becomes last-known-good).
        aggregate: AggregatedObservation,
        /// Gate reason.
        reason: SkipReason,
    },
    /// No aggregate could be produced.
    Skipped {
        /// Aggregation reason.
        reason: SkipReason,
    },
}

impl PairOutcome {
    /// Commit handle, or `"skipped"` when nothing was written.
    pub fn handle_or_skipped(&self) -> &str {
        match self {
            Self::Committed { handle, .. } => handle,
            _ => "skipped",
        }
    }

    /// The aggregated value, when one was produced.
    pub fn aggregate(&self) -> Option<&AggregatedObservation> {
        match self {
            Self::Committed { aggregate, .. } | Self::Withheld { aggregate, .. } => Some(aggregate),
            Self::Skipped { .. } => None,
        }
    }
}

/// Summary of one successful cycle, used for logging, metrics and the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    /// Unique cycle identifier.
    pub cycle_id: Uuid,
    /// Wall-clock start of the cycle.
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds.
    pub duration_ms: u64,
    /// Outcome per active pair.
    pub per_pair: BTreeMap<PairSymbol, PairOutcome>,
    /// Warnings raised by validation (stale readings).
    pub warnings: Vec<String>,
}

impl CycleResult {
    /// Pair → commit handle or `"skipped"`.
    pub fn commit_hashes(&self) -> BTreeMap<PairSymbol, String> {
        self.per_pair
            .iter()
            .map(|(pair, outcome)| (pair.clone(), outcome.handle_or_skipped().to_string()))
            .collect()
    }

    /// Number of pairs written to the ledger.
    pub fn committed_count(&self) -> usize {
        self.per_pair
            .values()
            .filter(|o| matches!(o, PairOutcome::Committed { .. }))
            .count()
    }
}
