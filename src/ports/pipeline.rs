//! Pipeline Port - The Four Cycle Strategies
//!
//! The controller runs one fixed pipeline (fetch → validate → aggregate
//! → gate → commit) over four injected capabilities. Default
//! implementations live in the domain (validator, aggregator), in
//! `usecases::fetcher` (source fan-out) and in every `LedgerClient`
//! (committer).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::aggregation::{AggregationReport, PriceAggregator};
use crate::domain::observation::{CommitHandle, Observation, TradingPair, ValidationOutcome};
use crate::domain::validation::ObservationValidator;

use super::ledger::{LedgerClient, PriceCommit};

/// Collects one cycle's observations for the active pairs.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
  /// Fetch observations; the returned batch is the cycle snapshot.
  ///
  /// # Errors
  /// Returns error when the fetch stage as a whole failed.
  async fn fetch(&self, pairs: &[TradingPair]) -> anyhow::Result<Vec<Observation>>;
}

/// Screens a fetched batch.
pub trait Validator: Send + Sync + 'static {
  /// Validate `observations` against `pairs` as of `now`.
  fn validate(
    &self,
    observations: &[Observation],
    pairs: &[TradingPair],
    now: DateTime<Utc>,
  ) -> ValidationOutcome;
}

/// Turns validated observations into per-pair aggregates.
pub trait Aggregator: Send + Sync + 'static {
  /// Aggregate a validated batch.
  fn aggregate(&self, observations: &[Observation]) -> AggregationReport;
}

/// Writes an approved aggregate to the ledger.
#[async_trait]
pub trait Committer: Send + Sync + 'static {
  /// Commit and return the ledger handle.
  ///
  /// # Errors
  /// Returns error when the ledger rejects or times out.
  async fn commit(&self, commit: &PriceCommit) -> anyhow::Result<CommitHandle>;
}

impl Validator for ObservationValidator {
  fn validate(
    &self,
    observations: &[Observation],
    pairs: &[TradingPair],
    now: DateTime<Utc>,
  ) -> ValidationOutcome {
    ObservationValidator::validate(self, observations, pairs, now)
  }
}

impl Aggregator for PriceAggregator {
  fn aggregate(&self, observations: &[Observation]) -> AggregationReport {
    PriceAggregator::aggregate(self, observations)
  }
}

#[async_trait]
impl<L: LedgerClient + ?Sized> Committer for L {
  async fn commit(&self, commit: &PriceCommit) -> anyhow::Result<CommitHandle> {
    self.submit(commit).await
  }
}

/// The four strategies a controller runs each cycle.
#[derive(Clone)]
pub struct Pipeline {
  pub fetcher: Arc<dyn Fetcher>,
  pub validator: Arc<dyn Validator>,
  pub aggregator: Arc<dyn Aggregator>,
  pub committer: Arc<dyn Committer>,
}
