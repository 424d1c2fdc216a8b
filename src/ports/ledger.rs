//! Ledger Port - Price Commit Interface
//!
//! Defines the trait for writing aggregated prices to the external
//! ledger. Transaction construction, signing, submission and
//! confirmation all live behind this boundary.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::observation::{AggregatedObservation, CommitHandle, SourceId};

/// Everything the ledger needs to record one price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCommit {
  /// Pair symbol.
  pub pair: String,
  /// Aggregated price.
  pub price: f64,
  /// Freshest contributing timestamp.
  pub timestamp: DateTime<Utc>,
  /// Sources that contributed.
  pub contributing_sources: BTreeSet<SourceId>,
  /// Confidence score (0-100).
  pub confidence: f64,
  /// Fixed-point precision for the on-ledger integer price.
  pub decimal_places: u32,
}

impl PriceCommit {
  /// Build a commit from an aggregate and the pair precision.
  pub fn from_aggregate(aggregate: &AggregatedObservation, decimal_places: u32) -> Self {
    Self {
      pair: aggregate.pair.clone(),
      price: aggregate.price,
      timestamp: aggregate.timestamp,
      contributing_sources: aggregate.contributing_sources.clone(),
      confidence: aggregate.confidence,
      decimal_places,
    }
  }
}

/// Trait for ledger clients.
///
/// Submission is at-least-once: a submitted transaction is never
/// cancelled, and the controller never blindly resubmits a failed one
/// within a cycle. Implementations should make `submit` idempotent
/// where the ledger allows it.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
  /// Write a price and return its commit handle (transaction hash).
  ///
  /// # Errors
  /// Returns error on insufficient balance, network timeout, or a
  /// rejected/reverted transaction.
  async fn submit(&self, commit: &PriceCommit) -> anyhow::Result<CommitHandle>;

  /// Native balance of the submitting account.
  async fn balance(&self) -> anyhow::Result<f64>;

  /// Check if the ledger connection is healthy.
  async fn health_check(&self) -> bool;
}
