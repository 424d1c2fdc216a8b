//! Repository Port - Oracle State Persistence Interface
//!
//! Defines traits for persisting the oracle's price tables across
//! restarts and for the append-only cycle audit journal (JSONL).
//! No database dependency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::observation::{AggregatedObservation, CycleResult, PairSymbol};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1";

/// Oracle state snapshot for restart warm-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleSnapshot {
  /// Version of the snapshot format.
  pub version: String,
  /// When the snapshot was taken.
  pub saved_at: Option<DateTime<Utc>>,
  /// Last aggregated value per pair.
  pub last_known_good: BTreeMap<PairSymbol, AggregatedObservation>,
  /// Last value committed to the ledger per pair.
  pub last_committed: BTreeMap<PairSymbol, AggregatedObservation>,
  /// Lifetime cycle count at snapshot time.
  pub total_cycles: u64,
  /// Lifetime failure count at snapshot time.
  pub total_failures: u64,
}

/// Trait for oracle state persistence providers.
///
/// Failures here are reported to the caller but the controller treats
/// them as warnings: persistence never fails a cycle.
#[async_trait]
pub trait OracleRepository: Send + Sync + 'static {
  /// Save the price tables atomically.
  async fn save_snapshot(&self, snapshot: &OracleSnapshot) -> anyhow::Result<()>;

  /// Load the most recent snapshot, if any.
  async fn load_snapshot(&self) -> anyhow::Result<Option<OracleSnapshot>>;

  /// Append a completed cycle to the audit journal.
  async fn append_cycle(&self, result: &CycleResult) -> anyhow::Result<()>;

  /// Load journaled cycles in `[from, to]`.
  async fn load_cycles(
    &self,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> anyhow::Result<Vec<CycleResult>>;

  /// Check if the repository is healthy (directory writable).
  async fn is_healthy(&self) -> bool;
}
