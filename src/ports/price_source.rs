//! Price Source Port - External Price API Interface
//!
//! Defines the trait every external price provider adapter implements.
//! The aggregation engine never knows how many sources exist or which
//! APIs they wrap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::observation::{Observation, SourceId};

/// Availability snapshot of a single source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
  /// Source identifier.
  pub source_id: SourceId,
  /// Whether the most recent request succeeded.
  pub online: bool,
  /// Time of the last successful fetch.
  pub last_success_at: Option<DateTime<Utc>>,
  /// Total failed fetches since startup.
  pub error_count: u64,
  /// Message of the most recent failure.
  pub last_error: Option<String>,
}

/// Trait for price source providers.
///
/// Implementors wrap one external API (REST polling). A failed fetch
/// is a network or parse error; the fan-out tolerates individual
/// failures and only fails when nothing was fetched at all.
#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
  /// Stable identifier used for weights and audit.
  fn id(&self) -> &str;

  /// Fetch the current price of `base` in `quote`.
  ///
  /// # Errors
  /// Returns error on network failure, non-success status, or an
  /// unparseable response.
  async fn fetch_price(&self, base: &str, quote: &str) -> anyhow::Result<Observation>;

  /// Current availability of the source.
  async fn status(&self) -> SourceStatus;
}
