//! Source Fan-Out - Concurrent Fetch Across Sources and Pairs
//!
//! Queries every configured source for every active pair at once and
//! joins the results into one batch. The join is the barrier: nothing
//! downstream sees observations until every request has settled.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::observation::{Observation, TradingPair};
use crate::ports::pipeline::Fetcher;
use crate::ports::price_source::PriceSource;

/// Default fetcher over a fixed set of price sources.
pub struct SourceFanOut {
  sources: Vec<Arc<dyn PriceSource>>,
}

impl SourceFanOut {
  /// Create a fan-out over `sources`.
  pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
    Self { sources }
  }
}

#[async_trait]
impl Fetcher for SourceFanOut {
  /// Fetch every (source, pair) combination concurrently.
  ///
  /// Individual failures are logged and tolerated; the stage fails
  /// only when no observation at all came back.
  async fn fetch(&self, pairs: &[TradingPair]) -> anyhow::Result<Vec<Observation>> {
    let requests = self
      .sources
      .iter()
      .flat_map(|source| {
        pairs.iter().filter(|p| p.is_active).map(move |pair| {
          let source = Arc::clone(source);
          async move {
            let result = source.fetch_price(&pair.base, &pair.quote).await;
            (source, pair, result)
          }
        })
      })
      .collect::<Vec<_>>();

    let total = requests.len();
    anyhow::ensure!(total > 0, "no sources or no active pairs to fetch");

    let mut observations = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (source, pair, result) in join_all(requests).await {
      match result {
        Ok(mut observation) => {
          // Adapters key by ticker; the cycle keys by configured symbol.
          observation.pair = pair.symbol.clone();
          observations.push(observation);
        }
        Err(e) => {
          warn!(
            source = source.id(),
            pair = %pair.symbol,
            error = %e,
            "Source fetch failed"
          );
          failures.push(format!("{}@{}: {e}", source.id(), pair.symbol));
        }
      }
    }

    debug!(
      fetched = observations.len(),
      failed = failures.len(),
      total,
      "Fan-out complete"
    );

    if observations.is_empty() {
      anyhow::bail!("all {total} source requests failed: {}", failures.join("; "));
    }

    Ok(observations)
  }
}
