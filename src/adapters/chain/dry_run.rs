//! Dry-run ledger: logs commits instead of submitting them.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::observation::CommitHandle;
use crate::ports::ledger::{LedgerClient, PriceCommit};

/// Ledger that accepts every commit without touching a chain.
#[derive(Debug, Default)]
pub struct DryRunLedger {
    commits: AtomicU64,
}

impl DryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits accepted so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LedgerClient for DryRunLedger {
    async fn submit(&self, commit: &PriceCommit) -> Result<CommitHandle> {
        let handle = format!("dryrun-{}", Uuid::new_v4());
        self.commits.fetch_add(1, Ordering::Relaxed);
        info!(
            pair = %commit.pair,
            price = commit.price,
            confidence = commit.confidence,
            sources = commit.contributing_sources.len(),
            handle = %handle,
            "[DRY RUN] Would commit price"
        );
        Ok(handle)
    }

    async fn balance(&self) -> Result<f64> {
        Ok(0.0)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_dry_run_returns_unique_handles() {
        let ledger = DryRunLedger::new();
        let commit = PriceCommit {
            pair: "ETH/USD".to_string(),
            price: 3500.0,
            timestamp: Utc::now(),
            contributing_sources: Default::default(),
            confidence: 100.0,
            decimal_places: 8,
        };
        let a = ledger.submit(&commit).await.unwrap();
        let b = ledger.submit(&commit).await.unwrap();
        assert!(a.starts_with("dryrun-"));
        assert_ne!(a, b);
        assert_eq!(ledger.commit_count(), 2);
    }
}
