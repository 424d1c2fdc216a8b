//! Integration Tests - End-to-end Oracle Cycle Testing
//!
//! Drives the controller through the real fan-out fetcher, validator,
//! aggregator and gate, with mockall doubles for the price source and
//! ledger ports. Retry backoff runs on paused tokio time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use mockall::mock;

use price_oracle::config::OracleSettings;
use price_oracle::domain::observation::{Observation, PairOutcome, SkipReason, TradingPair};
use price_oracle::error::OracleError;
use price_oracle::ports::ledger::{LedgerClient, PriceCommit};
use price_oracle::ports::price_source::{PriceSource, SourceStatus};
use price_oracle::usecases::{LifecycleState, OracleController, SourceFanOut, default_pipeline};

// ---- Mock Definitions ----

mock! {
    pub Source {}

    #[async_trait::async_trait]
    impl PriceSource for Source {
        fn id(&self) -> &str;
        async fn fetch_price(&self, base: &str, quote: &str) -> anyhow::Result<Observation>;
        async fn status(&self) -> SourceStatus;
    }
}

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl LedgerClient for Ledger {
        async fn submit(&self, commit: &PriceCommit) -> anyhow::Result<String>;
        async fn balance(&self) -> anyhow::Result<f64>;
        async fn health_check(&self) -> bool;
    }
}

// ---- Helpers ----

/// Source quoting a fixed price while `online` is set.
fn source(id: &'static str, price: f64, online: Arc<AtomicBool>) -> Arc<dyn PriceSource> {
    let mut mock = MockSource::new();
    mock.expect_id().return_const(id.to_string());
    mock.expect_fetch_price().returning(move |base, quote| {
        if online.load(Ordering::SeqCst) {
            Ok(Observation::new(&format!("{base}/{quote}"), id, price, Utc::now()))
        } else {
            Err(anyhow::anyhow!("{id} unreachable"))
        }
    });
    mock.expect_status().returning(move || SourceStatus {
        source_id: id.to_string(),
        online: true,
        last_success_at: None,
        error_count: 0,
        last_error: None,
    });
    Arc::new(mock)
}

fn settings(retry_attempts: u32) -> OracleSettings {
    OracleSettings {
        retry_attempts,
        deviation_threshold_percent: 1.0,
        ..OracleSettings::default()
    }
}

fn controller(
    settings: OracleSettings,
    sources: Vec<Arc<dyn PriceSource>>,
    ledger: MockLedger,
) -> Arc<OracleController> {
    let fetcher = Arc::new(SourceFanOut::new(sources.clone()));
    let pipeline = default_pipeline(&settings, fetcher, Arc::new(ledger));
    Arc::new(
        OracleController::new(
            settings,
            vec![TradingPair::new("BTC", "USD", 1_000.0, 1_000_000.0)],
            pipeline,
        )
        .with_sources(sources),
    )
}

// ---- Integration Tests ----

#[tokio::test]
async fn test_start_commits_aggregated_price() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger
        .expect_submit()
        .times(1)
        .returning(|commit| {
            assert_eq!(commit.pair, "BTC/USD");
            assert_eq!(commit.contributing_sources.len(), 2);
            Ok("0xabc".to_string())
        });

    let oracle = controller(
        settings(3),
        vec![
            source("binance", 65_000.0, Arc::clone(&online)),
            source("coinbase", 65_100.0, Arc::clone(&online)),
        ],
        ledger,
    );

    let result = oracle.start().await.unwrap();
    assert_eq!(result.commit_hashes()["BTC/USD"], "0xabc");
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Running);

    let committed = oracle.last_price("BTC/USD").await.unwrap();
    assert_eq!(committed.price, 65_050.0);
    assert_eq!(committed.source_count, 2);

    let status = oracle.status().await;
    assert_eq!(status.sources.len(), 2);
    assert!(status.state.is_running);

    oracle.stop().await;
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_small_move_is_withheld_by_gate() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger.expect_submit().times(1).returning(|_| Ok("0x1".to_string()));

    let oracle = controller(
        settings(3),
        vec![
            source("binance", 3_500.0, Arc::clone(&online)),
            source("coinbase", 3_500.0, Arc::clone(&online)),
        ],
        ledger,
    );

    oracle.start().await.unwrap();
    let second = oracle.force_update().await.unwrap();
    assert!(matches!(
        second.per_pair["BTC/USD"],
        PairOutcome::Withheld {
            reason: SkipReason::BelowDeviationThreshold { .. },
            ..
        }
    ));
    assert_eq!(second.commit_hashes()["BTC/USD"], "skipped");
    assert_eq!(oracle.controller_state().await.consecutive_failures, 0);

    oracle.stop().await;
}

#[tokio::test]
async fn test_single_source_misses_quorum() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger.expect_submit().never();

    let oracle = controller(
        settings(3),
        vec![source("binance", 65_000.0, online)],
        ledger,
    );

    // Validation requires two sources per pair; the whole cycle aborts.
    let err = oracle.start().await.unwrap_err();
    assert!(matches!(err, OracleError::Validation { .. }));
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_ledger_failure_fails_cycle_without_retry() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger
        .expect_submit()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("insufficient funds")));

    let oracle = controller(
        settings(3),
        vec![
            source("binance", 65_000.0, Arc::clone(&online)),
            source("coinbase", 65_000.0, Arc::clone(&online)),
        ],
        ledger,
    );

    let err = oracle.start().await.unwrap_err();
    match err {
        OracleError::Ledger { pair, message } => {
            assert_eq!(pair, "BTC/USD");
            assert!(message.contains("insufficient funds"));
        }
        other => panic!("expected ledger error, got {other:?}"),
    }
    assert!(oracle.last_price("BTC/USD").await.is_none());
    assert_eq!(oracle.controller_state().await.total_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_trips_and_resets() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger.expect_submit().returning(|_| Ok("0x2".to_string()));

    let oracle = controller(
        settings(2),
        vec![
            source("binance", 65_000.0, Arc::clone(&online)),
            source("coinbase", 65_000.0, Arc::clone(&online)),
        ],
        ledger,
    );
    oracle.start().await.unwrap();

    online.store(false, Ordering::SeqCst);
    let first = oracle.force_update().await.unwrap_err();
    assert!(matches!(first, OracleError::Fetch { attempts: 2, .. }));
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Running);

    // Second consecutive failure reaches retry_attempts.
    let second = oracle.force_update().await.unwrap_err();
    assert_eq!(second.kind(), "fetch");
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Failed);
    let state = oracle.controller_state().await;
    assert!(!state.is_running);
    assert_eq!(state.consecutive_failures, 2);

    let status = oracle.status().await;
    assert!(status.last_error.unwrap().contains("unreachable"));

    online.store(true, Ordering::SeqCst);
    oracle.start().await.unwrap();
    let state = oracle.controller_state().await;
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.total_failures, 2);
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Running);

    oracle.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let online = Arc::new(AtomicBool::new(true));
    let mut ledger = MockLedger::new();
    ledger.expect_submit().returning(|_| Ok("0x3".to_string()));

    let oracle = controller(
        settings(3),
        vec![
            source("binance", 65_000.0, Arc::clone(&online)),
            source("coinbase", 65_000.0, Arc::clone(&online)),
        ],
        ledger,
    );

    oracle.start().await.unwrap();
    assert_eq!(oracle.start().await.unwrap_err(), OracleError::AlreadyRunning);

    oracle.stop().await;
    oracle.stop().await;
    assert_eq!(oracle.lifecycle_state().await, LifecycleState::Stopped);
}
