//! Price Oracle - Entry Point
//!
//! Wires configuration, logging, price sources, the ledger and the
//! controller, then runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config (path from argv[1], `ORACLE_CONFIG`, or `config.toml`)
//! 2. Init tracing (JSON structured logging)
//! 3. Build price sources and the fan-out fetcher
//! 4. Build the ledger: dry-run, or alloy signer from `ORACLE_PRIVATE_KEY`
//! 5. Open the file repository and load the last snapshot
//! 6. Build the controller and run the first cycle (fail fast)
//! 7. Spawn the health/status/metrics server
//! 8. Wait for SIGINT/SIGTERM → stop → save final snapshot

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use price_oracle::adapters::chain::{ChainLedger, DryRunLedger, LedgerProvider};
use price_oracle::adapters::metrics::{HealthServer, MetricsRegistry};
use price_oracle::adapters::persistence::FileRepository;
use price_oracle::adapters::sources::build_sources;
use price_oracle::config::{self, AppConfig};
use price_oracle::ports::ledger::LedgerClient;
use price_oracle::ports::pipeline::Committer;
use price_oracle::ports::repository::OracleRepository;
use price_oracle::usecases::{OracleController, SourceFanOut, default_pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ORACLE_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.oracle.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.oracle.name,
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.oracle.dry_run,
        pairs = config.pairs.len(),
        interval_secs = config.oracle.update_interval_secs,
        "Starting price oracle"
    );

    // ── 3. Price sources ────────────────────────────────────
    let source_configs: Vec<_> = config.enabled_sources().cloned().collect();
    let sources = build_sources(&source_configs).context("Failed to build price sources")?;
    let fetcher = Arc::new(SourceFanOut::new(sources.clone()));

    // ── 4. Ledger ───────────────────────────────────────────
    let (ledger, committer) = build_ledger(&config).await?;
    match ledger.balance().await {
        Ok(balance) => info!(balance, "Ledger signer balance"),
        Err(e) => warn!(error = %e, "Could not query ledger signer balance"),
    }

    // ── 5. Persistence ──────────────────────────────────────
    let repository: Arc<dyn OracleRepository> = Arc::new(
        FileRepository::from_data_dir(
            &config.persistence.data_dir,
            config.persistence.journal_enabled,
        )
        .await
        .context("Failed to open data directory")?,
    );
    let snapshot = match repository.load_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable snapshot");
            None
        }
    };

    // ── 6. Controller ───────────────────────────────────────
    let settings = config.settings();
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let pipeline = default_pipeline(&settings, fetcher, committer);
    let mut controller = OracleController::new(settings, config.trading_pairs(), pipeline)
        .with_sources(sources)
        .with_observer(metrics.clone())
        .with_repository(Arc::clone(&repository))
        .with_ledger(Arc::clone(&ledger));
    if let Some(snapshot) = snapshot {
        controller = controller.with_snapshot(snapshot);
    }
    let controller = Arc::new(controller);

    let first = controller
        .start()
        .await
        .context("Initial oracle cycle failed")?;
    info!(
        cycle_id = %first.cycle_id,
        committed = first.committed_count(),
        "Oracle running"
    );

    // ── 7. Health / status / metrics server ────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let server_handle = if config.metrics.enabled {
        let server = HealthServer::new(
            Arc::clone(&controller),
            metrics,
            config.metrics.bind_address.clone(),
        );
        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!(error = %e, "Health server failed");
            }
        }))
    } else {
        None
    };

    // ── 8. Wait for SIGINT or SIGTERM ───────────────────────
    wait_for_shutdown().await;

    controller.stop().await;
    let _ = shutdown_tx.send(());
    if let Some(handle) = server_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    controller.persist().await;

    info!("Shutdown complete");
    Ok(())
}

/// Build the ledger from config: dry-run, or a signing chain client.
async fn build_ledger(config: &AppConfig) -> Result<(Arc<dyn LedgerClient>, Arc<dyn Committer>)> {
    if config.oracle.dry_run {
        warn!("Dry-run mode - prices are logged, NOT committed on-chain");
        let ledger = Arc::new(DryRunLedger::new());
        return Ok((ledger.clone() as Arc<dyn LedgerClient>, ledger as Arc<dyn Committer>));
    }

    let private_key = std::env::var("ORACLE_PRIVATE_KEY")
        .context("ORACLE_PRIVATE_KEY must be set unless dry_run is enabled")?;
    let provider = Arc::new(
        LedgerProvider::connect(&config.ledger, &private_key)
            .await
            .context("Failed to connect ledger provider")?,
    );
    let ledger = Arc::new(ChainLedger::new(provider, &config.ledger)?);
    Ok((ledger.clone() as Arc<dyn LedgerClient>, ledger as Arc<dyn Committer>))
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
    info!("Shutdown requested");
}
