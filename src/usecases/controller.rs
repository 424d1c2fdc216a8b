//! Oracle Controller - Cycle Orchestration and Circuit Breaker
//!
//! The only long-lived, stateful component. Runs one fixed pipeline
//! per cycle:
//!
//! 1. Fetch observations for all active pairs (whole stage retried
//!    with exponential backoff)
//! 2. Validate the batch (any error aborts the cycle)
//! 3. Aggregate per pair (quorum shortfall is a skip)
//! 4. Gate each aggregate against the reference value
//! 5. Commit approved aggregates to the ledger
//! 6. Update counters and the last-known-good table
//!
//! Cycles are serialized by a single guard shared by scheduled ticks
//! and `force_update()`. A cycle failure increments the consecutive
//! failure counter; reaching `retry_attempts` while running trips the
//! circuit breaker, which stops the schedule and parks the controller
//! in `Failed` until an operator calls `start()` again.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::OracleSettings;
use crate::domain::aggregation::{PairAggregate, PriceAggregator};
use crate::domain::backoff;
use crate::domain::gate::{self, GateReference};
use crate::domain::health::{HealthInputs, HealthReport, derive_health};
use crate::domain::observation::{
  AggregatedObservation, CycleResult, Observation, PairOutcome, PairSymbol, TradingPair,
};
use crate::domain::validation::ObservationValidator;
use crate::error::OracleError;
use crate::ports::ledger::{LedgerClient, PriceCommit};
use crate::ports::observer::{CycleObserver, NoopObserver};
use crate::ports::pipeline::{Committer, Fetcher, Pipeline};
use crate::ports::price_source::{PriceSource, SourceStatus};
use crate::ports::repository::{OracleRepository, OracleSnapshot, SNAPSHOT_VERSION};

use super::lifecycle::LifecycleState;
use super::scheduler::Scheduler;

/// Upper bound on remembered failure timestamps.
const MAX_FAILURE_HISTORY: usize = 1_024;

/// Fixed-point precision used when a pair is not configured.
const DEFAULT_DECIMAL_PLACES: u32 = 8;

/// Counters owned by the controller, read by health and status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerState {
  /// Whether the recurring schedule is armed.
  pub is_running: bool,
  /// Cycles run, successful or not.
  pub total_cycles: u64,
  /// Failures since the last successful cycle.
  pub consecutive_failures: u32,
  /// Lifetime failed cycles.
  pub total_failures: u64,
  /// End of the last successful cycle.
  pub last_success_at: Option<DateTime<Utc>>,
}

/// Read-only status snapshot for operators.
#[derive(Debug, Clone, Serialize)]
pub struct OracleStatus {
  pub lifecycle: LifecycleState,
  pub state: ControllerState,
  pub health: HealthReport,
  pub last_error: Option<String>,
  /// Last aggregated value per pair.
  pub prices: BTreeMap<PairSymbol, AggregatedObservation>,
  pub sources: Vec<SourceStatus>,
  /// `None` when no ledger handle was attached.
  pub ledger_healthy: Option<bool>,
  /// `None` when persistence is disabled.
  pub persistence_healthy: Option<bool>,
}

#[derive(Debug, Default)]
struct FailureLog {
  at: VecDeque<DateTime<Utc>>,
  last_error: Option<String>,
}

impl FailureLog {
  fn record(&mut self, now: DateTime<Utc>, message: String, window: TimeDelta) {
    self.at.push_back(now);
    if let Some(cutoff) = now.checked_sub_signed(window) {
      while self.at.front().is_some_and(|t| *t < cutoff) {
        self.at.pop_front();
      }
    }
    while self.at.len() > MAX_FAILURE_HISTORY {
      self.at.pop_front();
    }
    self.last_error = Some(message);
  }

  fn count_within(&self, now: DateTime<Utc>, window: TimeDelta) -> usize {
    match now.checked_sub_signed(window) {
      Some(cutoff) => self.at.iter().filter(|t| **t >= cutoff).count(),
      None => self.at.len(),
    }
  }
}

/// Build the standard pipeline: domain validator and aggregator
/// configured from `settings`, plus the given fetcher and committer.
pub fn default_pipeline(
  settings: &OracleSettings,
  fetcher: Arc<dyn Fetcher>,
  committer: Arc<dyn Committer>,
) -> Pipeline {
  Pipeline {
    fetcher,
    validator: Arc::new(ObservationValidator::new(
      settings.max_price_age_secs,
      settings.min_sources_required,
    )),
    aggregator: Arc::new(PriceAggregator::new(
      settings.aggregation_method,
      settings.outlier_threshold,
      settings.min_sources_required,
      settings.source_weights.clone(),
    )),
    committer,
  }
}

fn seconds(secs: u64) -> TimeDelta {
  i64::try_from(secs)
    .ok()
    .and_then(TimeDelta::try_seconds)
    .unwrap_or(TimeDelta::MAX)
}

/// Lifecycle controller for one oracle instance.
pub struct OracleController {
  settings: OracleSettings,
  pairs: Vec<TradingPair>,
  pipeline: Pipeline,
  sources: Vec<Arc<dyn PriceSource>>,
  observer: Arc<dyn CycleObserver>,
  repository: Option<Arc<dyn OracleRepository>>,
  ledger: Option<Arc<dyn LedgerClient>>,
  lifecycle: RwLock<LifecycleState>,
  state: RwLock<ControllerState>,
  last_known_good: RwLock<BTreeMap<PairSymbol, AggregatedObservation>>,
  last_committed: RwLock<BTreeMap<PairSymbol, AggregatedObservation>>,
  failures: RwLock<FailureLog>,
  cycle_guard: Mutex<()>,
  scheduler: StdMutex<Scheduler>,
}

impl OracleController {
  /// Create a stopped controller.
  pub fn new(settings: OracleSettings, pairs: Vec<TradingPair>, pipeline: Pipeline) -> Self {
    Self {
      settings,
      pairs,
      pipeline,
      sources: Vec::new(),
      observer: Arc::new(NoopObserver),
      repository: None,
      ledger: None,
      lifecycle: RwLock::new(LifecycleState::Stopped),
      state: RwLock::new(ControllerState::default()),
      last_known_good: RwLock::new(BTreeMap::new()),
      last_committed: RwLock::new(BTreeMap::new()),
      failures: RwLock::new(FailureLog::default()),
      cycle_guard: Mutex::new(()),
      scheduler: StdMutex::new(Scheduler::new()),
    }
  }

  /// Sources reported by `status()`.
  pub fn with_sources(mut self, sources: Vec<Arc<dyn PriceSource>>) -> Self {
    self.sources = sources;
    self
  }

  /// Sink for cycle outcomes (metrics).
  pub fn with_observer(mut self, observer: Arc<dyn CycleObserver>) -> Self {
    self.observer = observer;
    self
  }

  /// Snapshot and journal persistence.
  pub fn with_repository(mut self, repository: Arc<dyn OracleRepository>) -> Self {
    self.repository = Some(repository);
    self
  }

  /// Ledger whose connectivity `status()` reports.
  pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
    self.ledger = Some(ledger);
    self
  }

  /// Warm the price tables from a persisted snapshot.
  ///
  /// Entries for pairs that are no longer configured are dropped. A
  /// snapshot of another format version is ignored.
  pub fn with_snapshot(mut self, snapshot: OracleSnapshot) -> Self {
    if snapshot.version != SNAPSHOT_VERSION {
      warn!(
        found = %snapshot.version,
        expected = SNAPSHOT_VERSION,
        "Ignoring snapshot with unknown version"
      );
      return self;
    }

    let known = |symbol: &PairSymbol| self.pairs.iter().any(|p| &p.symbol == symbol);
    let last_known_good: BTreeMap<_, _> = snapshot
      .last_known_good
      .into_iter()
      .filter(|(symbol, _)| known(symbol))
      .collect();
    let last_committed: BTreeMap<_, _> = snapshot
      .last_committed
      .into_iter()
      .filter(|(symbol, _)| known(symbol))
      .collect();

    info!(
      pairs = last_known_good.len(),
      committed = last_committed.len(),
      saved_at = ?snapshot.saved_at,
      "Warm start from snapshot"
    );

    *self.last_known_good.get_mut() = last_known_good;
    *self.last_committed.get_mut() = last_committed;
    let state = self.state.get_mut();
    state.total_cycles = snapshot.total_cycles;
    state.total_failures = snapshot.total_failures;
    self
  }

  /// Start the oracle.
  ///
  /// Runs one cycle immediately. On success the controller enters
  /// `Running` and arms the schedule, phased from the start of that
  /// first cycle. On failure it returns to `Stopped` and surfaces the
  /// error.
  ///
  /// # Errors
  /// `AlreadyRunning` when starting or running; otherwise the error of
  /// the first cycle.
  pub async fn start(self: &Arc<Self>) -> Result<CycleResult, OracleError> {
    {
      let mut lifecycle = self.lifecycle.write().await;
      if !lifecycle.can_transition_to(LifecycleState::Starting) {
        return Err(OracleError::AlreadyRunning);
      }
      info!(from = %*lifecycle, "Oracle starting");
      *lifecycle = LifecycleState::Starting;
    }

    let first_started = Instant::now();
    let outcome = self.run_cycle().await;

    let mut lifecycle = self.lifecycle.write().await;
    match outcome {
      Ok(result) => {
        if *lifecycle != LifecycleState::Starting {
          info!(state = %*lifecycle, "Stopped during startup cycle, schedule not armed");
          return Ok(result);
        }
        *lifecycle = LifecycleState::Running;
        self.set_running(true).await;
        self.arm_schedule(first_started);
        info!(
          interval_secs = self.settings.update_interval_secs,
          pairs = self.active_pairs().len(),
          "Oracle running"
        );
        Ok(result)
      }
      Err(e) => {
        if *lifecycle == LifecycleState::Starting {
          *lifecycle = LifecycleState::Stopped;
        }
        error!(error = %e, "Oracle failed to start");
        Err(e)
      }
    }
  }

  /// Stop the schedule. Idempotent; an in-flight cycle completes.
  pub async fn stop(&self) {
    let mut lifecycle = self.lifecycle.write().await;
    self.halt(&mut lifecycle, LifecycleState::Stopped).await;
  }

  /// Run one cycle now, outside the schedule.
  ///
  /// Waits for any in-flight cycle; does not shift the schedule phase.
  ///
  /// # Errors
  /// The cycle's hard error (fetch, validation or ledger).
  pub async fn force_update(&self) -> Result<CycleResult, OracleError> {
    info!("Forced update requested");
    self.run_cycle().await
  }

  /// Derive health from the counters.
  pub async fn health(&self) -> HealthReport {
    let now = Utc::now();
    let state = self.state.read().await.clone();
    let recent_errors = self
      .failures
      .read()
      .await
      .count_within(now, seconds(self.settings.error_window_secs));

    derive_health(
      &HealthInputs {
        is_running: state.is_running,
        last_success_at: state.last_success_at,
        update_interval_secs: self.settings.update_interval_secs,
        recent_errors,
        retry_attempts: self.settings.retry_attempts,
      },
      now,
    )
  }

  /// Full status snapshot, including per-source availability and
  /// ledger and persistence reachability.
  pub async fn status(&self) -> OracleStatus {
    let sources = join_all(self.sources.iter().map(|s| s.status())).await;
    let ledger_healthy = match &self.ledger {
      Some(ledger) => Some(ledger.health_check().await),
      None => None,
    };
    let persistence_healthy = match &self.repository {
      Some(repository) => Some(repository.is_healthy().await),
      None => None,
    };
    OracleStatus {
      lifecycle: self.lifecycle_state().await,
      state: self.controller_state().await,
      health: self.health().await,
      last_error: self.failures.read().await.last_error.clone(),
      prices: self.last_known_good().await,
      sources,
      ledger_healthy,
      persistence_healthy,
    }
  }

  /// Current lifecycle state.
  pub async fn lifecycle_state(&self) -> LifecycleState {
    *self.lifecycle.read().await
  }

  /// Copy of the controller counters.
  pub async fn controller_state(&self) -> ControllerState {
    self.state.read().await.clone()
  }

  /// Copy of the last-known-good table.
  pub async fn last_known_good(&self) -> BTreeMap<PairSymbol, AggregatedObservation> {
    self.last_known_good.read().await.clone()
  }

  /// Copy of the last-committed table.
  pub async fn last_committed(&self) -> BTreeMap<PairSymbol, AggregatedObservation> {
    self.last_committed.read().await.clone()
  }

  /// Last aggregated value for one pair.
  pub async fn last_price(&self, pair: &str) -> Option<AggregatedObservation> {
    self.last_known_good.read().await.get(pair).cloned()
  }

  /// Journaled cycles that started within the last `window`, oldest
  /// first. Empty without a repository.
  ///
  /// # Errors
  /// Unreadable journal files.
  pub async fn recent_cycles(&self, window: TimeDelta) -> anyhow::Result<Vec<CycleResult>> {
    let Some(repository) = &self.repository else {
      return Ok(Vec::new());
    };
    let now = Utc::now();
    repository.load_cycles(now - window, now).await
  }

  /// Export the price tables for persistence.
  pub async fn snapshot(&self) -> OracleSnapshot {
    let state = self.state.read().await.clone();
    OracleSnapshot {
      version: SNAPSHOT_VERSION.to_string(),
      saved_at: Some(Utc::now()),
      last_known_good: self.last_known_good().await,
      last_committed: self.last_committed().await,
      total_cycles: state.total_cycles,
      total_failures: state.total_failures,
    }
  }

  /// Save a snapshot through the repository, if one is configured.
  /// Failures are logged, never returned.
  pub async fn persist(&self) {
    let Some(repository) = &self.repository else {
      return;
    };
    let snapshot = self.snapshot().await;
    if let Err(e) = repository.save_snapshot(&snapshot).await {
      warn!(error = %e, "Failed to save oracle snapshot");
    }
  }

  fn active_pairs(&self) -> Vec<TradingPair> {
    self.pairs.iter().filter(|p| p.is_active).cloned().collect()
  }

  fn decimal_places(&self, symbol: &str) -> u32 {
    self
      .pairs
      .iter()
      .find(|p| p.symbol == symbol)
      .map_or(DEFAULT_DECIMAL_PLACES, |p| p.decimal_places)
  }

  async fn set_running(&self, running: bool) {
    self.state.write().await.is_running = running;
    self.observer.running_changed(running);
  }

  fn arm_schedule(self: &Arc<Self>, first_started: Instant) {
    let interval = Duration::from_secs(self.settings.update_interval_secs);
    let controller = Arc::downgrade(self);
    self
      .scheduler
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .arm(interval, first_started + interval, move || {
        let controller = controller.clone();
        async move {
          let Some(controller) = controller.upgrade() else {
            return false;
          };
          controller.run_scheduled_cycle().await
        }
      });
  }

  fn disarm_schedule(&self) {
    self
      .scheduler
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .disarm();
  }

  /// Leave `Running` (or abandon `Starting`) for `target`.
  async fn halt(&self, lifecycle: &mut LifecycleState, target: LifecycleState) {
    match *lifecycle {
      LifecycleState::Running => {
        *lifecycle = LifecycleState::Stopping;
        self.disarm_schedule();
        *lifecycle = target;
        self.set_running(false).await;
        info!(state = %target, "Oracle stopped");
      }
      LifecycleState::Starting => {
        *lifecycle = LifecycleState::Stopped;
        info!("Oracle stopped during startup");
      }
      LifecycleState::Stopped | LifecycleState::Stopping | LifecycleState::Failed => {
        debug!(state = %*lifecycle, "Stop requested while not running");
      }
    }
  }

  /// One serialized cycle plus its bookkeeping.
  async fn run_cycle(&self) -> Result<CycleResult, OracleError> {
    let _guard = self.cycle_guard.lock().await;
    self.cycle_locked().await
  }

  /// Scheduled tick. The running check happens under the guard, so a
  /// tick queued behind a forced update sees a `stop()` issued meanwhile.
  /// Returns false once the schedule should end.
  async fn run_scheduled_cycle(&self) -> bool {
    let _guard = self.cycle_guard.lock().await;
    if !self.lifecycle_state().await.is_running() {
      debug!("Scheduled tick after stop, skipping");
      return false;
    }
    // Outcome already recorded by the cycle.
    let _ = self.cycle_locked().await;
    true
  }

  /// Cycle body; caller holds `cycle_guard`.
  async fn cycle_locked(&self) -> Result<CycleResult, OracleError> {
    let cycle_id = Uuid::new_v4();
    let started_at = Utc::now();
    let clock = Instant::now();
    debug!(%cycle_id, "Cycle started");

    match self.execute_cycle(cycle_id).await {
      Ok((per_pair, warnings)) => {
        let result = CycleResult {
          cycle_id,
          started_at,
          duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
          per_pair,
          warnings,
        };
        self.record_success(&result).await;
        Ok(result)
      }
      Err(e) => {
        self.record_failure(cycle_id, &e, clock.elapsed()).await;
        Err(e)
      }
    }
  }

  #[instrument(skip_all, fields(cycle_id = %cycle_id))]
  async fn execute_cycle(
    &self,
    cycle_id: Uuid,
  ) -> Result<(BTreeMap<PairSymbol, PairOutcome>, Vec<String>), OracleError> {
    let active = self.active_pairs();
    let observations = self.fetch_with_retry(&active).await?;

    let validation = self
      .pipeline
      .validator
      .validate(&observations, &self.pairs, Utc::now());
    if !validation.valid {
      return Err(OracleError::Validation {
        errors: validation.errors,
      });
    }
    for warning in &validation.warnings {
      warn!(%cycle_id, warning = %warning, "Validation warning");
    }

    let report = self.pipeline.aggregator.aggregate(&validation.accepted);

    let mut per_pair = BTreeMap::new();
    let mut aggregated = Vec::with_capacity(report.len());
    for (symbol, aggregate) in report {
      let outcome = match aggregate {
        PairAggregate::Skipped(reason) => {
          info!(%cycle_id, pair = %symbol, reason = reason.label(), "Pair skipped");
          PairOutcome::Skipped { reason }
        }
        PairAggregate::Ready(current) => self.gate_and_commit(cycle_id, current).await?,
      };
      if let Some(aggregate) = outcome.aggregate() {
        aggregated.push(aggregate.clone());
      }
      per_pair.insert(symbol, outcome);
    }

    // Only a completed cycle refreshes last-known-good.
    let mut last_known_good = self.last_known_good.write().await;
    for aggregate in aggregated {
      last_known_good.insert(aggregate.pair.clone(), aggregate);
    }

    Ok((per_pair, validation.warnings))
  }

  /// Retry the whole fetch stage with backoff between attempts.
  async fn fetch_with_retry(&self, pairs: &[TradingPair]) -> Result<Vec<Observation>, OracleError> {
    let attempts = self.settings.retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
      match self.pipeline.fetcher.fetch(pairs).await {
        Ok(observations) => {
          debug!(attempt, count = observations.len(), "Fetch succeeded");
          return Ok(observations);
        }
        Err(e) => {
          warn!(attempt, max_attempts = attempts, error = %e, "Fetch attempt failed");
          last_error = format!("{e:#}");
          if attempt < attempts {
            tokio::time::sleep(backoff::delay(attempt)).await;
          }
        }
      }
    }

    Err(OracleError::Fetch {
      attempts,
      message: last_error,
    })
  }

  async fn reference_value(&self, symbol: &str) -> Option<AggregatedObservation> {
    match self.settings.gate_reference {
      GateReference::LastAggregated => self.last_known_good.read().await.get(symbol).cloned(),
      GateReference::LastCommitted => self.last_committed.read().await.get(symbol).cloned(),
    }
  }

  async fn gate_and_commit(
    &self,
    cycle_id: Uuid,
    current: AggregatedObservation,
  ) -> Result<PairOutcome, OracleError> {
    let previous = self.reference_value(&current.pair).await;
    if let Err(reason) = gate::evaluate(
      previous.as_ref(),
      &current,
      self.settings.deviation_threshold_percent,
    ) {
      debug!(
        %cycle_id,
        pair = %current.pair,
        price = current.price,
        reason = reason.label(),
        "Commit withheld"
      );
      return Ok(PairOutcome::Withheld {
        aggregate: current,
        reason,
      });
    }

    let commit = PriceCommit::from_aggregate(&current, self.decimal_places(&current.pair));
    let handle = self
      .pipeline
      .committer
      .commit(&commit)
      .await
      .map_err(|e| OracleError::Ledger {
        pair: current.pair.clone(),
        message: format!("{e:#}"),
      })?;

    info!(
      %cycle_id,
      pair = %current.pair,
      price = current.price,
      confidence = current.confidence,
      sources = current.source_count,
      handle = %handle,
      "Price committed"
    );

    // Recorded before the next pair so a later failure cannot re-commit it.
    self
      .last_committed
      .write()
      .await
      .insert(current.pair.clone(), current.clone());

    Ok(PairOutcome::Committed {
      aggregate: current,
      handle,
    })
  }

  async fn record_success(&self, result: &CycleResult) {
    {
      let mut state = self.state.write().await;
      state.total_cycles += 1;
      state.consecutive_failures = 0;
      state.last_success_at = Some(Utc::now());
    }

    info!(
      cycle_id = %result.cycle_id,
      duration_ms = result.duration_ms,
      pairs = result.per_pair.len(),
      committed = result.committed_count(),
      "Cycle completed"
    );
    self.observer.cycle_succeeded(result);

    if let Some(repository) = &self.repository {
      if let Err(e) = repository.append_cycle(result).await {
        warn!(error = %e, "Failed to journal cycle");
      }
      self.persist().await;
    }
  }

  async fn record_failure(&self, cycle_id: Uuid, e: &OracleError, elapsed: Duration) {
    let consecutive = {
      let mut state = self.state.write().await;
      state.total_cycles += 1;
      state.total_failures += 1;
      state.consecutive_failures += 1;
      state.consecutive_failures
    };
    self.failures.write().await.record(
      Utc::now(),
      e.to_string(),
      seconds(self.settings.error_window_secs),
    );

    error!(
      %cycle_id,
      error = %e,
      kind = e.kind(),
      consecutive_failures = consecutive,
      "Cycle failed"
    );
    self
      .observer
      .cycle_failed(e, elapsed.as_secs_f64(), consecutive);

    if consecutive >= self.settings.retry_attempts {
      let mut lifecycle = self.lifecycle.write().await;
      if *lifecycle == LifecycleState::Running {
        error!(
          consecutive_failures = consecutive,
          threshold = self.settings.retry_attempts,
          "Circuit breaker tripped, halting oracle"
        );
        self.halt(&mut lifecycle, LifecycleState::Failed).await;
      }
    }
  }
}
