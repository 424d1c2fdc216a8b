//! Prometheus Metrics Registry - Oracle Observability
//!
//! Registers the oracle's metrics and receives cycle outcomes from the
//! controller through the `CycleObserver` port. All metrics are named
//! `oracle_*`; per-pair series carry a `pair` label.

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::domain::observation::{CycleResult, PairOutcome};
use crate::error::OracleError;
use crate::ports::observer::CycleObserver;

/// Centralized Prometheus metrics for the oracle.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Cycles by outcome (`success` or the error kind).
    pub cycles_total: IntCounterVec,
    /// Prices written to the ledger.
    pub commits_total: IntCounterVec,
    /// Pairs skipped or withheld, by reason.
    pub commit_skips_total: IntCounterVec,
    /// Observations dropped as outliers.
    pub outliers_rejected_total: IntCounterVec,
    /// Last aggregated price.
    pub price: GaugeVec,
    /// Last aggregate confidence (0-100).
    pub confidence: GaugeVec,
    /// Sources behind the last aggregate.
    pub source_count: GaugeVec,
    /// Current consecutive failure streak.
    pub consecutive_failures: IntGauge,
    /// 1 while the schedule is armed.
    pub running: IntGauge,
    /// Cycle wall time.
    pub cycle_duration_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("oracle_cycles_total", "Oracle cycles by outcome"),
            &["outcome"],
        )?;
        let commits_total = IntCounterVec::new(
            Opts::new("oracle_commits_total", "Prices committed to the ledger"),
            &["pair"],
        )?;
        let commit_skips_total = IntCounterVec::new(
            Opts::new(
                "oracle_commit_skips_total",
                "Pairs not committed in a completed cycle",
            ),
            &["pair", "reason"],
        )?;
        let outliers_rejected_total = IntCounterVec::new(
            Opts::new(
                "oracle_outliers_rejected_total",
                "Observations rejected as statistical outliers",
            ),
            &["pair"],
        )?;
        let price = GaugeVec::new(
            Opts::new("oracle_price", "Last aggregated price"),
            &["pair"],
        )?;
        let confidence = GaugeVec::new(
            Opts::new("oracle_confidence", "Confidence of the last aggregate (0-100)"),
            &["pair"],
        )?;
        let source_count = GaugeVec::new(
            Opts::new("oracle_source_count", "Sources behind the last aggregate"),
            &["pair"],
        )?;
        let consecutive_failures = IntGauge::new(
            "oracle_consecutive_failures",
            "Failed cycles since the last success",
        )?;
        let running = IntGauge::new("oracle_running", "Whether the oracle schedule is armed (1=yes)")?;
        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("oracle_cycle_duration_seconds", "Cycle wall time in seconds")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(commits_total.clone()))?;
        registry.register(Box::new(commit_skips_total.clone()))?;
        registry.register(Box::new(outliers_rejected_total.clone()))?;
        registry.register(Box::new(price.clone()))?;
        registry.register(Box::new(confidence.clone()))?;
        registry.register(Box::new(source_count.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            commits_total,
            commit_skips_total,
            outliers_rejected_total,
            price,
            confidence,
            source_count,
            consecutive_failures,
            running,
            cycle_duration_seconds,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl CycleObserver for MetricsRegistry {
    #[allow(clippy::cast_precision_loss)]
    fn cycle_succeeded(&self, result: &CycleResult) {
        self.cycles_total.with_label_values(&["success"]).inc();
        self.cycle_duration_seconds
            .observe(result.duration_ms as f64 / 1_000.0);
        self.consecutive_failures.set(0);

        for (pair, outcome) in &result.per_pair {
            match outcome {
                PairOutcome::Committed { .. } => {
                    self.commits_total.with_label_values(&[pair.as_str()]).inc();
                }
                PairOutcome::Withheld { reason, .. } | PairOutcome::Skipped { reason } => {
                    self.commit_skips_total
                        .with_label_values(&[pair.as_str(), reason.label()])
                        .inc();
                }
            }

            if let Some(aggregate) = outcome.aggregate() {
                self.price.with_label_values(&[pair.as_str()]).set(aggregate.price);
                self.confidence
                    .with_label_values(&[pair.as_str()])
                    .set(aggregate.confidence);
                self.source_count
                    .with_label_values(&[pair.as_str()])
                    .set(aggregate.source_count as f64);
                self.outliers_rejected_total
                    .with_label_values(&[pair.as_str()])
                    .inc_by(aggregate.rejected_outliers.len() as u64);
            }
        }
    }

    fn cycle_failed(&self, error: &OracleError, duration_secs: f64, consecutive_failures: u32) {
        self.cycles_total.with_label_values(&[error.kind()]).inc();
        self.cycle_duration_seconds.observe(duration_secs);
        self.consecutive_failures.set(i64::from(consecutive_failures));
    }

    fn running_changed(&self, running: bool) {
        self.running.set(i64::from(running));
    }
}
