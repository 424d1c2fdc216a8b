//! Cycle Observer Port - Outcome Notifications
//!
//! Receives every cycle outcome and lifecycle change from the
//! controller. Used for metrics; must not block.

use crate::domain::observation::CycleResult;
use crate::error::OracleError;

/// Trait for cycle outcome sinks.
pub trait CycleObserver: Send + Sync + 'static {
  /// A cycle completed successfully.
  fn cycle_succeeded(&self, result: &CycleResult);

  /// A cycle failed; `consecutive_failures` includes this one.
  fn cycle_failed(&self, error: &OracleError, duration_secs: f64, consecutive_failures: u32);

  /// The controller entered or left the running state.
  fn running_changed(&self, running: bool);
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CycleObserver for NoopObserver {
  fn cycle_succeeded(&self, _result: &CycleResult) {}

  fn cycle_failed(&self, _error: &OracleError, _duration_secs: f64, _consecutive_failures: u32) {}

  fn running_changed(&self, _running: bool) {}
}
