//! Oracle lifecycle states and the allowed transitions between them.

use serde::Serialize;

/// Lifecycle of an oracle controller.
///
/// `Stopped → Starting → Running → Stopping → Stopped`, plus `Failed`,
/// reached only when the circuit breaker trips. An operator may start
/// again from either `Stopped` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
  #[default]
  Stopped,
  Starting,
  Running,
  Stopping,
  Failed,
}

impl std::fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Stopped => write!(f, "stopped"),
      Self::Starting => write!(f, "starting"),
      Self::Running => write!(f, "running"),
      Self::Stopping => write!(f, "stopping"),
      Self::Failed => write!(f, "failed"),
    }
  }
}

impl LifecycleState {
  /// Whether `self → next` is a legal transition.
  pub fn can_transition_to(self, next: Self) -> bool {
    use LifecycleState::{Failed, Running, Starting, Stopped, Stopping};

    matches!(
      (self, next),
      (Stopped | Failed, Starting)
        | (Starting, Running | Stopped)
        | (Running, Stopping)
        | (Stopping, Stopped | Failed)
    )
  }

  /// Whether the scheduler should be armed in this state.
  pub fn is_running(self) -> bool {
    self == Self::Running
  }
}

#[cfg(test)]
mod tests {
  use super::LifecycleState::*;

  #[test]
  fn test_start_allowed_from_stopped_and_failed() {
    assert!(Stopped.can_transition_to(Starting));
    assert!(Failed.can_transition_to(Starting));
    assert!(!Running.can_transition_to(Starting));
    assert!(!Starting.can_transition_to(Starting));
  }

  #[test]
  fn test_failed_only_via_stopping() {
    assert!(Stopping.can_transition_to(Failed));
    assert!(!Starting.can_transition_to(Failed));
    assert!(!Stopped.can_transition_to(Failed));
  }

  #[test]
  fn test_display() {
    assert_eq!(Running.to_string(), "running");
    assert_eq!(Failed.to_string(), "failed");
  }
}
