//! Oracle error taxonomy.
//!
//! Hard errors bubble to the controller and count as cycle failures.
//! Quorum and gate skips are not errors; see `domain::SkipReason`.

use thiserror::Error;

/// Hard failures of a cycle or a lifecycle operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
  /// Every fetch attempt in the cycle failed.
  #[error("fetch failed after {attempts} attempt(s): {message}")]
  Fetch { attempts: u32, message: String },

  /// Observations were present but semantically invalid.
  #[error("validation failed: {}", errors.join("; "))]
  Validation { errors: Vec<String> },

  /// A ledger submission failed; never retried within the cycle.
  #[error("ledger commit for {pair} failed: {message}")]
  Ledger { pair: String, message: String },

  /// `start()` while already running.
  #[error("oracle is already running")]
  AlreadyRunning,
}

impl OracleError {
  /// Short label for metrics.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Fetch { .. } => "fetch",
      Self::Validation { .. } => "validation",
      Self::Ledger { .. } => "ledger",
      Self::AlreadyRunning => "already_running",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validation_message_joins_errors() {
    let e = OracleError::Validation {
      errors: vec!["a".to_string(), "b".to_string()],
    };
    assert_eq!(e.to_string(), "validation failed: a; b");
    assert_eq!(e.kind(), "validation");
  }
}
