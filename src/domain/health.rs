//! Health derivation from controller counters.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Coarse health classification surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health verdict plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reason: Option<String>,
}

/// Inputs to the health rules, captured at one instant.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub is_running: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub update_interval_secs: u64,
    pub recent_errors: usize,
    pub retry_attempts: u32,
}

/// Apply the rules in order: not running, stale, error rate, healthy.
pub fn derive_health(inputs: &HealthInputs, now: DateTime<Utc>) -> HealthReport {
    if !inputs.is_running {
        return HealthReport {
            status: HealthStatus::Unhealthy,
            reason: Some("oracle is not running".to_string()),
        };
    }

    let stale_after = i64::try_from(inputs.update_interval_secs.saturating_mul(2))
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    if let Some(last) = inputs.last_success_at {
        if now - last > stale_after {
            return HealthReport {
                status: HealthStatus::Degraded,
                reason: Some(format!(
                    "stale: last success {}s ago",
                    (now - last).num_seconds()
                )),
            };
        }
    }

    if inputs.recent_errors as f64 > f64::from(inputs.retry_attempts) / 2.0 {
        return HealthReport {
            status: HealthStatus::Degraded,
            reason: Some(format!(
                "{} recent cycle failures",
                inputs.recent_errors
            )),
        };
    }

    HealthReport {
        status: HealthStatus::Healthy,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> HealthInputs {
        HealthInputs {
            is_running: true,
            last_success_at: Some(Utc::now()),
            update_interval_secs: 60,
            recent_errors: 0,
            retry_attempts: 3,
        }
    }

    #[test]
    fn test_not_running_is_unhealthy() {
        let mut i = inputs();
        i.is_running = false;
        assert_eq!(derive_health(&i, Utc::now()).status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_stale_is_degraded() {
        let now = Utc::now();
        let mut i = inputs();
        i.last_success_at = Some(now - TimeDelta::seconds(121));
        let report = derive_health(&i, now);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.reason.unwrap().starts_with("stale"));
    }

    #[test]
    fn test_error_rate_is_degraded() {
        let mut i = inputs();
        i.recent_errors = 2;
        assert_eq!(derive_health(&i, Utc::now()).status, HealthStatus::Degraded);
        i.recent_errors = 1;
        assert_eq!(derive_health(&i, Utc::now()).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_healthy() {
        let report = derive_health(&inputs(), Utc::now());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.reason.is_none());
    }
}
