//! Backoff policy for transient control-plane failures.
//!
//! The config watcher keeps polling forever; this policy spaces out the
//! retries after consecutive failures so a flapping control plane is not
//! hammered at the full polling rate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with a cap.
///
/// Deliberately jitterless: the watcher runs one fetch at a time per
/// producer, and deterministic delays keep the control loop testable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling for the computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per additional consecutive failure.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after `consecutive_failures` failures in a row.
    ///
    /// Zero failures means no delay.
    pub fn delay_for_failures(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(consecutive_failures - 1).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_without_failures() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_failures(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_failures(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_failures(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_failures(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_failures(10), Duration::from_secs(15));
    }

    #[test]
    fn test_large_failure_count_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_failures(u32::MAX), policy.max_delay);
    }
}
