//! Tunable constants for a producer instance.
//!
//! Everything timing-related is injected through [`ProducerSettings`] rather
//! than read from module globals, so tests can run the control loop at
//! millisecond speeds.

use crate::retry::BackoffPolicy;
use std::time::Duration;

/// Header carrying the security key on control-plane and SOI requests.
pub const SECURITY_KEY_HEADER: &str = "x-security-key";

/// Vendor error code: the control plane requires a serial id.
pub const VENDOR_CODE_SERIAL_REQUIRED: &str = "00144000002";
/// Vendor error code: the registered producer type does not match.
pub const VENDOR_CODE_TYPE_MISMATCH: &str = "00144000004";

/// Default interval between remote-config fetches.
const DEFAULT_CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default job-loop polling interval, used when the remote config carries none.
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(30);
/// Default budget for one collect pass over a batch.
const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(90);
/// Default producer type tag.
const DEFAULT_KIND: &str = "SERVICE";

/// Runtime constants for one [`Producer`](crate::producer::Producer).
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// How often the config watcher fetches the remote producer config.
    pub config_poll_interval: Duration,
    /// Job-loop interval floor; the remote `pollingInterval` is clamped to
    /// at least this value.
    pub default_polling_interval: Duration,
    /// Time budget for one worker collect pass; items still unresolved when
    /// it elapses are marked `TIMEOUT`.
    pub collect_timeout: Duration,
    /// Producer type used when the caller never sets one.
    pub default_kind: String,
    /// Backoff applied between consecutive config-watch failures.
    pub backoff: BackoffPolicy,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            config_poll_interval: DEFAULT_CONFIG_POLL_INTERVAL,
            default_polling_interval: DEFAULT_POLLING_INTERVAL,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            default_kind: DEFAULT_KIND.to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ProducerSettings {
    /// Effective job-loop interval for the given remote `pollingInterval`
    /// (seconds). The larger of the two wins.
    pub fn polling_interval(&self, remote_seconds: Option<u64>) -> Duration {
        match remote_seconds {
            Some(secs) => self.default_polling_interval.max(Duration::from_secs(secs)),
            None => self.default_polling_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_interval_uses_remote_when_larger() {
        let settings = ProducerSettings::default();
        assert_eq!(
            settings.polling_interval(Some(120)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_polling_interval_clamps_to_default_floor() {
        let settings = ProducerSettings::default();
        assert_eq!(settings.polling_interval(Some(1)), Duration::from_secs(30));
        assert_eq!(settings.polling_interval(None), Duration::from_secs(30));
    }
}
