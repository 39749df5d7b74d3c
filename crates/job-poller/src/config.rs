//! Polling configuration.

use std::time::Duration;

/// Timing and failure policy for [`crate::JobPollingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between polls. The first poll after an attach is immediate.
    pub interval: Duration,
    /// Consecutive failed polls before the job is considered lost.
    pub max_consecutive_errors: u32,
    /// Upper bound on waiting for the service to acknowledge a cancel.
    pub cancel_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_errors: 3,
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// Reads `JOB_POLL_INTERVAL_MS`, `JOB_POLL_MAX_ERRORS` and `JOB_CANCEL_TIMEOUT_MS`;
    /// unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_millis("JOB_POLL_INTERVAL_MS").unwrap_or(defaults.interval),
            max_consecutive_errors: std::env::var("JOB_POLL_MAX_ERRORS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_consecutive_errors),
            cancel_timeout: env_millis("JOB_CANCEL_TIMEOUT_MS").unwrap_or(defaults.cancel_timeout),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
