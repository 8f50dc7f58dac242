//! Fixed-delay retry policy.
//!
//! A task retries a bounded number of times and waits the same duration
//! before every retry. There is no backoff multiplier and no jitter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration attached to a task.
///
/// Serialized with the field names used by task decorators in run specs:
/// `retries` and `retry_delay_seconds`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    #[serde(rename = "retries", default)]
    pub max_retries: u32,
    /// Delay between a failed attempt and the next one
    #[serde(rename = "retry_delay_seconds", with = "duration_secs", default)]
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and delay.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Policy that performs exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts an invocation may make.
    ///
    /// Capped at `u32::MAX`: a policy with `u32::MAX` retries makes
    /// `u32::MAX` attempts, not one more.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Retry delay in whole milliseconds, saturating at `u64::MAX`.
    pub fn retry_delay_ms(&self) -> u64 {
        u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns true if another attempt is allowed after `attempts_made`.
    pub fn allows_retry_after(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

/// Serde adapter storing a `Duration` as fractional seconds.
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid retry_delay_seconds {}: {}", secs, e)))
    }
}
