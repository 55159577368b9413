use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_MAX_RETRIES: usize = 9;
pub(crate) const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Bounds applied to every call made through a
/// [`RetryableClient`](crate::RetryableClient).
///
/// `max_retries` counts retries, not attempts: the default of 9 allows 10
/// attempts. A `max_elapsed_time` of zero never gives up on time.
///
/// When `max_retries` is zero and `max_elapsed_time` is set, the elapsed time
/// is the only bound and the call keeps retrying until it runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    max_retries: usize,
    #[serde(rename = "max_interval_ms", with = "duration_ms")]
    max_interval: Duration,
    #[serde(rename = "max_elapsed_time_ms", with = "duration_ms")]
    max_elapsed_time: Duration,
}

impl RetryConfig {
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed_time: Duration::ZERO,
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    pub fn configured_max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn configured_max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn configured_max_elapsed_time(&self) -> Duration {
        self.max_elapsed_time
    }

    /// Number of attempts a call may start, or `None` when only elapsed time
    /// bounds the call.
    pub(crate) fn attempt_limit(&self) -> Option<usize> {
        if self.max_retries == 0 && !self.max_elapsed_time.is_zero() {
            return None;
        }
        Some(self.max_retries.saturating_add(1))
    }

    pub(crate) fn elapsed_limit(&self) -> Option<Duration> {
        (!self.max_elapsed_time.is_zero()).then_some(self.max_elapsed_time)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
