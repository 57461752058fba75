//! Retry ceiling and backoff configuration for jobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff: the n-th failed attempt waits `base * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base_delay: Duration,
}

impl BackoffPolicy {
    /// Creates an exponential policy with the given base delay.
    #[must_use]
    pub const fn exponential(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Returns the base delay.
    #[must_use]
    pub const fn base_delay(self) -> Duration {
        self.base_delay
    }

    /// Returns the wait before retrying after `failed_attempts` failures.
    ///
    /// Saturates instead of overflowing for large attempt counts.
    #[must_use]
    pub fn delay_after(self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl JobOptions {
    /// Default attempt ceiling.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Creates options with an attempt ceiling and backoff policy.
    ///
    /// A ceiling of zero is raised to one so every job runs at least once.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff policy.
    #[must_use]
    pub const fn backoff(self) -> BackoffPolicy {
        self.backoff
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, BackoffPolicy::default())
    }
}
