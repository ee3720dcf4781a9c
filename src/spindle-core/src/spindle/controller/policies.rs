// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operational policies for retry and polling behavior.
//!
//! This module provides configurable policies that control how the spindle
//! task handles retries after failures and how often it samples status.

use std::time::Duration;

use crate::spindle::response::SpindleError;

/// Policy for retrying failed operations.
pub trait RetryPolicy: Send + Sync {
    /// Determine if the operation should be retried.
    fn should_retry(&self, attempt: u32, error: &SpindleError) -> bool;

    /// Get the delay before the next retry attempt.
    fn delay(&self, attempt: u32) -> Duration;

    /// Get the maximum number of attempts allowed.
    fn max_attempts(&self) -> u32;
}

/// Exponential backoff retry policy.
///
/// Delays increase exponentially with each retry attempt,
/// up to a configured maximum delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Create a policy with sensible defaults for device communication.
    pub fn default_spindle() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::default_spindle()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: u32, error: &SpindleError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        // Only retry transient errors
        error.is_transient()
    }

    fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(multiplier);
        delay.min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Policy for sampling spindle status.
pub trait PollingPolicy: Send + Sync {
    /// Get the interval between status polls.
    fn interval(&self, running: bool) -> Duration;
}

/// Adaptive polling policy.
///
/// Uses different intervals depending on whether the spindle is running.
/// Polls more frequently while running to track speed and power closely.
#[derive(Debug, Clone)]
pub struct AdaptivePolling {
    idle_interval: Duration,
    running_interval: Duration,
}

impl AdaptivePolling {
    /// Create a new adaptive polling policy.
    pub fn new(idle_interval: Duration, running_interval: Duration) -> Self {
        Self {
            idle_interval,
            running_interval,
        }
    }

    /// Create a policy with sensible defaults for status sampling.
    pub fn default_spindle() -> Self {
        Self {
            idle_interval: Duration::from_millis(500),
            running_interval: Duration::from_millis(250),
        }
    }
}

impl Default for AdaptivePolling {
    fn default() -> Self {
        Self::default_spindle()
    }
}

impl PollingPolicy for AdaptivePolling {
    fn interval(&self, running: bool) -> Duration {
        if running {
            self.running_interval
        } else {
            self.idle_interval
        }
    }
}

/// Fixed polling policy.
///
/// Uses a constant interval regardless of spindle state.
#[derive(Debug, Clone)]
pub struct FixedPolling {
    interval: Duration,
}

impl FixedPolling {
    /// Create a new fixed polling policy.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PollingPolicy for FixedPolling {
    fn interval(&self, _running: bool) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = ExponentialBackoff::new(5, Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        // Should cap at max_delay
        assert_eq!(policy.delay(4), Duration::from_secs(1));
        assert_eq!(policy.delay(5), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff_should_retry() {
        let policy = ExponentialBackoff::new(3, Duration::from_millis(100), Duration::from_secs(1));

        let transient = SpindleError::Timeout;
        let fatal = SpindleError::NoTargetSpeed;

        assert!(policy.should_retry(0, &transient));
        assert!(policy.should_retry(1, &transient));
        assert!(policy.should_retry(2, &transient));
        assert!(!policy.should_retry(3, &transient)); // exceeded max attempts

        assert!(!policy.should_retry(0, &fatal)); // not transient
    }

    #[test]
    fn test_adaptive_polling() {
        let policy = AdaptivePolling::new(Duration::from_millis(500), Duration::from_millis(250));

        assert_eq!(policy.interval(false), Duration::from_millis(500));
        assert_eq!(policy.interval(true), Duration::from_millis(250));
    }

    #[test]
    fn test_fixed_polling() {
        let policy = FixedPolling::new(Duration::from_millis(200));

        assert_eq!(policy.interval(false), Duration::from_millis(200));
        assert_eq!(policy.interval(true), Duration::from_millis(200));
    }
}
