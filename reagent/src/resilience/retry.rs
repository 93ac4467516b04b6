//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

/// Configuration for retrying failed external calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call.
    pub max_attempts: u32,
    /// Base backoff interval in seconds.
    pub base_interval_secs: f64,
    /// Cap on the backoff interval in seconds.
    pub max_interval_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_interval_secs: 1.0,
            max_interval_secs: 30.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that performs the first attempt only.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Copy with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Copy with different backoff intervals.
    #[must_use]
    pub fn with_intervals(mut self, base_secs: f64, max_secs: f64) -> Self {
        self.base_interval_secs = base_secs.max(0.0);
        self.max_interval_secs = max_secs.max(self.base_interval_secs);
        self
    }

    /// Backoff interval before the retry following attempt `attempt`
    /// (1-indexed): exponential growth capped at the maximum, with half
    /// jitter to avoid thundering herds.
    #[must_use]
    pub fn backoff_interval(&self, attempt: u32) -> Duration {
        let exp = self.base_interval_secs * 2f64.powi(attempt.saturating_sub(1).min(16) as i32);
        let capped = exp.min(self.max_interval_secs);
        let jittered = capped / 2.0 + fastrand::f64() * (capped / 2.0);
        Duration::from_secs_f64(jittered)
    }
}
