//! Retry policy for transient SQLite contention.
//!
//! Only `SQLITE_BUSY` / `SQLITE_LOCKED` are retried. Each retry starts a fresh
//! transaction, so preconditions are re-read rather than assumed.
//!
//! - Max retries: 5 (6 total attempts)
//! - Initial delay: 10ms, doubling per attempt
//! - Max delay: 500ms
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first attempt).
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_delay_ms: u64,
    /// Down-jitter factor (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 10,
            max_delay_ms: 500,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `backoff_step` (0 before the first retry).
    #[must_use]
    pub fn delay(&self, backoff_step: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * 2.0_f64.powi(backoff_step.min(30) as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        let jitter = 1.0 - rand::random::<f64>() * jitter_factor;
        Duration::from_nanos((capped * jitter * 1_000_000.0) as u64)
    }
}
