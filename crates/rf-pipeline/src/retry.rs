//! Retry policy: exponential backoff with jitter, bounded attempts.

use std::time::Duration;

use rand::Rng;
use rf_core::config::RetryConfig;
use rf_core::ErrorKind;

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the next attempt after this delay.
    Retry(Duration),
    /// Give up; the job fails.
    Exhausted,
}

/// Decides whether a failed stage attempt is retried and after what delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_ratio: f64,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ratio: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    ///
    /// Fatal kinds are exhausted immediately. Retryable kinds are exhausted
    /// once `attempt` reaches the configured maximum.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if !kind.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(self.delay(attempt))
    }

    /// `base * 2^(attempt-1)`, capped at the maximum. Non-decreasing in
    /// `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let ms = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(exp).unwrap_or(u64::MAX))
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// [`base_delay`](Self::base_delay) plus up to `jitter_ratio` of it at
    /// random.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter = (base.as_millis() as f64 * self.jitter_ratio) as u64;
        if max_jitter == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            cfg.base_delay_ms,
            cfg.max_delay_ms,
            cfg.jitter_ratio,
        )
    }
}
