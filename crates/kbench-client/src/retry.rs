//! Backoff policy for transient failures.

use std::time::Duration;

/// Exponential backoff schedule applied to transient error kinds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Multiplier applied per step.
    pub factor: u32,
    /// Maximum number of retries after the initial attempt.
    pub max_steps: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 3,
            max_steps: 6,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `step` (zero-based), saturating on overflow.
    pub fn delay(&self, step: u32) -> Duration {
        self.base
            .saturating_mul(self.factor.saturating_pow(step.min(self.max_steps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_is_exponential() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(300));
        assert_eq!(p.delay(2), Duration::from_millis(900));
        assert_eq!(p.delay(5), Duration::from_millis(24_300));
    }

    #[test]
    fn delay_saturates_past_max_steps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(6), p.delay(100));
    }
}
