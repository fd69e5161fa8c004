//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Dial backoff: `base_ms * 2^(n-1)` after the n-th failure, capped at
/// `max_ms`, plus up to 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Delay before retrying after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let Some(exponent) = failures.checked_sub(1) else {
            return Duration::ZERO;
        };

        let capped = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_ms);

        let spread = capped / 10;
        let jitter = if spread > 0 {
            rand::thread_rng().gen_range(0..spread)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = ExponentialBackoff::new(100, 1000);
        assert_eq!(policy.delay(0), Duration::ZERO);

        let first = policy.delay(1).as_millis();
        assert!((100..110).contains(&first));

        let second = policy.delay(2).as_millis();
        assert!((200..220).contains(&second));

        let capped = policy.delay(30).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_small_delays_have_no_jitter() {
        let policy = ExponentialBackoff::new(5, 5);
        assert_eq!(policy.delay(3), Duration::from_millis(5));
    }
}
