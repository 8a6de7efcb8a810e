// Retry strategy implementation with exponential backoff and jitter
// Used by executors for required external calls that may fail transiently

use rand::Rng;
use std::time::Duration;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, given how many attempts have already
    /// been made. Returns None once the attempt budget is spent.
    fn next_delay(&self, attempts_made: u32) -> Option<Duration>;

    /// Total number of attempts, including the first one
    fn max_attempts(&self) -> u32;
}

/// Exponential backoff retry strategy with jitter
/// Sequence: base, 2×base, 4×base, ... capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
    max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            max_attempts: 3,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Exponential delay without jitter
    fn calculate_base_delay(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2_u32.pow(exponent))
            .min(self.max_delay)
    }

    /// Add random jitter to prevent thundering herd
    fn add_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let base_ms = delay.as_millis() as u64;
        let jitter_range_ms = (base_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_range_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        Duration::from_millis(base_ms + jitter_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        Some(self.add_jitter(self.calculate_base_delay(attempts_made)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay retry strategy (for testing or simple cases)
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let strategy = ExponentialBackoff::with_config(
            Duration::from_millis(100),
            Duration::from_secs(60),
            0.0,
            5,
        );

        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(3), Some(Duration::from_millis(400)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(800)));
        assert_eq!(strategy.next_delay(5), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = ExponentialBackoff::with_config(
            Duration::from_secs(1),
            Duration::from_secs(5),
            0.0,
            20,
        );
        assert_eq!(strategy.next_delay(10), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let strategy = ExponentialBackoff::with_config(
            Duration::from_millis(10),
            Duration::from_secs(1),
            0.1,
            1,
        );
        assert_eq!(strategy.max_attempts(), 1);
        assert_eq!(strategy.next_delay(1), None);
    }

    #[test]
    fn test_fixed_delay() {
        let strategy = FixedDelay::new(Duration::from_millis(5), 2);
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(5)));
        assert_eq!(strategy.next_delay(2), None);
    }

    proptest! {
        #[test]
        fn property_jitter_stays_within_bounds(
            attempt in 1u32..8,
            base_ms in 1u64..1_000,
            jitter in 0.0f64..1.0,
        ) {
            let strategy = ExponentialBackoff::with_config(
                Duration::from_millis(base_ms),
                Duration::from_secs(600),
                jitter,
                10,
            );
            let base = strategy.calculate_base_delay(attempt);
            let delay = strategy.next_delay(attempt).unwrap();
            prop_assert!(delay >= base);
            let upper = base.as_millis() as f64 * (1.0 + jitter) + 1.0;
            prop_assert!((delay.as_millis() as f64) <= upper);
        }
    }
}
