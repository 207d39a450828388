//! Reconnection Policy
//!
//! Exponential backoff with jitter, shared by every transport kind.
//! Construction failures, runtime errors, closes, and heartbeat
//! staleness all funnel through the same policy: uniformly
//! "connection lost, retry".

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles per attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Budget of failed opens before giving up, the initial open
    /// included (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// The attempt counter resets on every successful open and on manual
/// reconnect; once `max_attempts` is exhausted, `next_delay` returns
/// `None` and the client must surface a terminal, user-actionable
/// failure rather than silently stopping.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the next delay duration, applying exponential backoff with
    /// jitter. Each call records one failed open; once the budget of
    /// `max_attempts` failed opens is spent, returns `None` and no
    /// further open may be scheduled.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt_count += 1;
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        // Pre-compute the (capped) delay for the next call.
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        let capped_u64 = u64::try_from(capped).unwrap_or(u64::MAX);
        self.current_delay = Duration::from_millis(capped_u64);

        Some(delay_with_jitter)
    }

    /// Reset the policy after a successful open or a manual reconnect.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn exponential_doubling() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));

        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(200));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(400));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(800));
    }

    #[test]
    fn delay_caps_at_max() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            multiplier: 4.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        };
        let mut policy = ReconnectPolicy::new(config);

        let _ = policy.next_delay();
        assert_eq!(policy.next_delay().unwrap(), Duration::from_secs(30));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn max_attempts_exhausts() {
        let mut policy = ReconnectPolicy::new(no_jitter(3));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 2);

        // The third failed open spends the budget; nothing more is
        // scheduled after it.
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 3);
        assert!(!policy.should_retry());
    }

    #[test]
    fn budget_counts_failed_opens_not_scheduled_retries() {
        let mut policy = ReconnectPolicy::new(no_jitter(5));

        let delays = std::iter::from_fn(|| policy.next_delay())
            .take(10)
            .count();

        assert_eq!(delays, 4, "five failed opens allow only four reopens");
    }

    #[test]
    fn reset_restores_base_delay_and_budget() {
        let mut policy = ReconnectPolicy::new(no_jitter(3));

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(BackoffConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                jitter_factor: 0.1,
                max_attempts: 0,
            });

            let millis = policy.next_delay().unwrap().as_millis();
            assert!(millis >= 900, "delay {millis}ms below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms above maximum 1100ms");
        }
    }

    proptest! {
        // Without jitter the delay sequence is non-decreasing and never
        // exceeds the cap, for any initial delay and attempt budget.
        #[test]
        fn backoff_is_monotonic_and_bounded(
            initial_ms in 1u64..5_000,
            attempts in 1usize..24,
        ) {
            let config = BackoffConfig {
                initial_delay: Duration::from_millis(initial_ms),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts: 0,
            };
            let mut policy = ReconnectPolicy::new(config);

            let mut previous = Duration::ZERO;
            for _ in 0..attempts {
                let delay = policy.next_delay().unwrap();
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_secs(30));
                previous = delay;
            }
        }
    }
}
