//! Backoff strategies: pure functions from attempt number to delay.

use rand::Rng;
use std::time::Duration;

/// Maps a 1-indexed attempt number to the delay before the next attempt.
///
/// Implementations must be pure apart from jitter randomness.
pub trait Backoff: Send + Sync {
    /// Delay to wait after the given attempt has failed. `attempt` is
    /// 1-indexed; values below 1 are treated as 1.
    fn for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff: `clamp(min_delay * factor^(attempt - 1), min_delay,
/// max_delay)`, optionally jittered.
///
/// With jitter coefficient `j`, a uniform offset in `[-j*delay, +j*delay]`
/// is added and the result is clamped to `[0, max_delay]`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: Option<f64>,
}

impl ExponentialBackoff {
    /// Creates a backoff doubling from `min_delay` up to `max_delay`.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            factor: 2.0,
            jitter: None,
        }
    }

    /// Sets the growth factor (default 2.0).
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Sets the jitter coefficient.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is outside `[0, 1]`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be in range [0, 1]"
        );
        self.jitter = Some(jitter);
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn for_attempt(&self, attempt: u32) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt.max(1) - 1;
        let mut delay = (min * self.factor.powi(exponent as i32)).clamp(min, max);

        if let Some(jitter) = self.jitter {
            let offset = delay * jitter;
            delay += rand::rng().random_range(-offset..=offset);
            delay = delay.clamp(0.0, max);
        }

        Duration::from_secs_f64(delay)
    }
}

/// Constant delay between attempts: the `factor = 1` degenerate case of
/// [`ExponentialBackoff`].
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedDelay {
    fn for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_clamps_to_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(backoff.for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.for_attempt(4), Duration::from_millis(500));
        assert_eq!(backoff.for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn deterministic_and_non_decreasing_without_jitter() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(5))
            .factor(3.0);
        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let delay = backoff.for_attempt(attempt);
            assert_eq!(delay, backoff.for_attempt(attempt));
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(5));
            previous = delay;
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
            .jitter(0.5);
        for _ in 0..100 {
            let delay = backoff.for_attempt(2); // base 200ms, jittered ±100ms
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    #[should_panic(expected = "jitter")]
    fn rejects_out_of_range_jitter() {
        let _ = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_secs(1))
            .jitter(1.5);
    }

    #[test]
    fn fixed_delay_is_constant() {
        let backoff = FixedDelay::new(Duration::from_millis(250));
        assert_eq!(backoff.for_attempt(1), Duration::from_millis(250));
        assert_eq!(backoff.for_attempt(9), Duration::from_millis(250));
    }

    #[test]
    fn attempt_zero_behaves_like_the_first() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.for_attempt(0), backoff.for_attempt(1));
    }
}
