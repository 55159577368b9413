use std::time::Duration;

use rand::Rng;

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MULTIPLIER: f64 = 1.5;
const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Per-call delay generator driven by the retry loop.
pub trait Backoff: Send {
    /// Delay before the next attempt. Never longer than the configured maximum.
    fn next_delay(&mut self) -> Duration;

    /// Returns the growth state to its starting point.
    fn reset(&mut self);
}

/// Creates a fresh [`Backoff`] for every call; instances are never shared.
pub trait BackoffFactory: Send + Sync {
    fn build(&self, max_interval: Duration) -> Box<dyn Backoff>;
}

/// Randomized exponential growth: each delay is drawn from
/// `interval * [1 - randomization, 1 + randomization]`, then the interval is
/// multiplied until it reaches the maximum.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffPolicy {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl ExponentialBackoffPolicy {
    pub fn new() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
        }
    }

    pub fn initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Clamped to `0.0..=1.0`; NaN falls back to the default factor.
    pub fn randomization_factor(mut self, randomization_factor: f64) -> Self {
        self.randomization_factor = if randomization_factor.is_nan() {
            DEFAULT_RANDOMIZATION_FACTOR
        } else {
            randomization_factor.clamp(0.0, 1.0)
        };
        self
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffFactory for ExponentialBackoffPolicy {
    fn build(&self, max_interval: Duration) -> Box<dyn Backoff> {
        Box::new(ExponentialBackoff::new(self.clone(), max_interval))
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    policy: ExponentialBackoffPolicy,
    max_interval: Duration,
    current_interval: Duration,
}

impl ExponentialBackoff {
    pub fn new(policy: ExponentialBackoffPolicy, max_interval: Duration) -> Self {
        let current_interval = policy.initial_interval.min(max_interval);
        Self {
            policy,
            max_interval,
            current_interval,
        }
    }

    fn randomized(&self, interval: Duration) -> Duration {
        let factor = self.policy.randomization_factor;
        if factor <= f64::EPSILON || interval.is_zero() {
            return interval;
        }
        let interval_secs = interval.as_secs_f64();
        let delta = interval_secs * factor;
        let sampled = rand::rng().random_range((interval_secs - delta)..=(interval_secs + delta));
        Duration::from_secs_f64(sampled.max(0.0))
    }

    fn grow(&mut self) {
        let next = self.current_interval.as_secs_f64() * self.policy.multiplier;
        let max = self.max_interval.as_secs_f64();
        self.current_interval = if next >= max {
            self.max_interval
        } else {
            Duration::from_secs_f64(next)
        };
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.randomized(self.current_interval).min(self.max_interval);
        self.grow();
        delay
    }

    fn reset(&mut self) {
        self.current_interval = self.policy.initial_interval.min(self.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Backoff, BackoffFactory, ExponentialBackoff, ExponentialBackoffPolicy};

    fn deterministic() -> ExponentialBackoffPolicy {
        ExponentialBackoffPolicy::new()
            .initial_interval(Duration::from_millis(100))
            .multiplier(2.0)
            .randomization_factor(0.0)
    }

    #[test]
    fn grows_until_max_interval() {
        let mut backoff = ExponentialBackoff::new(deterministic(), Duration::from_millis(350));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[test]
    fn reset_returns_to_initial_interval() {
        let mut backoff = deterministic().build(Duration::from_secs(30));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jittered_delay_never_exceeds_max_interval() {
        let policy = ExponentialBackoffPolicy::new().randomization_factor(1.0);
        let mut backoff = policy.build(Duration::from_millis(120));
        for _ in 0..256 {
            assert!(backoff.next_delay() <= Duration::from_millis(120));
        }
    }

    #[test]
    fn non_finite_factors_keep_delays_bounded() {
        for factor in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let policy = ExponentialBackoffPolicy::new()
                .initial_interval(Duration::from_millis(10))
                .multiplier(f64::NAN)
                .randomization_factor(factor);
            let mut backoff = policy.build(Duration::from_millis(40));
            for _ in 0..16 {
                assert!(backoff.next_delay() <= Duration::from_millis(40));
            }
        }
    }

    #[test]
    fn initial_interval_is_capped_by_small_max_interval() {
        let mut backoff = deterministic().build(Duration::from_millis(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }
}
