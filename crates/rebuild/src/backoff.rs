// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::constants::{DEFAULT_FACTOR, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_USE_JITTER};
use crate::rnd::Rnd;

/// A recovery policy was rejected at construction time.
///
/// Returned by [`Backoff::new`] and by the policy constructors of
/// [`ErrorRecovery`][crate::recovery::ErrorRecovery]. A policy that fails
/// validation never reaches the retry logic.
#[ohno::error]
#[display("invalid recovery policy: {reason}")]
pub struct ConfigError {
    reason: String,
}

/// Exponential backoff schedule for build retries.
///
/// The delay for attempt `n` (0-based) is `min * factor^n`, clamped to `max`. The first
/// retry therefore waits exactly `min`, and no delay ever exceeds `max`.
///
/// [`delay`][Self::delay] is a pure function of the attempt index and the configuration.
/// With jitter enabled, [`delay_for`][Self::delay_for] draws each delay uniformly between
/// `min` and that un-jittered delay, so it still never leaves `[min, max]`. The draw is keyed
/// by a caller-provided seed: the same seed always yields the same delay.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rebuild::Backoff;
///
/// let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(60), 2.0)?;
///
/// assert_eq!(backoff.delay(0), Duration::from_secs(5));
/// assert_eq!(backoff.delay(1), Duration::from_secs(10));
/// assert_eq!(backoff.delay(2), Duration::from_secs(20));
/// assert_eq!(backoff.delay(4), Duration::from_secs(60));
/// # Ok::<(), rebuild::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
    rnd: Rnd,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
            factor: DEFAULT_FACTOR,
            jitter: DEFAULT_USE_JITTER,
            rnd: Rnd::default(),
        }
    }
}

impl Backoff {
    /// Creates a backoff schedule with jitter disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `min` is zero, when `factor` is not a finite
    /// number greater than `1.0`, or when `max` is smaller than `min`.
    pub fn new(min: Duration, max: Duration, factor: f64) -> Result<Self, ConfigError> {
        if min.is_zero() {
            return Err(ConfigError::new("minimum delay must be positive".to_owned()));
        }

        if !factor.is_finite() || factor <= 1.0 {
            return Err(ConfigError::new(format!("growth factor must be greater than 1, got {factor}")));
        }

        if max < min {
            return Err(ConfigError::new(format!(
                "maximum delay {max:?} is smaller than minimum delay {min:?}"
            )));
        }

        Ok(Self {
            min,
            max,
            factor,
            jitter: false,
            rnd: Rnd::default(),
        })
    }

    /// Enables or disables randomized spread of the delays.
    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// The delay before the first retry.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// The upper bound of every delay.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// The multiplicative growth per attempt.
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Whether delays are randomized.
    #[must_use]
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Returns the un-jittered delay that must elapse before attempt `attempt` (0-based) may start.
    ///
    /// This is also the upper bound of any jittered delay for the same attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.exponential(attempt)
    }

    /// Returns the delay before attempt `attempt`, jittered by the sample belonging to `seed`.
    ///
    /// Without jitter this equals [`delay`][Self::delay] and `seed` is ignored.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, seed: u64) -> Duration {
        let delay = self.exponential(attempt);

        if !self.jitter {
            return delay;
        }

        let spread = delay.saturating_sub(self.min);
        let offset = Duration::try_from_secs_f64(spread.as_secs_f64() * self.rnd.sample(seed)).unwrap_or(spread);

        self.min.saturating_add(offset).min(self.max)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.min;
        }

        let growth = self.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // overflow and non-finite products saturate at the cap
        Duration::try_from_secs_f64(self.min.as_secs_f64() * growth).map_or(self.max, |delay| delay.clamp(self.min, self.max))
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    #[test]
    fn default_matches_recovery_policy() {
        let backoff = Backoff::default();

        assert_eq!(backoff.min(), secs(5));
        assert_eq!(backoff.max(), secs(60));
        assert!((backoff.factor() - 2.0).abs() < f64::EPSILON);
        assert!(!backoff.jitter());
    }

    #[test]
    fn default_schedule() {
        let backoff = Backoff::default();
        let delays: Vec<_> = (0..7).map(|attempt| backoff.delay(attempt)).collect();

        assert_eq!(delays, vec![secs(5), secs(10), secs(20), secs(40), secs(60), secs(60), secs(60)]);
    }

    #[test]
    fn first_delay_is_min_for_fractional_durations() {
        let backoff = Backoff::new(Duration::from_millis(100), secs(1), 1.5).unwrap();
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
    }

    #[rstest]
    #[case(Duration::ZERO, secs(60), 2.0)]
    #[case(secs(5), secs(60), 1.0)]
    #[case(secs(5), secs(60), 0.5)]
    #[case(secs(5), secs(60), f64::NAN)]
    #[case(secs(5), secs(60), f64::INFINITY)]
    #[case(secs(5), secs(4), 2.0)]
    fn invalid_configuration_rejected(#[case] min: Duration, #[case] max: Duration, #[case] factor: f64) {
        let error = Backoff::new(min, max, factor).unwrap_err();
        assert!(error.to_string().starts_with("invalid recovery policy"), "unexpected message: {error}");
    }

    #[test]
    fn min_equal_to_max_is_constant() {
        let backoff = Backoff::new(secs(3), secs(3), 2.0).unwrap();
        assert!((0..10).all(|attempt| backoff.delay(attempt) == secs(3)));
    }

    #[test]
    fn huge_attempt_saturates_at_max() {
        let backoff = Backoff::new(secs(86_400), secs(172_800), 2.0).unwrap();

        assert_eq!(backoff.delay(1_000), secs(172_800));
        assert_eq!(backoff.delay(u32::MAX), secs(172_800));
    }

    #[rstest]
    #[case(Duration::from_millis(1), secs(1), 1.1)]
    #[case(secs(5), secs(60), 2.0)]
    #[case(secs(1), secs(3_600), 3.7)]
    #[case(Duration::from_millis(250), Duration::from_millis(250), 10.0)]
    fn schedule_is_bounded_and_non_decreasing(#[case] min: Duration, #[case] max: Duration, #[case] factor: f64) {
        let backoff = Backoff::new(min, max, factor).unwrap();

        assert_eq!(backoff.delay(0), min);

        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = backoff.delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= max, "attempt {attempt}: {delay:?} > {max:?}");
            assert!(delay > Duration::ZERO);
            previous = delay;
        }
    }

    #[test]
    fn without_jitter_delays_are_deterministic() {
        let first = Backoff::default();
        let second = Backoff::default();

        for attempt in 0..10 {
            assert_eq!(first.delay(attempt), second.delay(attempt));
            assert_eq!(first.delay(attempt), first.delay(attempt));
        }
    }

    #[rstest]
    #[case(0.0, secs(5))]
    #[case(0.5, Duration::from_millis(12_500))]
    #[case(1.0, secs(20))]
    fn jitter_spreads_between_min_and_delay(#[case] sample: f64, #[case] expected: Duration) {
        let backoff = Backoff::default().with_jitter(true).with_rnd(Rnd::Fixed(sample));

        // attempt 2 is 20s without jitter
        assert_eq!(backoff.delay_for(2, 0), expected);
        assert_eq!(backoff.delay(2), secs(20));
    }

    #[test]
    fn jitter_never_leaves_bounds() {
        let backoff = Backoff::default().with_jitter(true);

        for attempt in 0..50 {
            for seed in 0..20 {
                let delay = backoff.delay_for(attempt, seed);
                assert!(delay >= backoff.min());
                assert!(delay <= backoff.delay(attempt));
            }
        }
    }

    #[test]
    fn jitter_is_stable_per_seed() {
        let backoff = Backoff::default().with_jitter(true);

        for seed in 0..20 {
            assert_eq!(backoff.delay_for(3, seed), backoff.delay_for(3, seed));
        }

        let spread: std::collections::HashSet<_> = (0..20).map(|seed| backoff.delay_for(3, seed)).collect();
        assert!(spread.len() > 1, "jitter produced a single delay: {spread:?}");
    }

    #[test]
    fn seed_is_ignored_without_jitter() {
        let backoff = Backoff::default();
        assert!((0..20).all(|seed| backoff.delay_for(3, seed) == secs(40)));
    }

    #[test]
    fn first_delay_with_jitter_is_min() {
        let backoff = Backoff::default().with_jitter(true).with_rnd(Rnd::Fixed(0.9));
        assert_eq!(backoff.delay_for(0, 0), secs(5));
    }

    #[test]
    fn jitter_flag_round_trips() {
        let backoff = Backoff::default().with_jitter(true);
        assert!(backoff.jitter());
        assert!(!backoff.with_jitter(false).jitter());
    }
}
