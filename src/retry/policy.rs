use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::humanize::HumanDuration;

pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_MULTIPLIER: f64 = 1.3;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound of the random spread applied when jitter is enabled (±20%)
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("initial_delay ({initial:?}) cannot be greater than max_delay ({max:?})")]
    InitialExceedsMax { initial: Duration, max: Duration },

    #[error("multiplier must be greater than 0, got {0}")]
    InvalidMultiplier(f64),

    #[error("max_attempts must be at least 1")]
    NoAttempts,
}

/// Exponential backoff policy, immutable once built
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_initial_delay")]
    pub initial_delay: HumanDuration,
    #[serde(default = "default_max_delay")]
    pub max_delay: HumanDuration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Spread delays randomly so concurrent sources do not retry in lockstep
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter: false,
        }
    }
}

fn default_initial_delay() -> HumanDuration {
    HumanDuration::from_millis(DEFAULT_INITIAL_DELAY_MS)
}

fn default_max_delay() -> HumanDuration {
    HumanDuration::from_millis(DEFAULT_MAX_DELAY_MS)
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl RetryPolicy {
    /// Build a validated policy
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Result<Self, PolicyError> {
        let policy = Self {
            initial_delay: initial_delay.into(),
            max_delay: max_delay.into(),
            multiplier,
            max_attempts,
            jitter: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.initial_delay > self.max_delay {
            return Err(PolicyError::InitialExceedsMax {
                initial: self.initial_delay.as_duration(),
                max: self.max_delay.as_duration(),
            });
        }
        if !(self.multiplier > 0.0) || !self.multiplier.is_finite() {
            return Err(PolicyError::InvalidMultiplier(self.multiplier));
        }
        if self.max_attempts == 0 {
            return Err(PolicyError::NoAttempts);
        }
        Ok(())
    }

    /// `min(max_delay, initial_delay * multiplier^attempt)`, without jitter
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_duration().as_nanos() as f64;
        let max = self.max_delay.as_duration().as_nanos() as f64;

        let scaled = initial * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        if !scaled.is_finite() || scaled >= max {
            return self.max_delay.as_duration();
        }

        Duration::from_nanos(scaled.round() as u64)
    }

    /// Delay to actually sleep before the next attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.next_delay(attempt);
        if !self.jitter {
            return base;
        }

        let spread = (fastrand::f64() * 2.0 - 1.0) * JITTER_FRACTION;
        let jittered = base.as_nanos() as f64 * (1.0 + spread);
        Duration::from_nanos(jittered.max(0.0).round() as u64).min(self.max_delay.as_duration())
    }

    /// Upper bound on a single remote call
    pub fn attempt_timeout(&self) -> Duration {
        self.max_delay
            .as_duration()
            .saturating_mul(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_delay.as_millis(), 500);
        assert_eq!(policy.max_delay.as_millis(), 60_000);
        assert_eq!(policy.multiplier, 1.3);
        assert_eq!(policy.max_attempts, 5);
        assert!(!policy.jitter);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_next_delay_growth_and_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(0), Duration::from_millis(500));
        assert_eq!(policy.next_delay(1), Duration::from_millis(650));

        // 500ms * 1.3^10 ~= 6.89s
        let tenth = policy.next_delay(10);
        assert!(tenth > Duration::from_millis(6_800));
        assert!(tenth < Duration::from_millis(7_000));

        assert_eq!(policy.next_delay(50), Duration::from_secs(60));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_next_delay_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} shrank the delay");
            assert!(delay <= Duration::from_secs(60));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default().with_jitter(true);
        for attempt in 0..30 {
            let base = policy.next_delay(attempt).as_secs_f64();
            let delay = policy.delay_for(attempt).as_secs_f64();
            assert!(delay >= base * 0.79);
            assert!(delay <= (base * 1.21).min(60.0));
        }
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(1), 2.0, 3),
            Err(PolicyError::InitialExceedsMax {
                initial: Duration::from_secs(2),
                max: Duration::from_secs(1),
            })
        );
        assert_eq!(
            RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0.0, 3),
            Err(PolicyError::InvalidMultiplier(0.0))
        );
        assert_eq!(
            RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, 0),
            Err(PolicyError::NoAttempts)
        );
        assert!(RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, 3).is_ok());
    }

    #[test]
    fn test_attempt_timeout() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(300));
    }
}
