//! Exponential backoff with jitter for the retry loop.
//!
//! The policy is a pure value: given an attempt number it computes the
//! delay to sleep before that retry. Attempt numbers are 1-indexed:
//! `delay(1)` is the sleep before the first retry; there is never a
//! delay before the first attempt. The jittered path takes the RNG as a
//! parameter so tests can pin it down.

use std::time::Duration;

use rand::Rng;

use crate::{ConfigError, ConfigResult};

/// Retry policy configuration: bounded attempts with exponential backoff.
///
/// `backoff(n) = min(initial_backoff * multiplier^(n-1), max_backoff)`,
/// plus a uniformly random extra in `[0, 0.25 * backoff]` when jitter is
/// enabled. Jitter desynchronizes retry storms across client instances
/// hammering the same recovering upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (`max_retries + 1` total attempts).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor per retry; `1.0` degenerates to constant backoff.
    pub multiplier: f64,
    /// Whether to add random jitter on top of the computed delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy builder.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::Invalid {
                message: "initial_backoff must be greater than 0".to_string(),
            });
        }

        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Invalid {
                message: "max_backoff must be at least initial_backoff".to_string(),
            });
        }

        if self.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                message: "multiplier must be at least 1.0".to_string(),
            });
        }

        Ok(())
    }

    /// The deterministic (jitter-free) delay before retry `attempt`.
    ///
    /// `attempt <= 0` cannot underflow: attempt 0 is treated as attempt 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = self.initial_backoff.as_secs_f64() * self.multiplier.powi((attempt - 1) as i32);
        // An overflowing power collapses onto the cap here.
        let capped = raw.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// The delay before retry `attempt`, jittered with the supplied RNG.
    ///
    /// With jitter enabled the result lies in `[base, 1.25 * base]` where
    /// `base` is [`Self::base_delay`]. Deterministic given a fixed RNG.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        base.mul_f64(1.0 + rng.gen_range(0.0..=0.25))
    }

    /// The delay before retry `attempt`, jittered with the thread RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.policy.max_retries = retries;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.policy.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.policy.max_backoff = backoff;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.policy.jitter = enabled;
        self
    }

    pub fn build(self) -> ConfigResult<RetryPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}
