//! Circuit breaker protecting a struggling upstream from pile-on load.
//!
//! One breaker instance exists per upstream target and lives as long as
//! the owning client. It answers a single question ("may I attempt a
//! call right now?") and absorbs success/failure feedback:
//!
//! ```text
//! Closed   --[consecutive failures >= threshold]--> Open
//! Open     --[cooldown elapsed, admitted call succeeds]--> HalfOpen
//! Open     --[cooldown elapsed, admitted call fails]--> Open (cooldown restarts)
//! HalfOpen --[probe successes >= target]--> Closed
//! HalfOpen --[any failure]--> Open
//! ```
//!
//! The breaker never retries anything itself; it only vetoes attempts,
//! and a veto surfaces as [`CircuitOpen`] so callers can tell "upstream
//! is known-bad" apart from "this call failed".
//!
//! State lives behind one `RwLock`: the admission check takes the read
//! lock, outcome recording takes the write lock, and no lock is ever
//! held across I/O. Under concurrent calls the breaker may open slightly
//! earlier or later than a single-threaded trace would predict; that
//! race is accepted and documented, not a bug.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::{ConfigError, ConfigResult};

/// Admission veto: the circuit is open and the cooldown has not elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open, rejecting calls")]
pub struct CircuitOpen;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests.
    Closed,
    /// Circuit is open, rejecting requests until the cooldown elapses.
    Open,
    /// Circuit is half-open, counting probe successes toward closing.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub max_consecutive_failures: u32,
    /// How long the circuit stays open before admitting a probe.
    pub open_timeout: Duration,
    /// Consecutive successes required in half-open to close the circuit.
    pub half_open_probe_target: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            open_timeout: Duration::from_secs(30),
            half_open_probe_target: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid {
                message: "max_consecutive_failures must be greater than 0".to_string(),
            });
        }

        if self.half_open_probe_target == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_probe_target must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn max_consecutive_failures(mut self, threshold: u32) -> Self {
        self.config.max_consecutive_failures = threshold;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn half_open_probe_target(mut self, target: u32) -> Self {
        self.config.half_open_probe_target = target;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of the breaker's internal counters, for observability.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub last_failure_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// Meaningful only once a failure has been recorded.
    last_failure_at: Option<Instant>,
    half_open_successes: u32,
}

impl BreakerInner {
    fn pristine() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            half_open_successes: 0,
        }
    }
}

/// Concurrency-safe circuit breaker state machine.
///
/// Clones share the same underlying state, so a breaker can be handed to
/// several client handles for the same upstream.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<BreakerInner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &snapshot.state)
            .field("consecutive_failures", &snapshot.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using the
    /// system clock.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            inner: Arc::new(RwLock::new(BreakerInner::pristine())),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing).
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            inner: Arc::new(RwLock::new(BreakerInner::pristine())),
            clock: Arc::new(clock),
        })
    }

    /// Admission decision: may a call be attempted right now?
    ///
    /// Closed always permits. Open permits once the cooldown since the
    /// last failure has elapsed; the state itself does not change here,
    /// and the transition toward half-open happens when the admitted
    /// call's outcome is recorded. Half-open permits, relying on the caller
    /// issuing one logical call at a time rather than a flood of
    /// parallel probes.
    pub fn can_attempt(&self) -> Result<(), CircuitOpen> {
        let inner = self.read_inner();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => match inner.last_failure_at {
                Some(at) if self.clock.now().duration_since(at) > self.config.open_timeout => {
                    Ok(())
                }
                _ => Err(CircuitOpen),
            },
        }
    }

    /// Record a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = self.write_inner();

        match inner.state {
            // A single success fully forgives prior failures while closed.
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_probe_target {
                    self.close(&mut inner);
                }
            }
            // A post-cooldown probe succeeded: start counting toward closing.
            CircuitState::Open => {
                inner.half_open_successes = 1;
                if inner.half_open_successes >= self.config.half_open_probe_target {
                    self.close(&mut inner);
                } else {
                    inner.state = CircuitState::HalfOpen;
                    info!("circuit breaker half-open, probing upstream recovery");
                }
            }
        }
    }

    /// Record a failed call outcome.
    pub fn record_failure(&self) {
        let mut inner = self.write_inner();

        inner.consecutive_failures += 1;
        // While already open this restarts the cooldown.
        inner.last_failure_at = Some(self.clock.now());

        match inner.state {
            CircuitState::HalfOpen => {
                // A single failure during probing re-opens immediately.
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                warn!("circuit breaker re-opened: probe request failed");
            }
            CircuitState::Closed
                if inner.consecutive_failures >= self.config.max_consecutive_failures =>
            {
                inner.state = CircuitState::Open;
                warn!(
                    failures = inner.consecutive_failures,
                    "circuit breaker opened after consecutive failures"
                );
            }
            _ => {}
        }
    }

    /// Get the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        self.read_inner().state
    }

    /// Get a snapshot of the breaker's counters for observability.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.read_inner();
        CircuitBreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            last_failure_at: inner.last_failure_at,
        }
    }

    /// Reset the breaker to its pristine closed state.
    pub fn reset(&self) {
        *self.write_inner() = BreakerInner::pristine();
        info!("circuit breaker manually reset to closed state");
    }

    fn close(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        info!("circuit breaker closed after successful probes");
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, BreakerInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("circuit breaker state lock poisoned during read");
                poisoned.into_inner()
            }
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, BreakerInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("circuit breaker state lock poisoned during write");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for circuit breaker state transitions.
    //!
    //! Timeout behavior runs against `MockClock` so no test has to sleep.

    use super::*;
    use crate::clock::MockClock;

    fn breaker_with_clock(
        failures: u32,
        timeout: Duration,
        probe_target: u32,
    ) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .max_consecutive_failures(failures)
            .open_timeout(timeout)
            .half_open_probe_target(probe_target)
            .build()
            .unwrap();
        let cb = CircuitBreaker::with_clock(config, clock.clone()).unwrap();
        (cb, clock)
    }

    #[test]
    fn config_default_matches_documented_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.open_timeout, Duration::from_secs(30));
        assert_eq!(config.half_open_probe_target, 3);
    }

    #[test]
    fn config_validation_rejects_zero_thresholds() {
        let mut config = CircuitBreakerConfig::default();
        assert!(config.validate().is_ok());

        config.max_consecutive_failures = 0;
        assert!(config.validate().is_err());

        config.max_consecutive_failures = 5;
        config.half_open_probe_target = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_rejects_invalid_config() {
        assert!(CircuitBreakerConfig::builder().max_consecutive_failures(0).build().is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn starts_closed_and_permits() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_attempt().is_ok());
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let (cb, _clock) = breaker_with_clock(3, Duration::from_secs(30), 1);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed, "should remain closed below threshold");
        assert!(cb.can_attempt().is_ok());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open, "should open at threshold");
        assert_eq!(cb.can_attempt(), Err(CircuitOpen));
    }

    #[test]
    fn success_while_closed_forgives_prior_failures() {
        let (cb, _clock) = breaker_with_clock(3, Duration::from_secs(30), 1);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        // The threshold starts over from scratch.
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn repeated_success_while_closed_is_idempotent() {
        let cb = CircuitBreaker::default();

        cb.record_success();
        cb.record_success();
        cb.record_success();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn vetoes_until_open_timeout_elapses() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(30), 1);

        cb.record_failure();
        assert_eq!(cb.can_attempt(), Err(CircuitOpen));

        clock.advance(Duration::from_secs(29));
        assert_eq!(cb.can_attempt(), Err(CircuitOpen), "still within cooldown");

        clock.advance(Duration::from_secs(2));
        assert!(cb.can_attempt().is_ok(), "cooldown elapsed, probe admitted");
        // The transition happens on the recorded outcome, not on admission.
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn admitted_probe_success_moves_to_half_open() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(10), 3);

        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        assert!(cb.can_attempt().is_ok());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().half_open_successes, 1);
    }

    #[test]
    fn probe_target_successes_close_the_circuit() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(10), 3);

        cb.record_failure();
        clock.advance(Duration::from_secs(11));

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_attempt().is_ok());
        assert_eq!(cb.snapshot().half_open_successes, 0);
    }

    #[test]
    fn closing_requires_fresh_full_threshold_to_reopen() {
        let (cb, clock) = breaker_with_clock(2, Duration::from_secs(10), 1);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(11));
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        // One failure is not enough after recovery.
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn failure_during_probing_reopens_immediately() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(10), 3);

        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().half_open_successes, 0);
        assert_eq!(cb.can_attempt(), Err(CircuitOpen), "fresh cooldown started");
    }

    #[test]
    fn failure_while_open_restarts_cooldown() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(10), 1);

        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        assert!(cb.can_attempt().is_ok());

        // The admitted probe failed: stays open, cooldown restarts.
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.can_attempt(), Err(CircuitOpen));

        clock.advance(Duration::from_secs(11));
        assert!(cb.can_attempt().is_ok());
    }

    #[test]
    fn probe_target_of_one_closes_straight_from_open() {
        let (cb, clock) = breaker_with_clock(1, Duration::from_secs(10), 1);

        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn reset_returns_to_pristine_closed() {
        let (cb, _clock) = breaker_with_clock(1, Duration::from_secs(10), 1);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_failure_at.is_none());
    }

    #[test]
    fn clones_share_state() {
        let cb1 = CircuitBreaker::default();
        cb1.record_failure();

        let cb2 = cb1.clone();
        assert_eq!(cb2.snapshot().consecutive_failures, 1);
        assert_eq!(cb2.state(), cb1.state());
    }

    #[tokio::test]
    async fn concurrent_recording_is_safe() {
        let cb = CircuitBreaker::default();
        let mut handles = vec![];

        for _ in 0..10 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                assert!(cb.can_attempt().is_ok());
                cb.record_success();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        // Successes while closed never change state or counters.
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
