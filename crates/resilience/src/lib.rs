//! Resilience primitives for calling remote module services.
//!
//! When a module of the monolith is deployed separately from a service it
//! depends on, calls that used to be in-process become HTTP calls that can
//! fail in ways in-process calls cannot. This crate provides the two
//! transport-agnostic building blocks the HTTP client layers on top of:
//!
//! - **Circuit breaker**: tracks upstream health across calls and vetoes
//!   attempts while the upstream is known-bad, then cautiously probes
//!   recovery.
//! - **Retry policy**: computes exponential backoff with optional jitter
//!   between attempts of a single logical call.
//!
//! Both are pure state/math with no I/O of their own; the clock is
//! abstracted behind [`Clock`] so timeout behavior is testable without
//! real delays.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;

pub use backoff::{RetryPolicy, RetryPolicyBuilder};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerSnapshot,
    CircuitOpen, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};

use thiserror::Error;

/// Configuration validation error shared by the breaker and retry policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type for configuration construction.
pub type ConfigResult<T> = Result<T, ConfigError>;
