//! # Interlink HTTP client
//!
//! Resilient HTTP client for inter-module calls. When a module of the
//! monolith (say, budget) is deployed separately from a service it
//! depends on (say, auth), what used to be an in-process call becomes an
//! HTTP round-trip to that service's base URL. This crate wraps that
//! round-trip with:
//!
//! - a circuit breaker per upstream, vetoing calls while the upstream is
//!   known-bad,
//! - bounded retries with exponential backoff and jitter,
//! - error classification (retryable transport/5xx failures versus
//!   terminal 4xx, decode, and cancellation errors),
//! - decoding of the `{success, data, error}` envelope every upstream
//!   endpoint returns.
//!
//! Callers depend only on [`Client::get`] / [`Client::post`] /
//! [`Client::put`] / [`Client::delete`]; breaker and retry mechanics are
//! internal. One [`Client`] is created per upstream dependency and
//! reused across calls, never per request.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;

pub use client::Client;
pub use config::ClientBuilder;
pub use envelope::Envelope;
pub use error::ClientError;

// Re-export the resilience primitives callers configure the client with.
pub use interlink_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy,
};
