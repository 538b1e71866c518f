//! Client construction and configuration surface.

use std::time::Duration;

use interlink_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use url::Url;

use crate::client::Client;
use crate::error::ClientError;

/// Builder for [`Client`].
///
/// Defaults: 10s per-attempt timeout, 100 idle connections kept for 90s,
/// retry and circuit breaker at their documented defaults with the
/// breaker enabled. The underlying transport and its connection pool are
/// built once here and shared by all calls through the client.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
    max_idle_conns: usize,
    idle_conn_timeout: Duration,
    retry: RetryPolicy,
    breaker: BreakerSetting,
}

#[derive(Debug)]
enum BreakerSetting {
    Enabled(CircuitBreakerConfig),
    Shared(CircuitBreaker),
    Disabled,
}

impl ClientBuilder {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            max_idle_conns: 100,
            idle_conn_timeout: Duration::from_secs(90),
            retry: RetryPolicy::default(),
            breaker: BreakerSetting::Enabled(CircuitBreakerConfig::default()),
        }
    }

    /// Per-attempt wire timeout. A hung connection is bounded by this
    /// independently of any caller-side deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum idle connections kept in the transport pool.
    pub fn max_idle_conns(mut self, conns: usize) -> Self {
        self.max_idle_conns = conns;
        self
    }

    /// How long idle pooled connections are kept alive.
    pub fn idle_conn_timeout(mut self, timeout: Duration) -> Self {
        self.idle_conn_timeout = timeout;
        self
    }

    /// Replace the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Enable the circuit breaker with the given configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = BreakerSetting::Enabled(config);
        self
    }

    /// Share a pre-built breaker with this client.
    ///
    /// Useful when several client handles for the same upstream must
    /// agree on its health, or when the owner wants to observe the
    /// breaker's state directly.
    pub fn shared_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = BreakerSetting::Shared(breaker);
        self
    }

    /// Run without a circuit breaker; only the retry policy applies.
    pub fn no_circuit_breaker(mut self) -> Self {
        self.breaker = BreakerSetting::Disabled;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<Client, ClientError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|err| ClientError::Config { message: format!("invalid base URL: {err}") })?;

        self.retry
            .validate()
            .map_err(|err| ClientError::Config { message: err.to_string() })?;

        let breaker = match self.breaker {
            BreakerSetting::Enabled(config) => Some(
                CircuitBreaker::new(config)
                    .map_err(|err| ClientError::Config { message: err.to_string() })?,
            ),
            BreakerSetting::Shared(breaker) => Some(breaker),
            BreakerSetting::Disabled => None,
        };

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_idle_conns)
            .pool_idle_timeout(self.idle_conn_timeout)
            .build()
            .map_err(|source| ClientError::Transport { source })?;

        Ok(Client::from_parts(http, base_url, self.retry, breaker))
    }
}
