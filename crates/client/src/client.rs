//! The resilient client: breaker admission, bounded attempts, backoff,
//! and outcome classification around one logical HTTP call.

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use interlink_resilience::{CircuitBreaker, CircuitState, RetryPolicy};

use crate::config::ClientBuilder;
use crate::envelope::Envelope;
use crate::error::ClientError;

/// HTTP client for one upstream service, safe for concurrent use.
///
/// Each logical call is independent except for the shared circuit
/// breaker; clones share the transport pool and the breaker. The breaker
/// is mutated exactly once per logical call, on the final outcome rather
/// than per attempt, and no lock is ever held across network I/O.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    breaker: Option<CircuitBreaker>,
}

impl Client {
    /// Start building a client for the given upstream base URL.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub(crate) fn from_parts(
        http: reqwest::Client,
        base_url: Url,
        retry: RetryPolicy,
        breaker: Option<CircuitBreaker>,
    ) -> Self {
        Self { http, base_url, retry, breaker }
    }

    /// The upstream base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current circuit state for observability, `None` when the breaker
    /// is disabled.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Issue a GET request against `path`.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Envelope, ClientError> {
        self.do_request(cancel, Method::GET, path, None).await
    }

    /// Issue a POST request with a JSON body against `path`.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &B,
    ) -> Result<Envelope, ClientError> {
        let payload = encode_body(body)?;
        self.do_request(cancel, Method::POST, path, Some(payload)).await
    }

    /// Issue a PUT request with a JSON body against `path`.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &B,
    ) -> Result<Envelope, ClientError> {
        let payload = encode_body(body)?;
        self.do_request(cancel, Method::PUT, path, Some(payload)).await
    }

    /// Issue a DELETE request against `path`.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Envelope, ClientError> {
        self.do_request(cancel, Method::DELETE, path, None).await
    }

    /// Execute one logical call with bounded attempts.
    ///
    /// Attempts are strictly sequential: at most `max_retries + 1`, each
    /// preceded (after the first) by a backoff sleep that races the
    /// caller's cancellation token. The breaker's veto short-circuits
    /// before any attempt; its outcome recording happens once, at the
    /// end.
    async fn do_request(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Envelope, ClientError> {
        if let Some(breaker) = &self.breaker {
            breaker.can_attempt().map_err(|_| ClientError::CircuitOpen)?;
        }

        let url = self.base_url.join(path).map_err(|err| ClientError::Config {
            message: format!("invalid request path {path:?}: {err}"),
        })?;

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self.retry.delay(attempt);
                debug!(%method, %url, attempt, ?delay, "backing off before retry");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        // The caller gave up; not the upstream's fault, so
                        // no breaker failure is recorded.
                        debug!(%method, %url, "caller cancelled during backoff");
                        return Err(ClientError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            debug!(%method, %url, attempt = attempt + 1, "sending request");
            match self.attempt(method.clone(), &url, body.as_deref()).await {
                Ok(envelope) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    debug!(%method, %url, attempts = attempt + 1, "request succeeded");
                    return Ok(envelope);
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    if !err.is_retryable() || attempt >= self.retry.max_retries {
                        if let Some(breaker) = &self.breaker {
                            breaker.record_failure();
                        }
                        warn!(%method, %url, attempts, error = %err, "request failed");
                        return Err(ClientError::RequestFailed {
                            attempts,
                            source: Box::new(err),
                        });
                    }
                    debug!(%method, %url, attempt = attempts, error = %err, "attempt failed, retrying");
                    attempt += 1;
                }
            }
        }
    }

    /// One wire exchange: send, read the full body, classify.
    async fn attempt(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<Envelope, ClientError> {
        let mut request = self.http.request(method, url.clone());
        if let Some(bytes) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(bytes.to_vec());
        }

        // A cancellation or timeout that fires mid-exchange surfaces as a
        // transport error and is retried like any transient failure.
        let response =
            request.send().await.map_err(|source| ClientError::Transport { source })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| ClientError::Transport { source })?;

        if status.as_u16() >= 400 {
            return Err(ClientError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|source| ClientError::Decode { source })
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, ClientError> {
    serde_json::to_vec(body).map_err(|source| ClientError::Encode { source })
}
