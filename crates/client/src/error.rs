//! Error taxonomy for resilient upstream calls.
//!
//! The split that matters is retryable versus terminal: a network blip
//! or 5xx might succeed on a fresh attempt, while a 4xx, a malformed
//! envelope, or an explicit cancellation definitely will not. The retry
//! loop consults [`ClientError::is_retryable`] after every attempt.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the resilient HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The circuit breaker vetoed the call before any attempt was made.
    #[error("circuit breaker is open, request rejected")]
    CircuitOpen,

    /// The upstream returned a status of 400 or above; the body is
    /// preserved for diagnostics regardless of whether it was an envelope.
    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// The response body was not a valid `{success, data, error}` envelope.
    #[error("failed to decode response envelope")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be serialized to JSON.
    #[error("failed to encode request body")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    /// Network-level failure: connect error, per-attempt timeout, broken
    /// transport.
    #[error("transport error")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// The caller cancelled while the client was backing off between
    /// attempts. Cancellation is the caller's decision, not the
    /// upstream's fault.
    #[error("request cancelled by caller")]
    Cancelled,

    /// Final outcome of a logical call: the last underlying cause plus
    /// the total number of attempts consumed.
    #[error("request failed after {attempts} attempt(s)")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    /// The client itself was misconfigured (bad base URL, invalid path).
    #[error("invalid client configuration: {message}")]
    Config { message: String },
}

impl ClientError {
    /// Whether re-attempting the same call could plausibly succeed.
    ///
    /// Transport failures and 5xx responses are transient; everything
    /// else (4xx, malformed envelopes, cancellation, the breaker's veto)
    /// is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// The innermost cause, unwrapping the [`Self::RequestFailed`] layer.
    pub fn last_cause(&self) -> &ClientError {
        match self {
            Self::RequestFailed { source, .. } => source.last_cause(),
            other => other,
        }
    }

    /// Total attempts consumed, when the error carries that information.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RequestFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
