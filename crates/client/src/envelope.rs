//! The uniform response envelope every upstream endpoint returns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// The `{success, data, error}` wrapper of upstream JSON responses.
///
/// The client decodes the envelope but does not interpret it: a response
/// with `success == false` and a 2xx status is still a successful call
/// from the transport's point of view, and it is the caller's business
/// to inspect the flag and the error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the upstream handler reported success.
    pub success: bool,
    /// Handler payload, opaque to the client.
    #[serde(default)]
    pub data: Value,
    /// Upstream error message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Deserialize the `data` payload into a caller-side type.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_value(self.data.clone()).map_err(|source| ClientError::Decode { source })
    }
}
