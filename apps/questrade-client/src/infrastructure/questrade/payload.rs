//! Opaque response payload returned by the low-level request helper.

use serde::de::DeserializeOwned;

use super::ClientError;

/// Raw body of a successful data request.
///
/// Decoding into a concrete type happens at each public operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiPayload {
    body: Vec<u8>,
}

impl ApiPayload {
    /// Wrap a response body.
    #[must_use]
    pub const fn new(body: Vec<u8>) -> Self {
        Self { body }
    }

    /// Raw body bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Decode the body as JSON into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the body as untyped JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, ClientError> {
        self.decode()
    }
}
