//! Questrade-specific error types.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Message carried by [`ApiError::invalid_refresh_token`].
pub const INVALID_REFRESH_TOKEN_MSG: &str = "refresh token is invalid";

/// Non-success HTTP response from the authorization or data API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable description of what failed.
    pub message: String,
    /// HTTP status code returned by the server.
    pub status: u16,
    /// Raw response body text.
    pub body: String,
}

impl ApiError {
    /// The token endpoint rejected the refresh token itself (HTTP 400).
    #[must_use]
    pub fn invalid_refresh_token(body: String) -> Self {
        Self {
            message: INVALID_REFRESH_TOKEN_MSG.to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            body,
        }
    }

    /// The token endpoint failed for any reason other than a bad credential.
    #[must_use]
    pub fn refresh_failed(status: StatusCode, body: String) -> Self {
        Self {
            message: format!("failed to refresh access token: {body}"),
            status: status.as_u16(),
            body,
        }
    }

    /// A data endpoint returned a non-success status.
    #[must_use]
    pub fn request_failed(method: &Method, url: &str, status: StatusCode, body: String) -> Self {
        Self {
            message: format!("{method} {url} failed with status {}", status.as_u16()),
            status: status.as_u16(),
            body,
        }
    }

    /// Whether the failure means the refresh token must be re-provisioned.
    #[must_use]
    pub fn is_invalid_refresh_token(&self) -> bool {
        self.status == StatusCode::BAD_REQUEST.as_u16()
            && self.message == INVALID_REFRESH_TOKEN_MSG
    }
}

/// Errors from the Questrade client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server answered with a non-success status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transport-level failure (DNS, connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("JSON parsing error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Endpoint path could not be joined onto the API server, or an account
    /// number was malformed. Raised locally; no request was sent.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// The API error carried by this failure, if any.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}
