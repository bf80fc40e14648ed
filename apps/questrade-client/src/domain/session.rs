//! Token Session
//!
//! The mutable credential record owned by a client: the rotating refresh
//! token, the current access token with its expiry, and the API server the
//! access token is valid for.
//!
//! # Invariants
//!
//! - `access_token` and `expiration_time` change together, never apart.
//! - `refresh_token` is single-use: every successful refresh replaces it.
//! - A session is only mutated by [`TokenSession::apply_grant`], which swaps
//!   all four fields at once.

use serde::Deserialize;

/// API server used until the first refresh names an authoritative one.
pub const DEFAULT_API_SERVER: &str = "https://api01.iq.questrade.com";

/// Expiration sentinel meaning no access token is held.
pub const NO_EXPIRATION: i64 = -1;

/// Seconds before expiry at which an access token is treated as stale.
pub const REFRESH_MARGIN_SECS: i64 = 20;

/// Body of a successful `POST /oauth2/token` refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    /// Short-lived bearer token for data requests.
    pub access_token: String,
    /// Replacement refresh token; the previous one is now void.
    pub refresh_token: String,
    /// Base URL that data requests must be sent to.
    pub api_server: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Token type (always `Bearer`).
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Credential state for one client instance.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSession {
    refresh_token: String,
    access_token: Option<String>,
    expiration_time: i64,
    api_server: String,
}

impl TokenSession {
    /// Seed a session from a caller-supplied refresh token.
    #[must_use]
    pub fn new(refresh_token: impl Into<String>, api_server: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: None,
            expiration_time: NO_EXPIRATION,
            api_server: api_server.into(),
        }
    }

    /// Whether a new access token must be fetched before the next request.
    ///
    /// True when no access token is held, or when `now_secs` has reached the
    /// expiry minus [`REFRESH_MARGIN_SECS`].
    #[must_use]
    pub fn needs_refresh(&self, now_secs: i64) -> bool {
        self.access_token.is_none()
            || now_secs >= self.expiration_time.saturating_sub(REFRESH_MARGIN_SECS)
    }

    /// Replace every credential field with the contents of `grant`.
    pub fn apply_grant(&mut self, grant: TokenGrant, now_secs: i64) {
        self.access_token = Some(grant.access_token);
        self.refresh_token = grant.refresh_token;
        self.api_server = grant.api_server;
        self.expiration_time = now_secs.saturating_add(grant.expires_in);
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Current access token, if one has been fetched.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Access token expiry in Unix seconds, or [`NO_EXPIRATION`].
    #[must_use]
    pub const fn expiration_time(&self) -> i64 {
        self.expiration_time
    }

    /// Current API server base URL.
    #[must_use]
    pub fn api_server(&self) -> &str {
        &self.api_server
    }
}

impl std::fmt::Debug for TokenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSession")
            .field("refresh_token", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiration_time", &self.expiration_time)
            .field("api_server", &self.api_server)
            .finish()
    }
}
