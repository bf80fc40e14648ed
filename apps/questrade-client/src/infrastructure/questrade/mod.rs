//! Questrade REST adapter.
//!
//! Token-managed client for the Questrade API:
//! - Refresh-token exchange against the OAuth2 token endpoint
//! - Rotation of the refresh token and API server on every refresh
//! - Single-flight refresh shared by concurrent callers
//! - Read-only account data calls

mod error;
mod payload;

pub use error::{ApiError, ClientError, INVALID_REFRESH_TOKEN_MSG};
pub use payload::ApiPayload;

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use tokio::sync::{Mutex, broadcast};

use crate::application::ports::{Clock, SystemClock, TokenRefreshed};
use crate::domain::accounts::{AccountsResponse, BalancesResponse};
use crate::domain::session::{TokenGrant, TokenSession};
use crate::infrastructure::config::{ClientConfig, ClientSettings};
use crate::infrastructure::metrics;

/// OAuth2 token endpoint used for refresh-token exchange.
pub const DEFAULT_AUTH_URL: &str = "https://login.questrade.com/oauth2/token";

/// Capacity of the refresh notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Questrade API client with managed access tokens.
///
/// Cheap to share behind an `Arc`. Session state is only mutated by a
/// refresh, and refreshes are serialized through a single gate.
pub struct QuestradeClient {
    /// HTTP client.
    http: Client,
    /// Token exchange endpoint.
    auth_url: String,
    /// Credential state.
    session: RwLock<TokenSession>,
    /// Held for the duration of a refresh exchange.
    refresh_gate: Mutex<()>,
    /// Refresh notifications.
    events: broadcast::Sender<TokenRefreshed>,
    /// Time source for expiry decisions.
    clock: Arc<dyn Clock>,
}

impl QuestradeClient {
    /// Create a client seeded with a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        refresh_token: impl Into<String>,
        settings: ClientSettings,
    ) -> Result<Self, ClientError> {
        Self::with_clock(refresh_token, settings, Arc::new(SystemClock))
    }

    /// Create a client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::new(config.refresh_token.expose(), config.settings.clone())
    }

    /// Create a client with a custom time source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_clock(
        refresh_token: impl Into<String>,
        settings: ClientSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            auth_url: settings.auth_url,
            session: RwLock::new(TokenSession::new(
                refresh_token,
                settings.default_api_server,
            )),
            refresh_gate: Mutex::new(()),
            events,
            clock,
        })
    }

    /// Subscribe to refresh notifications.
    ///
    /// One [`TokenRefreshed`] is delivered per successful refresh that
    /// happens after subscribing.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TokenRefreshed> {
        self.events.subscribe()
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> String {
        self.session.read().refresh_token().to_string()
    }

    /// Current access token, if one has been fetched.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.session.read().access_token().map(str::to_string)
    }

    /// Access token expiry in Unix seconds, or `-1` when none is held.
    #[must_use]
    pub fn access_token_expiration_time(&self) -> i64 {
        self.session.read().expiration_time()
    }

    /// API server data requests are currently sent to.
    #[must_use]
    pub fn api_server(&self) -> String {
        self.session.read().api_server().to_string()
    }

    /// Whether the next data request must refresh the access token first.
    #[must_use]
    pub fn needs_token_refresh(&self) -> bool {
        self.session.read().needs_refresh(self.clock.now_secs())
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// On success the access token, refresh token, API server and expiry are
    /// replaced together and subscribers are notified. On failure the
    /// session is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for a non-success status (HTTP 400 means
    /// the refresh token itself is invalid), [`ClientError::Transport`] for
    /// network failures and [`ClientError::Decode`] for a malformed body.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Perform the exchange. Caller must hold `refresh_gate`.
    #[tracing::instrument(name = "questrade.refresh", skip_all, fields(auth_url = %self.auth_url))]
    async fn refresh_locked(&self) -> Result<(), ClientError> {
        let grant = match self.exchange_refresh_token().await {
            Ok(grant) => grant,
            Err(err) => {
                let reason = refresh_failure_reason(&err);
                metrics::record_refresh_failure(&reason);
                tracing::warn!(%reason, error = %err, "Token refresh failed");
                return Err(err);
            }
        };
        let now = self.clock.now_secs();

        let (api_server, expiration_time) = {
            let mut session = self.session.write();
            session.apply_grant(grant, now);
            (session.api_server().to_string(), session.expiration_time())
        };

        metrics::record_refresh_success();
        tracing::info!(%api_server, expiration_time, "Access token refreshed");

        // Err only means nobody is subscribed.
        let _ = self.events.send(TokenRefreshed);
        Ok(())
    }

    /// POST the current refresh token and decode the grant.
    async fn exchange_refresh_token(&self) -> Result<TokenGrant, ClientError> {
        let refresh_token = self.refresh_token();

        let response = self
            .http
            .post(&self.auth_url)
            .query(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = if status == StatusCode::BAD_REQUEST {
                ApiError::invalid_refresh_token(body)
            } else {
                ApiError::refresh_failed(status, body)
            };
            return Err(err.into());
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Refresh the access token if it is stale.
    ///
    /// Callers that find the token stale queue on the refresh gate and
    /// re-check once they hold it, so a refresh completed by another caller
    /// in the meantime is reused instead of rotating the token again.
    async fn ensure_access_token(&self) -> Result<(), ClientError> {
        if !self.needs_token_refresh() {
            return Ok(());
        }

        let _gate = self.refresh_gate.lock().await;
        if self.needs_token_refresh() {
            self.refresh_locked().await
        } else {
            tracing::debug!("Access token refreshed by concurrent caller");
            Ok(())
        }
    }

    /// Send an authenticated request to the current API server.
    ///
    /// Does not check token freshness. The request carries
    /// `Authorization: Bearer <access_token>` when an access token is held.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `endpoint` is not an
    /// absolute path, [`ClientError::Api`] for a non-success status and
    /// [`ClientError::Transport`] for network failures.
    #[tracing::instrument(
        name = "questrade.request",
        skip(self, method),
        fields(method = %method)
    )]
    pub async fn do_api_request(
        &self,
        endpoint: &str,
        method: Method,
    ) -> Result<ApiPayload, ClientError> {
        let (url, access_token) = {
            let session = self.session.read();
            (
                join_url(session.api_server(), endpoint)?,
                session.access_token().map(str::to_string),
            )
        };

        tracing::debug!(%method, %url, "Sending API request");

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            metrics::record_api_request(metrics::RequestOutcome::Failure);
            tracing::warn!(%method, %url, status = status.as_u16(), "API request failed");
            return Err(ApiError::request_failed(&method, &url, status, body).into());
        }

        let body = response.bytes().await?;
        metrics::record_api_request(metrics::RequestOutcome::Success);
        Ok(ApiPayload::new(body.to_vec()))
    }

    /// List the accounts of the authenticated user.
    ///
    /// Refreshes the access token first if it is stale.
    ///
    /// # Errors
    ///
    /// Propagates refresh failures and data request failures.
    pub async fn get_accounts(&self) -> Result<AccountsResponse, ClientError> {
        self.ensure_access_token().await?;
        self.do_api_request("/v1/accounts", Method::GET)
            .await?
            .decode()
    }

    /// Fetch balances for one account.
    ///
    /// Refreshes the access token first if it is stale. An account that does
    /// not belong to the authenticated user surfaces as [`ClientError::Api`].
    ///
    /// Account numbers that are empty or contain anything other than ASCII
    /// letters and digits never reach the server: they fail locally with
    /// [`ClientError::InvalidEndpoint`], not [`ClientError::Api`], and no
    /// refresh is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] for an empty or malformed
    /// account number, and propagates refresh and data request failures.
    pub async fn get_account_balances(
        &self,
        account_number: &str,
    ) -> Result<BalancesResponse, ClientError> {
        if account_number.is_empty()
            || !account_number.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ClientError::InvalidEndpoint(format!(
                "account number {account_number:?}"
            )));
        }

        self.ensure_access_token().await?;
        self.do_api_request(
            &format!("/v1/accounts/{account_number}/balances"),
            Method::GET,
        )
        .await?
        .decode()
    }
}

impl std::fmt::Debug for QuestradeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestradeClient")
            .field("auth_url", &self.auth_url)
            .field("session", &*self.session.read())
            .finish_non_exhaustive()
    }
}

/// Metric label for a failed refresh.
fn refresh_failure_reason(err: &ClientError) -> String {
    match err {
        ClientError::Api(api) => api.status.to_string(),
        ClientError::Transport(_) => "transport".to_string(),
        ClientError::Decode(_) => "decode".to_string(),
        ClientError::InvalidEndpoint(_) => "invalid_endpoint".to_string(),
    }
}

/// Join an absolute endpoint path onto an API server base URL.
fn join_url(api_server: &str, endpoint: &str) -> Result<String, ClientError> {
    if !endpoint.starts_with('/') || endpoint.starts_with("//") {
        return Err(ClientError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(format!("{}{endpoint}", api_server.trim_end_matches('/')))
}
