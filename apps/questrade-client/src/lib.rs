#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Questrade Client - Token-Managed REST Client
//!
//! A minimal client for Questrade's REST API. The client owns a rotating
//! refresh token, exchanges it for short-lived access tokens on demand and
//! follows the API server URL handed back by every refresh.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Session state and typed response models
//!   - `session`: Token session record and freshness rules
//!   - `accounts`: Accounts and balances payloads
//!
//! - **Application**: Port definitions
//!   - `ports`: Clock abstraction and refresh notifications
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `questrade`: HTTP client for the authorization and data endpoints
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Tracing subscriber and OpenTelemetry export
//!   - `metrics`: Refresh and request counters
//!
//! # Token Lifecycle
//!
//! ```text
//! get_accounts() ──► stale? ──yes──► refresh gate ──► POST /oauth2/token
//!                      │                                   │
//!                      no                       rotate refresh token,
//!                      │                        store access token + api_server
//!                      ▼                                   │
//!              GET {api_server}/v1/accounts ◄──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session state and response models with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::accounts::{Account, AccountsResponse, Balance, BalancesResponse};
pub use domain::session::{
    DEFAULT_API_SERVER, NO_EXPIRATION, REFRESH_MARGIN_SECS, TokenGrant, TokenSession,
};

// Ports
pub use application::ports::{Clock, SystemClock, TokenRefreshed};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ClientSettings, ConfigError, RefreshToken};

// Questrade adapter
pub use infrastructure::questrade::{
    ApiError, ApiPayload, ClientError, DEFAULT_AUTH_URL, INVALID_REFRESH_TOKEN_MSG,
    QuestradeClient,
};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
