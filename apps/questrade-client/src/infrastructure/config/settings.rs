//! Client Configuration Settings
//!
//! Configuration types for the Questrade client, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::session::DEFAULT_API_SERVER;
use crate::infrastructure::questrade::DEFAULT_AUTH_URL;

/// Caller-provisioned refresh token.
///
/// Obtained out-of-band from the Questrade developer console.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Wrap a refresh token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RefreshToken").field(&"[REDACTED]").finish()
    }
}

/// HTTP endpoint and transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Token exchange endpoint.
    pub auth_url: String,
    /// API server used until the first refresh supplies one.
    pub default_api_server: String,
    /// Per-request transport timeout. `None` keeps reqwest's default of no
    /// timeout.
    pub timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            default_api_server: DEFAULT_API_SERVER.to_string(),
            timeout: None,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Initial refresh token.
    pub refresh_token: RefreshToken,
    /// Endpoint and transport settings.
    pub settings: ClientSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `QUESTRADE_REFRESH_TOKEN` is missing or empty, or
    /// if an optional variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let refresh_token = lookup("QUESTRADE_REFRESH_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("QUESTRADE_REFRESH_TOKEN".to_string()))?;

        if refresh_token.trim().is_empty() {
            return Err(ConfigError::EmptyValue(
                "QUESTRADE_REFRESH_TOKEN".to_string(),
            ));
        }

        let defaults = ClientSettings::default();

        let auth_url = non_empty(&lookup, "QUESTRADE_AUTH_URL")?.unwrap_or(defaults.auth_url);
        let default_api_server = non_empty(&lookup, "QUESTRADE_API_SERVER")?
            .unwrap_or(defaults.default_api_server);

        let timeout = match lookup("QUESTRADE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(|secs| Some(Duration::from_secs(secs)))
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "QUESTRADE_HTTP_TIMEOUT_SECS".to_string(),
                    value: raw,
                })?,
            None => defaults.timeout,
        };

        Ok(Self {
            refresh_token: RefreshToken::new(refresh_token.trim().to_string()),
            settings: ClientSettings {
                auth_url,
                default_api_server,
                timeout,
            },
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn non_empty<F>(lookup: &F, key: &str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(v) => Ok(Some(v.trim().to_string())),
        None => Ok(None),
    }
}
