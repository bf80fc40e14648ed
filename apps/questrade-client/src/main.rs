//! Questrade Client Binary
//!
//! Lists the accounts visible to a refresh token and prints their balances.
//!
//! # Usage
//!
//! ```bash
//! QUESTRADE_REFRESH_TOKEN=... cargo run --bin questrade-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `QUESTRADE_REFRESH_TOKEN`: Refresh token from the Questrade developer console
//!
//! ## Optional
//! - `QUESTRADE_AUTH_URL`: Token endpoint (default: <https://login.questrade.com/oauth2/token>)
//! - `QUESTRADE_API_SERVER`: API server before the first refresh (default: <https://api01.iq.questrade.com>)
//! - `QUESTRADE_HTTP_TIMEOUT_SECS`: Transport timeout (default: none)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Refresh tokens are single-use. The rotated token is logged at `info`
//! after every refresh and again on exit, whether or not the run succeeded.

use std::sync::Arc;

use anyhow::Context;
use questrade_client::infrastructure::metrics::describe_metrics;
use questrade_client::{ClientConfig, QuestradeClient, init_telemetry};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = init_telemetry();
    describe_metrics();

    let config = ClientConfig::from_env().context("failed to load configuration")?;
    tracing::info!(
        auth_url = %config.settings.auth_url,
        api_server = %config.settings.default_api_server,
        timeout_secs = config.settings.timeout.map(|t| t.as_secs()),
        "Configuration loaded"
    );

    let client = Arc::new(QuestradeClient::from_config(&config)?);
    let watcher = spawn_refresh_watcher(Arc::clone(&client));

    let (outcome, refresh_token) = run(&client).await;

    watcher.abort();
    tracing::info!(
        %refresh_token,
        "Use this refresh token for the next run"
    );
    outcome
}

/// Print accounts and their balances.
///
/// The refresh token current at exit is returned on both the success and
/// failure paths: once the first refresh succeeds, the token the process
/// started with is void.
async fn run(client: &QuestradeClient) -> (anyhow::Result<()>, String) {
    let outcome = print_accounts(client).await;
    (outcome, client.refresh_token())
}

async fn print_accounts(client: &QuestradeClient) -> anyhow::Result<()> {
    let accounts = client.get_accounts().await.context("failed to list accounts")?;
    println!("{}", serde_json::to_string_pretty(&accounts)?);

    for account in &accounts.accounts {
        let balances = client
            .get_account_balances(&account.number)
            .await
            .with_context(|| format!("failed to fetch balances for {}", account.number))?;
        println!("{}", serde_json::to_string_pretty(&balances)?);
    }
    Ok(())
}

/// Log the rotated refresh token after every successful refresh.
fn spawn_refresh_watcher(client: Arc<QuestradeClient>) -> tokio::task::JoinHandle<()> {
    let mut events = client.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(_) => tracing::info!(
                    refresh_token = %client.refresh_token(),
                    api_server = %client.api_server(),
                    expires_at = client.access_token_expiration_time(),
                    "Refresh token rotated"
                ),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Refresh notifications lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
