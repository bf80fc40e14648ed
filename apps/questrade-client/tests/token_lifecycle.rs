//! Token Lifecycle Integration Tests
//!
//! Drives the client against wiremock stand-ins for the Questrade token
//! endpoint and data API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use questrade_client::{ClientError, ClientSettings, Clock, QuestradeClient, TokenRefreshed};
use reqwest::Method;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const START: i64 = 1_700_000_000;

struct ManualClock(AtomicI64);

impl ManualClock {
    fn new(now: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now)))
    }

    fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn settings(auth: &MockServer) -> ClientSettings {
    ClientSettings {
        auth_url: format!("{}/oauth2/token", auth.uri()),
        default_api_server: auth.uri(),
        timeout: Some(Duration::from_secs(5)),
    }
}

fn client(auth: &MockServer, clock: Arc<ManualClock>) -> QuestradeClient {
    QuestradeClient::with_clock("R0", settings(auth), clock).unwrap()
}

fn grant(access: &str, refresh: &str, api_server: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": refresh,
        "api_server": api_server,
    })
}

async fn mount_refresh(server: &MockServer, from: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(query_param("refresh_token", from))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_accounts(server: &MockServer, bearer: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(header("Authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [{
                "type": "Margin",
                "number": "26598145",
                "status": "Active",
                "isPrimary": true,
                "isBilling": true,
                "clientAccountType": "Individual"
            }],
            "userId": 3_000_124
        })))
        .expect(times)
        .mount(server)
        .await;
}

fn expect_api_error(err: ClientError) -> questrade_client::ApiError {
    match err {
        ClientError::Api(api) => api,
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn first_request_refreshes_and_follows_new_api_server() {
    let auth = MockServer::start().await;
    let api = MockServer::start().await;
    let clock = ManualClock::new(START);

    mount_refresh(&auth, "R0", grant("A1", "R1", &format!("{}/", api.uri()), 1800), 1).await;
    mount_accounts(&api, "A1", 1).await;

    let client = client(&auth, clock);
    let accounts = client.get_accounts().await.unwrap();

    assert_eq!(accounts.accounts[0].number, "26598145");
    assert_eq!(accounts.user_id, Some(3_000_124));
    assert_eq!(client.refresh_token(), "R1");
    assert_eq!(client.access_token().as_deref(), Some("A1"));
    assert_eq!(client.access_token_expiration_time(), START + 1800);
    assert_eq!(client.api_server(), format!("{}/", api.uri()));

    let requests = api.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.as_str(),
        format!("{}/v1/accounts", api.uri())
    );
}

#[tokio::test]
async fn fresh_token_skips_refresh() {
    let auth = MockServer::start().await;
    let clock = ManualClock::new(START);

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    mount_accounts(&auth, "A1", 3).await;

    let client = client(&auth, clock.clone());
    client.get_accounts().await.unwrap();

    clock.advance(1779);
    assert!(!client.needs_token_refresh());
    client.get_accounts().await.unwrap();
    client.get_accounts().await.unwrap();

    assert_eq!(client.refresh_token(), "R1");
}

#[tokio::test]
async fn stale_token_refreshes_exactly_once_with_rotated_token() {
    let auth = MockServer::start().await;
    let clock = ManualClock::new(START);

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    mount_refresh(&auth, "R1", grant("A2", "R2", &auth.uri(), 1800), 1).await;
    mount_accounts(&auth, "A1", 1).await;
    mount_accounts(&auth, "A2", 1).await;

    let client = client(&auth, clock.clone());
    client.get_accounts().await.unwrap();

    clock.advance(1780);
    assert!(client.needs_token_refresh());
    client.get_accounts().await.unwrap();

    assert_eq!(client.refresh_token(), "R2");
    assert_eq!(client.access_token().as_deref(), Some("A2"));
    assert_eq!(client.access_token_expiration_time(), START + 1780 + 1800);
}

#[tokio::test]
async fn invalid_refresh_token_leaves_session_untouched() {
    let auth = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
        .expect(2)
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));

    let err = expect_api_error(client.get_accounts().await.unwrap_err());
    assert!(err.is_invalid_refresh_token());
    assert!(err.message.contains("refresh token is invalid"));
    assert_eq!(err.status, 400);
    assert_eq!(err.body, "Bad Request");

    let err = expect_api_error(client.get_account_balances("26598145").await.unwrap_err());
    assert!(err.is_invalid_refresh_token());

    assert_eq!(client.access_token(), None);
    assert_eq!(client.access_token_expiration_time(), -1);
    assert_eq!(client.refresh_token(), "R0");
    assert_eq!(client.api_server(), auth.uri());
}

#[tokio::test]
async fn server_side_refresh_failure_is_generic() {
    let auth = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let err = expect_api_error(client.refresh().await.unwrap_err());

    assert!(!err.is_invalid_refresh_token());
    assert_eq!(err.status, 503);
    assert_eq!(err.body, "maintenance");
    assert_eq!(err.message, "failed to refresh access token: maintenance");
    assert_eq!(client.refresh_token(), "R0");
}

#[tokio::test]
async fn failed_refresh_keeps_previous_access_token() {
    let auth = MockServer::start().await;
    let clock = ManualClock::new(START);

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(query_param("refresh_token", "R1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .expect(1)
        .mount(&auth)
        .await;

    let client = client(&auth, clock);
    client.refresh().await.unwrap();
    let before = (
        client.access_token(),
        client.access_token_expiration_time(),
        client.refresh_token(),
    );

    assert!(client.refresh().await.is_err());
    let after = (
        client.access_token(),
        client.access_token_expiration_time(),
        client.refresh_token(),
    );
    assert_eq!(before, after);
}

#[tokio::test]
async fn malformed_grant_is_a_decode_error() {
    let auth = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"access_token\":1}"))
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let mut events = client.subscribe();

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
    assert_eq!(client.refresh_token(), "R0");
    assert_eq!(client.access_token(), None);
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn data_failure_carries_status_and_body() {
    let auth = MockServer::start().await;

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
        .expect(1)
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let err = expect_api_error(client.get_accounts().await.unwrap_err());

    assert_eq!(err.status, 500);
    assert_eq!(err.body, "server error");
    assert_eq!(
        err.message,
        format!("GET {}/v1/accounts failed with status 500", auth.uri())
    );
}

#[tokio::test]
async fn balances_are_fetched_for_account() {
    let auth = MockServer::start().await;

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/26598145/balances"))
        .and(header("Authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "perCurrencyBalances": [{
                "currency": "CAD",
                "cash": 243_971.7,
                "marketValue": 6017,
                "totalEquity": 249_988.7,
                "buyingPower": 496_367.2,
                "maintenanceExcess": 248_183.6,
                "isRealTime": false
            }],
            "combinedBalances": [],
            "sodPerCurrencyBalances": [],
            "sodCombinedBalances": []
        })))
        .expect(2)
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let balances = client.get_account_balances("26598145").await.unwrap();
    assert_eq!(balances.per_currency_balances.len(), 1);
    assert_eq!(balances.per_currency_balances[0].currency, "CAD");

    // Second call reuses the token.
    client.get_account_balances("26598145").await.unwrap();
}

#[tokio::test]
async fn foreign_account_surfaces_api_error() {
    let auth = MockServer::start().await;

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/99999999/balances"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_string(r#"{"code":1016,"message":"Access to account denied"}"#),
        )
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let err = expect_api_error(client.get_account_balances("99999999").await.unwrap_err());
    assert_eq!(err.status, 403);
    assert!(err.body.contains("Access to account denied"));
}

#[tokio::test]
async fn refresh_notifies_subscribers_once_per_success() {
    let auth = MockServer::start().await;

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(query_param("refresh_token", "R1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let mut events = client.subscribe();

    client.refresh().await.unwrap();
    assert_eq!(events.try_recv(), Ok(TokenRefreshed));
    assert_eq!(client.refresh_token(), "R1");

    assert!(client.refresh().await.is_err());
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn explicit_refresh_always_rotates() {
    let auth = MockServer::start().await;

    mount_refresh(&auth, "R0", grant("A1", "R1", &auth.uri(), 1800), 1).await;
    mount_refresh(&auth, "R1", grant("A2", "R2", &auth.uri(), 1800), 1).await;

    let client = client(&auth, ManualClock::new(START));
    client.refresh().await.unwrap();
    assert!(!client.needs_token_refresh());
    client.refresh().await.unwrap();

    assert_eq!(client.refresh_token(), "R2");
    assert_eq!(client.access_token().as_deref(), Some("A2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stale_callers_share_one_refresh() {
    let auth = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(query_param("refresh_token", "R0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(grant("A1", "R1", &auth.uri(), 1800))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&auth)
        .await;
    mount_accounts(&auth, "A1", 8).await;

    let client = Arc::new(client(&auth, ManualClock::new(START)));
    let mut events = client.subscribe();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        tasks.spawn(async move { client.get_accounts().await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(client.refresh_token(), "R1");
    assert_eq!(events.try_recv(), Ok(TokenRefreshed));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn low_level_request_does_not_refresh() {
    let auth = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("A1", "R1", &auth.uri(), 1800)))
        .expect(0)
        .mount(&auth)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/time"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"time": "2014-10-24T12:14:42.730000-04:00"})),
        )
        .expect(1)
        .mount(&auth)
        .await;

    let client = client(&auth, ManualClock::new(START));
    let payload = client.do_api_request("/v1/time", Method::GET).await.unwrap();
    let value = payload.to_json().unwrap();

    assert_eq!(value["time"], "2014-10-24T12:14:42.730000-04:00");
    assert_eq!(client.access_token(), None);

    let requests = auth.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn unreachable_token_endpoint_is_a_transport_error() {
    let settings = ClientSettings {
        auth_url: "http://127.0.0.1:1/oauth2/token".to_string(),
        default_api_server: "http://127.0.0.1:1".to_string(),
        timeout: Some(Duration::from_secs(2)),
    };
    let client = QuestradeClient::new("R0", settings).unwrap();

    let err = client.get_accounts().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.refresh_token(), "R0");
}
