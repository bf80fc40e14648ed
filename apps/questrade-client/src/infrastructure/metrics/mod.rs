//! Metrics Module
//!
//! Counters for token refreshes and data requests, recorded through the
//! `metrics` facade. Nothing is exported until the embedding application
//! installs a recorder.
//!
//! # Metrics
//!
//! - `questrade_token_refreshes_total`: Successful refresh exchanges
//! - `questrade_token_refresh_failures_total`: Failed refreshes by status or cause
//! - `questrade_api_requests_total`: Data requests by outcome

use metrics::{counter, describe_counter};

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        "questrade_token_refreshes_total",
        "Total successful access token refreshes"
    );
    describe_counter!(
        "questrade_token_refresh_failures_total",
        "Total failed access token refreshes by HTTP status or failure cause"
    );
    describe_counter!(
        "questrade_api_requests_total",
        "Total data API requests by outcome"
    );
}

/// Outcome label for data requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx response.
    Success,
    /// Non-success response.
    Failure,
}

impl RequestOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record a successful refresh.
pub fn record_refresh_success() {
    counter!("questrade_token_refreshes_total").increment(1);
}

/// Record a failed refresh.
///
/// `reason` is the HTTP status code for rejected exchanges, or `transport` /
/// `decode` when no usable response arrived.
pub fn record_refresh_failure(reason: &str) {
    counter!(
        "questrade_token_refresh_failures_total",
        "status" => reason.to_string()
    )
    .increment(1);
}

/// Record a completed data request.
pub fn record_api_request(outcome: RequestOutcome) {
    counter!("questrade_api_requests_total", "outcome" => outcome.as_str()).increment(1);
}
