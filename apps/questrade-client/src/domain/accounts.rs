//! Accounts and balances payloads returned by the Questrade data API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Response from `GET /v1/accounts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    /// Accounts visible to the authenticated user.
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Questrade user identifier.
    #[serde(default)]
    pub user_id: Option<u64>,
}

/// Single brokerage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account type (e.g., "Margin", "TFSA", "RRSP").
    #[serde(rename = "type")]
    pub account_type: String,
    /// Account number used in per-account endpoints.
    pub number: String,
    /// Account status (e.g., "Active").
    pub status: String,
    /// Whether this is the user's primary account.
    #[serde(default)]
    pub is_primary: bool,
    /// Whether this account is billed for data subscriptions.
    #[serde(default)]
    pub is_billing: bool,
    /// Client account type (e.g., "Individual", "Joint").
    #[serde(default)]
    pub client_account_type: Option<String>,
}

/// Response from `GET /v1/accounts/{number}/balances`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    /// Live balances broken down by currency.
    #[serde(default)]
    pub per_currency_balances: Vec<Balance>,
    /// Live balances combined into each currency.
    #[serde(default)]
    pub combined_balances: Vec<Balance>,
    /// Start-of-day balances broken down by currency.
    #[serde(default)]
    pub sod_per_currency_balances: Vec<Balance>,
    /// Start-of-day balances combined into each currency.
    #[serde(default)]
    pub sod_combined_balances: Vec<Balance>,
}

impl BalancesResponse {
    /// Live combined balance in the given currency, if reported.
    #[must_use]
    pub fn combined(&self, currency: &str) -> Option<&Balance> {
        self.combined_balances
            .iter()
            .find(|b| b.currency.eq_ignore_ascii_case(currency))
    }
}

/// Balance figures for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// ISO currency code.
    pub currency: String,
    /// Cash balance.
    #[serde(default)]
    pub cash: Decimal,
    /// Market value of all securities.
    #[serde(default)]
    pub market_value: Decimal,
    /// Cash plus market value.
    #[serde(default)]
    pub total_equity: Decimal,
    /// Buying power.
    #[serde(default)]
    pub buying_power: Decimal,
    /// Maintenance excess.
    #[serde(default)]
    pub maintenance_excess: Decimal,
    /// Whether the figures are real-time rather than delayed.
    #[serde(default)]
    pub is_real_time: bool,
}
