//! Domain Layer
//!
//! Token session state and typed Questrade payloads. Nothing in this layer
//! performs I/O or reads the clock; callers pass the current time in.

/// Token session record and freshness rules.
pub mod session;

/// Accounts and balances response models.
pub mod accounts;
