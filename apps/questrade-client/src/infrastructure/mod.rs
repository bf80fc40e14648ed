//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the HTTP adapter for Questrade plus the ambient
//! configuration, telemetry and metrics plumbing.

/// Questrade HTTP client (authorization and data endpoints).
pub mod questrade;

/// Environment-driven configuration.
pub mod config;

/// Refresh and request counters.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
