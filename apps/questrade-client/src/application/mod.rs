//! Application Layer
//!
//! Port definitions the infrastructure adapters depend on.

/// Clock and notification ports.
pub mod ports;
