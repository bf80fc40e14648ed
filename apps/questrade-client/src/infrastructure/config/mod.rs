//! Configuration Module
//!
//! Configuration loading for the client and binary.

mod settings;

pub use settings::{ClientConfig, ClientSettings, ConfigError, RefreshToken};
