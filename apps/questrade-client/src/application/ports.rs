//! Port Interfaces
//!
//! Contracts between the client adapter and its surroundings.
//!
//! - `Clock`: Source of Unix-seconds time for token expiry decisions
//! - `TokenRefreshed`: Notification published after every successful refresh

/// Source of wall-clock time in Unix seconds.
pub trait Clock: Send + Sync {
    /// Current time in whole Unix seconds.
    fn now_secs(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Published once per successful token refresh, never on failure.
///
/// Carries no credentials. Subscribers that need to persist the rotated
/// refresh token read it back from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRefreshed;
