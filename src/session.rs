//! Per-account session record.
//!
//! A [`Session`] is created by the orchestrator and afterwards written only
//! by that session's supervisor. Everyone else reads cloned snapshots from the
//! [`SessionRegistry`](crate::registry::SessionRegistry).

use std::fmt;

use tokio::time::Instant;

use crate::accounts::{Credentials, ProxyEndpoint};
use crate::points::CALCULATING;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Connecting,
    Connected,
    Reconnecting,
    Errored,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one farming account.
#[derive(Debug, Clone)]
pub struct Session {
    /// Position in the credential list.
    pub id: usize,
    pub credentials: Credentials,
    /// Assigned once at creation, never changes.
    pub proxy: Option<ProxyEndpoint>,
    pub user_id: Option<String>,
    /// Token from the most recent successful login. Older tokens are dropped.
    pub access_token: Option<String>,
    /// Fresh UUID per login attempt.
    pub browser_id: Option<String>,
    pub connection_state: ConnectionState,
    /// Most recent server-pushed point update (or socket open).
    pub last_heartbeat_at: Option<Instant>,
    /// When the estimator entered the "Calculating" sentinel; `None` otherwise.
    pub calculating_since: Option<Instant>,
    pub points_total: u64,
    pub points_today: u64,
    pub potential_points: f64,
    pub countdown: String,
    pub status_message: String,
    /// Reconnect attempts since the last successful open.
    pub retry_count: u32,
}

impl Session {
    pub fn new(id: usize, credentials: Credentials, proxy: Option<ProxyEndpoint>) -> Self {
        Self {
            id,
            credentials,
            proxy,
            user_id: None,
            access_token: None,
            browser_id: None,
            connection_state: ConnectionState::Disconnected,
            last_heartbeat_at: None,
            calculating_since: None,
            points_total: 0,
            points_today: 0,
            potential_points: 0.0,
            countdown: CALCULATING.to_string(),
            status_message: "Waiting to start".to_string(),
            retry_count: 0,
        }
    }

    pub fn email(&self) -> &str {
        &self.credentials.email
    }

    /// Record a failure in the human-facing status line.
    pub fn set_error(&mut self, detail: impl fmt::Display) {
        self.status_message = format!("Error: {detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_disconnected_and_calculating() {
        let s = Session::new(3, Credentials::new("a@x.io", "p"), None);
        assert_eq!(s.id, 3);
        assert_eq!(s.email(), "a@x.io");
        assert_eq!(s.connection_state, ConnectionState::Disconnected);
        assert_eq!(s.countdown, CALCULATING);
        assert!(s.access_token.is_none());
        assert_eq!(s.retry_count, 0);
    }

    #[test]
    fn errors_are_prefixed() {
        let mut s = Session::new(0, Credentials::new("a@x.io", "p"), None);
        s.set_error("invalid password");
        assert_eq!(s.status_message, "Error: invalid password");
    }

    #[test]
    fn debug_snapshot_hides_password() {
        let s = Session::new(0, Credentials::new("a@x.io", "hunter2"), None);
        assert!(!format!("{s:?}").contains("hunter2"));
    }
}
