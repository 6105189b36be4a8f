//! Error taxonomy.
//!
//! | Type              | Scope              | Recovery                              |
//! |-------------------|--------------------|---------------------------------------|
//! | [`ConfigError`]   | startup only       | fatal: the binary exits with code 1  |
//! | [`AuthError`]     | one session        | optional auto-retry after a fixed delay |
//! | [`TransportError`]| one session        | always: reconnect with backoff       |
//! | [`ProtocolAnomaly`] | one message      | none needed: logged and ignored      |
//!
//! No error crosses a session boundary: supervisors catch everything except
//! `ConfigError`, which can only occur before any supervisor is spawned.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credentials file {} not found", .0.display())]
    MissingCredentials(PathBuf),

    #[error("proxy file {} not found", .0.display())]
    MissingProxies(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no usable credentials (expected `email,password` lines)")]
    NoCredentials,

    #[error("proxy mode needs one proxy per account: {accounts} accounts, {proxies} proxies")]
    InsufficientProxies { accounts: usize, proxies: usize },

    #[error("invalid proxy '{entry}': {reason}")]
    InvalidProxy { entry: String, reason: String },

    #[error("invalid [service] settings: {0}")]
    InvalidService(String),
}

/// Login failure, carrying the most specific message available.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Socket-level failures. Every variant is handled by the reconnect path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("handshake rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("proxy tunnel failed: {0}")]
    Proxy(String),

    #[error("invalid socket endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl TransportError {
    /// The server refused the handshake in a way that means the access token
    /// is no longer accepted.
    pub fn is_token_rejected(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403 })
    }

    /// The attempt can never succeed no matter how often it is retried.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_))
    }
}

/// An inbound message that matched no known shape.
#[derive(Debug, Error)]
#[error("unrecognised message: {0}")]
pub struct ProtocolAnomaly(pub String);
