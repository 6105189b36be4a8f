//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **CLI flags**: applied by `main` after loading
//! 2. **Environment variables**: `POINTFARM_ACCOUNTS`, `POINTFARM_PROXIES`,
//!    `POINTFARM_USE_PROXY`, `POINTFARM_API_KEY`
//! 3. **Config file**: path via `--config <path>`, or `pointfarm.toml` in CWD
//! 4. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [service]
//! login_url = "https://auth.teneo.pro/api/login"
//! socket_url = "wss://secure.ws.teneo.pro/websocket"
//! protocol_version = "v0.2"
//! api_key = ""                      # sent as `x-api-key` when non-empty
//! origin = "https://dashboard.teneo.pro"
//!
//! [farm]
//! accounts_file = "account.txt"
//! proxies_file = "proxy.txt"
//! use_proxy = false
//! auto_retry = true
//!
//! [timing]
//! keepalive_interval_secs = 60
//! pulse_delay_secs = 10
//! tick_interval_secs = 1
//! stuck_threshold_secs = 60
//! auth_retry_delay_secs = 180
//! backoff_base_ms = 1000
//! backoff_max_ms = 30000
//! request_timeout_secs = 30
//! immediate_close_secs = 5
//! immediate_close_limit = 3
//! status_interval_secs = 30
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pointfarm.toml";

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub farm: FarmConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote service endpoints and the fixed headers sent with every request.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Login endpoint (`POST {email, password}`).
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// WebSocket endpoint; `accessToken` and `version` are appended as query params.
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    /// Value of the `version` query parameter.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Service API key, sent as `x-api-key`. Override with `POINTFARM_API_KEY`.
    /// Omitted from requests when empty.
    #[serde(default)]
    pub api_key: String,
    /// `Origin` header for login and socket handshake.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// `User-Agent` header for login and socket handshake.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Account sources and fleet-wide switches.
#[derive(Debug, Clone, Deserialize)]
pub struct FarmConfig {
    /// `email,password` per line. Override with `POINTFARM_ACCOUNTS`.
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
    /// One proxy URL per line. Override with `POINTFARM_PROXIES`.
    #[serde(default = "default_proxies_file")]
    pub proxies_file: PathBuf,
    /// Route each account through its own proxy (default false).
    #[serde(default)]
    pub use_proxy: bool,
    /// Retry failed logins after `timing.auth_retry_delay_secs` (default true).
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,
}

/// Timers driving each session's supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Seconds between `PING` frames while connected (default 60).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Seconds keepalive stays paused after a server pulse (default 10).
    #[serde(default = "default_pulse_delay")]
    pub pulse_delay_secs: u64,
    /// Seconds between estimator refreshes (default 1).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Seconds a session may sit in "Calculating" before a forced reconnect (default 60).
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,
    /// Seconds before retrying a failed login (default 180).
    #[serde(default = "default_auth_retry_delay")]
    pub auth_retry_delay_secs: u64,
    /// First reconnect delay in milliseconds (default 1000).
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Reconnect delay cap in milliseconds (default 30 000).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// Timeout for login and socket open (default 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// A close this soon after open counts as an immediate close (default 5).
    #[serde(default = "default_immediate_close")]
    pub immediate_close_secs: u64,
    /// Consecutive immediate closes before re-authenticating (default 3).
    #[serde(default = "default_immediate_close_limit")]
    pub immediate_close_limit: u32,
    /// Seconds between fleet summaries in the log (default 30, 0 disables).
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_login_url() -> String {
    "https://auth.teneo.pro/api/login".to_string()
}
fn default_socket_url() -> String {
    "wss://secure.ws.teneo.pro/websocket".to_string()
}
fn default_protocol_version() -> String {
    "v0.2".to_string()
}
fn default_origin() -> String {
    "https://dashboard.teneo.pro".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/126.0.0.0 Safari/537.36"
        .to_string()
}
fn default_accounts_file() -> PathBuf {
    PathBuf::from("account.txt")
}
fn default_proxies_file() -> PathBuf {
    PathBuf::from("proxy.txt")
}
fn default_auto_retry() -> bool {
    true
}
fn default_keepalive_interval() -> u64 {
    60
}
fn default_pulse_delay() -> u64 {
    10
}
fn default_tick_interval() -> u64 {
    1
}
fn default_stuck_threshold() -> u64 {
    60
}
fn default_auth_retry_delay() -> u64 {
    180
}
fn default_backoff_base() -> u64 {
    1000
}
fn default_backoff_max() -> u64 {
    30_000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_immediate_close() -> u64 {
    5
}
fn default_immediate_close_limit() -> u32 {
    3
}
fn default_status_interval() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            socket_url: default_socket_url(),
            protocol_version: default_protocol_version(),
            api_key: String::new(),
            origin: default_origin(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            proxies_file: default_proxies_file(),
            use_proxy: false,
            auto_retry: default_auto_retry(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: default_keepalive_interval(),
            pulse_delay_secs: default_pulse_delay(),
            tick_interval_secs: default_tick_interval(),
            stuck_threshold_secs: default_stuck_threshold(),
            auth_retry_delay_secs: default_auth_retry_delay(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            request_timeout_secs: default_request_timeout(),
            immediate_close_secs: default_immediate_close(),
            immediate_close_limit: default_immediate_close_limit(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TimingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `pointfarm.toml` in
    /// the current directory is used when present, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Env var overrides, with the lookup injected so tests stay hermetic.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(accounts) = lookup("POINTFARM_ACCOUNTS") {
            self.farm.accounts_file = PathBuf::from(accounts);
        }
        if let Some(proxies) = lookup("POINTFARM_PROXIES") {
            self.farm.proxies_file = PathBuf::from(proxies);
        }
        if let Some(flag) = lookup("POINTFARM_USE_PROXY") {
            self.farm.use_proxy = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(key) = lookup("POINTFARM_API_KEY") {
            self.service.api_key = key;
        }
    }
}
