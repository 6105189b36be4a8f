//! Fleet bootstrap and shutdown.
//!
//! [`Orchestrator::bootstrap`] validates the credential and proxy lists,
//! creates one [`Session`] per credential, and spawns a [`Supervisor`] task
//! for each. [`Orchestrator::shutdown`] cancels them all and waits for the
//! tasks to finish.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::accounts::{Credentials, ProxyEndpoint};
use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::ConfigError;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::socket::Connector;
use crate::supervisor::{SessionTiming, Supervisor};

/// Fleet-wide switches.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub use_proxy: bool,
    pub auto_retry: bool,
    pub timing: SessionTiming,
}

impl BootstrapOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            use_proxy: config.farm.use_proxy,
            auto_retry: config.farm.auto_retry,
            timing: SessionTiming::from(&config.timing),
        }
    }
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Running fleet of supervised sessions.
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Validate inputs, create the sessions and start one supervisor each.
    ///
    /// Fails before any login is attempted if there are no credentials, or if
    /// proxy mode is on and there are fewer proxies than credentials.
    pub fn bootstrap<A: Authenticator, C: Connector>(
        credentials: Vec<Credentials>,
        proxies: &[ProxyEndpoint],
        options: &BootstrapOptions,
        auth: Arc<A>,
        connector: Arc<C>,
    ) -> Result<Self, ConfigError> {
        let sessions = build_sessions(credentials, proxies, options.use_proxy)?;
        let registry = Arc::new(SessionRegistry::new(sessions));
        let cancel = CancellationToken::new();

        let tasks = (0..registry.len())
            .filter_map(|id| registry.writer(id))
            .map(|writer| {
                let supervisor = Supervisor::new(
                    writer,
                    Arc::clone(&auth),
                    Arc::clone(&connector),
                    options.timing.clone(),
                    options.auto_retry,
                    cancel.child_token(),
                );
                tokio::spawn(supervisor.run())
            })
            .collect();

        info!(
            sessions = registry.len(),
            use_proxy = options.use_proxy,
            auto_retry = options.auto_retry,
            "Fleet started"
        );

        Ok(Self {
            registry,
            cancel,
            tasks,
        })
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Cancel every supervisor and wait for all of them to exit.
    pub async fn shutdown(self) {
        info!(sessions = self.tasks.len(), "Stopping fleet");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Session task ended abnormally: {e}");
            }
        }
    }
}

/// One session per credential, with `proxies[id % len]` when proxies are used.
fn build_sessions(
    credentials: Vec<Credentials>,
    proxies: &[ProxyEndpoint],
    use_proxy: bool,
) -> Result<Vec<Session>, ConfigError> {
    if credentials.is_empty() {
        return Err(ConfigError::NoCredentials);
    }
    if use_proxy && proxies.len() < credentials.len() {
        return Err(ConfigError::InsufficientProxies {
            accounts: credentials.len(),
            proxies: proxies.len(),
        });
    }

    Ok(credentials
        .into_iter()
        .enumerate()
        .map(|(id, creds)| {
            let proxy = if use_proxy {
                proxies.get(id % proxies.len()).cloned()
            } else {
                None
            };
            Session::new(id, creds, proxy)
        })
        .collect())
}
