#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # pointfarm
//!
//! Keeps many accounts connected to the points service at once. Each account
//! gets its own supervised WebSocket session that logs in, holds the socket
//! open with keepalive pings, estimates accruing points between server
//! heartbeats, and reconnects with exponential backoff.
//!
//! ## Inputs
//!
//! | File          | Format                         | Required                 |
//! |---------------|--------------------------------|--------------------------|
//! | `account.txt` | `email,password` per line      | always                   |
//! | `proxy.txt`   | proxy URL per line, `#` comments | with `--use-proxy`     |
//! | `pointfarm.toml` | see `config.rs`             | no (defaults apply)      |
//!
//! Exit code 1 on any configuration error. SIGINT/SIGTERM stop every session
//! and exit cleanly.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use pointfarm::accounts;
use pointfarm::config::Config;
use pointfarm::report;
use pointfarm::{AuthClient, BootstrapOptions, ConfigError, Orchestrator, WsConnector};

/// Multi-account session farmer for the points service.
#[derive(Parser)]
#[command(name = "pointfarm", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Credentials file (`email,password` per line).
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Proxy list, one URL per line.
    #[arg(long)]
    proxies: Option<PathBuf>,

    /// Route every account through its own proxy.
    #[arg(long)]
    use_proxy: bool,

    /// Leave failed logins errored instead of retrying them.
    #[arg(long)]
    no_auto_retry: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.accounts {
            config.farm.accounts_file.clone_from(path);
        }
        if let Some(path) = &self.proxies {
            config.farm.proxies_file.clone_from(path);
        }
        if self.use_proxy {
            config.farm.use_proxy = true;
        }
        if self.no_auto_retry {
            config.farm.auto_retry = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pointfarm: {e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("pointfarm v{} starting", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), ConfigError> {
    let credentials = accounts::load_credentials(&config.farm.accounts_file)?;
    let proxies = if config.farm.use_proxy {
        accounts::load_proxies(&config.farm.proxies_file)?
    } else {
        Vec::new()
    };
    info!(
        accounts = credentials.len(),
        proxies = proxies.len(),
        "Loaded {}",
        config.farm.accounts_file.display()
    );

    let auth = AuthClient::new(&config.service, config.timing.request_timeout())
        .map_err(|e| ConfigError::InvalidService(e.message))?;
    let connector = WsConnector::new(&config.service);
    let options = BootstrapOptions::from_config(&config);

    let orchestrator = Orchestrator::bootstrap(
        credentials,
        &proxies,
        &options,
        Arc::new(auth),
        Arc::new(connector),
    )?;
    let reporter = report::spawn(
        orchestrator.registry(),
        Duration::from_secs(config.timing.status_interval_secs),
    );

    shutdown_signal().await;
    info!("Shutting down...");
    reporter.abort();
    orchestrator.shutdown().await;
    info!("All sessions stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
