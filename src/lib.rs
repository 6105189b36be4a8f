#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! pointfarm library: the session engine behind the `pointfarm` binary.
//!
//! - `points`: deterministic point-accrual estimator
//! - `auth`: login client
//! - `socket`: WebSocket connector (direct or via HTTP CONNECT proxy)
//! - `supervisor`: per-session connect/keepalive/reconnect loop
//! - `registry`: session records and display selection
//! - `orchestrator`: fleet bootstrap and shutdown
//! - `report`: log-based display sink
//! - `accounts`, `config`: input files and configuration

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod points;
pub mod registry;
pub mod report;
pub mod session;
pub mod socket;
pub mod supervisor;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use accounts::{Credentials, ProxyEndpoint};
pub use auth::{AuthClient, Authenticator};
pub use config::Config;
pub use error::{AuthError, ConfigError, TransportError};
pub use orchestrator::{BootstrapOptions, Orchestrator};
pub use registry::{RegistryEvent, SessionRegistry};
pub use session::{ConnectionState, Session};
pub use socket::{Connector, WsConnector};
