//! Login client.
//!
//! [`AuthClient`] wraps `reqwest` and performs the single `POST` that trades
//! an email/password pair for a user id and access token. It holds no session
//! state; the supervisor stores the result and decides when to call again.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for a `message` or `error` field in the JSON
//! body. If neither is present the raw body (or the status line, when the body
//! is empty) becomes the message. Transport failures use the `reqwest` error
//! text.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::accounts::{Credentials, ProxyEndpoint};
use crate::config::ServiceConfig;
use crate::error::AuthError;

/// Identity returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub user_id: String,
    pub access_token: String,
}

/// Anything that can log an account in. Implemented by [`AuthClient`] and by
/// in-memory fakes in tests.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        credentials: &Credentials,
        proxy: Option<&ProxyEndpoint>,
    ) -> impl Future<Output = Result<AuthGrant, AuthError>> + Send;
}

/// HTTP login client for the points service.
pub struct AuthClient {
    login_url: String,
    headers: HeaderMap,
    timeout: Duration,
    /// Shared client for accounts without a proxy.
    direct: reqwest::Client,
}

impl AuthClient {
    pub fn new(service: &ServiceConfig, timeout: Duration) -> Result<Self, AuthError> {
        let headers = service_headers(service)?;
        let direct = build_client(&headers, timeout, None)?;
        Ok(Self {
            login_url: service.login_url.clone(),
            headers,
            timeout,
            direct,
        })
    }
}

impl Authenticator for AuthClient {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<AuthGrant, AuthError> {
        // reqwest binds the proxy at client build time, so proxied logins get
        // their own client.
        let proxied;
        let http = match proxy {
            Some(p) => {
                proxied = build_client(&self.headers, self.timeout, Some(p))?;
                &proxied
            }
            None => &self.direct,
        };

        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let resp = http
            .post(&self.login_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::new(transport_message(&e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::new(transport_message(&e)))?;

        if status.is_success() {
            parse_login_response(&text)
        } else {
            Err(AuthError::new(error_message(status.as_u16(), &text)))
        }
    }
}

/// Fixed headers sent with every login.
fn service_headers(service: &ServiceConfig) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    let mut insert = |name: &'static str, value: &str| -> Result<(), AuthError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| AuthError::new(format!("invalid {name} header: {e}")))?;
        headers.insert(HeaderName::from_static(name), value);
        Ok(())
    };
    insert("origin", &service.origin)?;
    insert("user-agent", &service.user_agent)?;
    if !service.api_key.is_empty() {
        insert("x-api-key", &service.api_key)?;
    }
    Ok(headers)
}

fn build_client(
    headers: &HeaderMap,
    timeout: Duration,
    proxy: Option<&ProxyEndpoint>,
) -> Result<reqwest::Client, AuthError> {
    let mut builder = reqwest::Client::builder()
        .default_headers(headers.clone())
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout);
    if let Some(p) = proxy {
        let proxy = reqwest::Proxy::all(p.as_str())
            .map_err(|e| AuthError::new(format!("invalid proxy {p}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| AuthError::new(format!("failed to build HTTP client: {e}")))
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "login request timed out".to_string()
    } else {
        e.to_string()
    }
}

/// Extract `user.id` and `access_token` from a successful login body.
pub fn parse_login_response(body: &str) -> Result<AuthGrant, AuthError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AuthError::new(format!("invalid login response: {e}")))?;

    let user_id = match &value["user"]["id"] {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(AuthError::new("login response missing user.id")),
    };
    let access_token = value["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::new("login response missing access_token"))?
        .to_string();

    Ok(AuthGrant {
        user_id,
        access_token,
    })
}

/// Best human-readable message for a failed login.
fn error_message(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error", "msg"]
            .iter()
            .find_map(|key| v[*key].as_str().map(String::from))
    });
    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => format!("login failed with HTTP {status}"),
        None => body.trim().to_string(),
    }
}
