//! WebSocket connector.
//!
//! [`WsConnector`] builds the socket URL from the current access token and
//! opens it either directly or through an HTTP `CONNECT` tunnel on the
//! session's proxy. The supervisor only sees the [`Connector`] trait, so
//! tests can substitute in-memory sockets.

use std::future::Future;

use futures_util::{Sink, Stream};
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::accounts::ProxyEndpoint;
use crate::config::ServiceConfig;
use crate::error::TransportError;

/// Live socket as seen by the supervisor.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Largest proxy `CONNECT` response head we are willing to buffer.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Opens sockets for a session. Implemented by [`WsConnector`] and test fakes.
pub trait Connector: Send + Sync + 'static {
    type Socket: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Send
        + Unpin
        + 'static;

    fn connect(
        &self,
        access_token: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> impl Future<Output = Result<Self::Socket, TransportError>> + Send;
}

/// Real connector for the service's WebSocket endpoint.
pub struct WsConnector {
    socket_url: String,
    protocol_version: String,
    origin: String,
    user_agent: String,
}

impl WsConnector {
    pub fn new(service: &ServiceConfig) -> Self {
        Self {
            socket_url: service.socket_url.clone(),
            protocol_version: service.protocol_version.clone(),
            origin: service.origin.clone(),
            user_agent: service.user_agent.clone(),
        }
    }

    fn build_request(&self, url: &Url) -> Result<Request, TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        let headers = request.headers_mut();
        for (name, value) in [("origin", &self.origin), ("user-agent", &self.user_agent)] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidEndpoint(format!("{name} header: {e}")))?;
            headers.insert(name, value);
        }
        Ok(request)
    }
}

impl Connector for WsConnector {
    type Socket = WsStream;

    async fn connect(
        &self,
        access_token: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<WsStream, TransportError> {
        let url = socket_url(&self.socket_url, access_token, &self.protocol_version)?;
        let request = self.build_request(&url)?;

        let result = match proxy {
            None => tokio_tungstenite::connect_async(request).await,
            Some(p) => {
                let host = url
                    .host_str()
                    .ok_or_else(|| TransportError::InvalidEndpoint("missing host".into()))?;
                let port = url.port_or_known_default().unwrap_or(443);
                let tunnel = open_tunnel(p, host, port).await?;
                debug!(proxy = %p, "tunnel established");
                tokio_tungstenite::client_async_tls(request, tunnel).await
            }
        };

        match result {
            Ok((ws, _response)) => Ok(ws),
            Err(tungstenite::Error::Http(response)) => Err(TransportError::Rejected {
                status: response.status().as_u16(),
            }),
            Err(e) => Err(TransportError::WebSocket(e)),
        }
    }
}

/// `<base>?accessToken=<token>&version=<version>`, with the token URL-encoded.
pub fn socket_url(base: &str, access_token: &str, version: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidEndpoint(format!(
            "expected ws:// or wss:// URL, got {}",
            url.scheme()
        )));
    }
    url.query_pairs_mut()
        .append_pair("accessToken", access_token)
        .append_pair("version", version);
    Ok(url)
}

/// Open a TCP stream to `host:port` through an HTTP `CONNECT` proxy.
async fn open_tunnel(
    proxy: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> Result<TcpStream, TransportError> {
    let mut stream = TcpStream::connect((proxy.host(), proxy.port())).await?;

    stream
        .write_all(connect_request(host, port, proxy.basic_auth().as_deref()).as_bytes())
        .await?;

    let mut head = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(TransportError::Proxy(format!(
                "{proxy} closed the connection during CONNECT"
            )));
        }
        head.extend_from_slice(&chunk[..n]);
        if head.len() > MAX_CONNECT_RESPONSE {
            return Err(TransportError::Proxy(format!(
                "{proxy} sent an oversized CONNECT response"
            )));
        }
    }

    match connect_status(&head) {
        Some(200) => Ok(stream),
        Some(status) => Err(TransportError::Proxy(format!(
            "{proxy} refused CONNECT with HTTP {status}"
        ))),
        None => Err(TransportError::Proxy(format!(
            "{proxy} sent a malformed CONNECT response"
        ))),
    }
}

fn connect_request(host: &str, port: u16, basic_auth: Option<&str>) -> String {
    let mut req = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(auth) = basic_auth {
        req.push_str("Proxy-Authorization: Basic ");
        req.push_str(auth);
        req.push_str("\r\n");
    }
    req.push_str("\r\n");
    req
}

/// Status code from the first line of a proxy response head.
fn connect_status(head: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(head).ok()?;
    let status_line = text.lines().next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
