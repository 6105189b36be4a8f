//! In-memory authenticator and socket fakes for supervisor tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::accounts::{Credentials, ProxyEndpoint};
use crate::auth::{AuthGrant, Authenticator};
use crate::error::{AuthError, TransportError};
use crate::socket::Connector;

/// Authenticator that counts calls and hands out `token-<n>`.
pub struct FakeAuth {
    calls: AtomicUsize,
    failure: Option<String>,
    proxies: Mutex<Vec<Option<String>>>,
}

impl FakeAuth {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failure: None,
            proxies: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failure: Some(message.to_string()),
            proxies: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Proxy (as `host:port`) used by each call, in call order.
    pub fn proxies_seen(&self) -> Vec<Option<String>> {
        self.proxies.lock().unwrap().clone()
    }
}

impl Authenticator for FakeAuth {
    async fn authenticate(
        &self,
        _credentials: &Credentials,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<AuthGrant, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.proxies
            .lock()
            .unwrap()
            .push(proxy.map(ToString::to_string));
        match &self.failure {
            Some(message) => Err(AuthError::new(message.clone())),
            None => Ok(AuthGrant {
                user_id: "user-1".to_string(),
                access_token: format!("token-{n}"),
            }),
        }
    }
}

/// Test-side ends of one fake socket.
pub struct FakeLink {
    /// Frames the supervisor will read. Drop to simulate a server close.
    pub inbound: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    /// Frames the supervisor wrote.
    pub outbound: mpsc::UnboundedReceiver<Message>,
    /// Access token the connection was opened with.
    pub token: String,
}

/// Connector that hands each opened socket's far end to the test.
pub struct FakeConnector {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<TransportError>>,
    links: mpsc::UnboundedSender<FakeLink>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeLink>) {
        let (links, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            links,
        });
        (connector, rx)
    }

    /// The next connect attempt fails with `err` instead of opening.
    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    type Socket = FakeSocket;

    async fn connect(
        &self,
        access_token: &str,
        _proxy: Option<&ProxyEndpoint>,
    ) -> Result<FakeSocket, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let _ = self.links.send(FakeLink {
            inbound: inbound_tx,
            outbound: outbound_rx,
            token: access_token.to_string(),
        });
        Ok(FakeSocket {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}

/// Supervisor-side end of a fake socket.
pub struct FakeSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Stream for FakeSocket {
    type Item = Result<Message, tungstenite::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Message> for FakeSocket {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        // A test that dropped its link no longer cares about outbound frames.
        let _ = self.outbound.send(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
