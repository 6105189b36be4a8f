//! Per-session connection supervisor.
//!
//! One [`Supervisor`] per account, each running as its own tokio task. It
//! drives the session through login, socket open, keepalive, point
//! estimation and reconnect. It is the only writer of its session record.
//!
//! The loop is a flat sequence of [`Step`]s rather than nested callbacks:
//!
//! ```text
//! Authenticate ──ok──▶ Connect ──open──▶ (connected loop) ──close──▶ Backoff ─▶ Connect
//!      │                  │                    │
//!      │ fail             │ 401/403            │ 3 immediate closes
//!      ▼                  └──────────▶ Authenticate ◀────┘
//! RetryLater (auto-retry) / Park (no retry)
//! ```
//!
//! A 401/403 on a token that has never opened a socket goes through
//! `Backoff` before the next login, so a rejected account cannot spin on the
//! login endpoint.
//!
//! Every await races the shared [`CancellationToken`], so a cancelled
//! session never opens another socket.

mod inbound;
mod timers;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accounts::{Credentials, ProxyEndpoint};
use crate::auth::Authenticator;
use crate::config::TimingConfig;
use crate::error::TransportError;
use crate::points;
use crate::registry::SessionWriter;
use crate::session::ConnectionState;
use crate::socket::Connector;

pub use inbound::{parse_inbound, Inbound, PING_FRAME, PULSE_MESSAGE};
pub use timers::{backoff_delay, Keepalive, Watchdog};

/// How long a graceful close may take before the socket is simply dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Timing knobs for one session, resolved from [`TimingConfig`].
#[derive(Debug, Clone)]
pub struct SessionTiming {
    pub keepalive_interval: Duration,
    pub pulse_delay: Duration,
    pub tick_interval: Duration,
    pub stuck_threshold: Duration,
    pub auth_retry_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub request_timeout: Duration,
    pub immediate_close: Duration,
    pub immediate_close_limit: u32,
}

impl From<&TimingConfig> for SessionTiming {
    fn from(c: &TimingConfig) -> Self {
        Self {
            keepalive_interval: Duration::from_secs(c.keepalive_interval_secs.max(1)),
            pulse_delay: Duration::from_secs(c.pulse_delay_secs),
            tick_interval: Duration::from_secs(c.tick_interval_secs.max(1)),
            stuck_threshold: Duration::from_secs(c.stuck_threshold_secs),
            auth_retry_delay: Duration::from_secs(c.auth_retry_delay_secs),
            backoff_base: Duration::from_millis(c.backoff_base_ms),
            backoff_max: Duration::from_millis(c.backoff_max_ms),
            request_timeout: Duration::from_secs(c.request_timeout_secs.max(1)),
            immediate_close: Duration::from_secs(c.immediate_close_secs),
            immediate_close_limit: c.immediate_close_limit.max(1),
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

/// Next thing the supervisor loop does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Authenticate,
    Connect,
    Backoff,
    /// Login failed with auto-retry on: wait the retry delay, then log in again.
    RetryLater,
    /// Login failed with auto-retry off: stay errored until shutdown.
    Park,
    Halt,
}

/// Why a live connection ended.
enum Disconnect {
    Closed(String),
    Failed(String),
    Stuck,
    Shutdown,
}

/// Drives one session. Construct with [`Supervisor::new`] and spawn
/// [`Supervisor::run`].
pub struct Supervisor<A, C> {
    writer: SessionWriter,
    credentials: Credentials,
    proxy: Option<ProxyEndpoint>,
    auth: Arc<A>,
    connector: Arc<C>,
    timing: SessionTiming,
    auto_retry: bool,
    cancel: CancellationToken,
    rng: StdRng,
    /// Consecutive connections that closed within `immediate_close` of opening.
    immediate_closes: u32,
    /// The current token came from a login and has not opened a socket yet.
    fresh_token: bool,
    /// The next backoff ends in a login instead of a connect.
    login_after_backoff: bool,
}

impl<A: Authenticator, C: Connector> Supervisor<A, C> {
    pub fn new(
        writer: SessionWriter,
        auth: Arc<A>,
        connector: Arc<C>,
        timing: SessionTiming,
        auto_retry: bool,
        cancel: CancellationToken,
    ) -> Self {
        let (credentials, proxy) = writer.read(|s| (s.credentials.clone(), s.proxy.clone()));
        Self {
            writer,
            credentials,
            proxy,
            auth,
            connector,
            timing,
            auto_retry,
            cancel,
            rng: StdRng::from_entropy(),
            immediate_closes: 0,
            fresh_token: false,
            login_after_backoff: false,
        }
    }

    fn id(&self) -> usize {
        self.writer.id()
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        let proxy = self
            .proxy
            .as_ref()
            .map_or_else(|| "direct".to_string(), ToString::to_string);
        info!(
            session = self.id(),
            email = %self.credentials.email,
            proxy = %proxy,
            "Session starting"
        );

        let mut step = Step::Authenticate;
        while step != Step::Halt && !self.cancel.is_cancelled() {
            step = match step {
                Step::Authenticate => self.authenticate().await,
                Step::Connect => self.connect().await,
                Step::Backoff => self.backoff().await,
                Step::RetryLater => self.retry_later().await,
                Step::Park => {
                    self.cancel.cancelled().await;
                    Step::Halt
                }
                Step::Halt => Step::Halt,
            };
        }

        self.writer.update(|s| {
            s.connection_state = ConnectionState::Disconnected;
            s.status_message = "Stopped".to_string();
        });
        info!(session = self.id(), "Session stopped");
    }

    async fn authenticate(&mut self) -> Step {
        self.writer.update(|s| {
            s.connection_state = ConnectionState::Authenticating;
            s.status_message = "Logging in".to_string();
        });

        let login = tokio::time::timeout(
            self.timing.request_timeout,
            self.auth
                .authenticate(&self.credentials, self.proxy.as_ref()),
        );
        let result = tokio::select! {
            () = self.cancel.cancelled() => return Step::Halt,
            r = login => r,
        };

        match result {
            Ok(Ok(grant)) => {
                info!(session = self.id(), user_id = %grant.user_id, "Logged in");
                let browser_id = Uuid::new_v4().to_string();
                self.immediate_closes = 0;
                self.fresh_token = true;
                self.writer.update(|s| {
                    s.user_id = Some(grant.user_id);
                    s.access_token = Some(grant.access_token);
                    s.browser_id = Some(browser_id);
                    s.status_message = "Connected successfully".to_string();
                    s.connection_state = ConnectionState::Connecting;
                });
                Step::Connect
            }
            Ok(Err(e)) => self.login_failed(&e.message),
            Err(_) => self.login_failed(&format!(
                "login timed out after {}s",
                self.timing.request_timeout.as_secs()
            )),
        }
    }

    fn login_failed(&mut self, reason: &str) -> Step {
        warn!(session = self.id(), "Login failed: {reason}");
        self.writer.update(|s| {
            s.connection_state = ConnectionState::Errored;
            s.set_error(reason);
        });
        if self.auto_retry {
            Step::RetryLater
        } else {
            Step::Park
        }
    }

    async fn retry_later(&mut self) -> Step {
        let delay = self.timing.auth_retry_delay;
        info!(
            session = self.id(),
            "Retrying login in {}s",
            delay.as_secs()
        );
        self.writer
            .update(|s| s.connection_state = ConnectionState::Disconnected);
        tokio::select! {
            () = self.cancel.cancelled() => Step::Halt,
            () = tokio::time::sleep(delay) => Step::Authenticate,
        }
    }

    async fn connect(&mut self) -> Step {
        // Always the token from the latest login.
        let Some(token) = self.writer.read(|s| s.access_token.clone()) else {
            return Step::Authenticate;
        };
        self.writer
            .update(|s| s.connection_state = ConnectionState::Connecting);

        let open = tokio::time::timeout(
            self.timing.request_timeout,
            self.connector.connect(&token, self.proxy.as_ref()),
        );
        let result = tokio::select! {
            () = self.cancel.cancelled() => return Step::Halt,
            r = open => r,
        };

        match result {
            Ok(Ok(socket)) => self.run_connected(socket).await,
            Ok(Err(e)) => self.connect_failed(&e),
            Err(_) => self.connect_failed(&TransportError::Timeout(self.timing.request_timeout)),
        }
    }

    fn connect_failed(&mut self, err: &TransportError) -> Step {
        warn!(session = self.id(), "Socket open failed: {err}");
        if err.is_unrecoverable() {
            self.writer.update(|s| {
                s.connection_state = ConnectionState::Errored;
                s.set_error(err);
            });
            return if self.auto_retry {
                Step::RetryLater
            } else {
                Step::Park
            };
        }
        self.writer.update(|s| s.set_error(err));
        if err.is_token_rejected() {
            if self.fresh_token {
                // A token rejected straight after login will be rejected
                // again; pace the next login with the reconnect backoff.
                info!(session = self.id(), "New access token rejected, logging in after backoff");
                self.login_after_backoff = true;
                return Step::Backoff;
            }
            info!(session = self.id(), "Access token rejected, logging in again");
            return Step::Authenticate;
        }
        Step::Backoff
    }

    async fn backoff(&mut self) -> Step {
        let retry = self.writer.read(|s| s.retry_count);
        let delay = backoff_delay(retry, self.timing.backoff_base, self.timing.backoff_max);
        self.writer.update(|s| {
            s.connection_state = ConnectionState::Reconnecting;
            s.retry_count = retry.saturating_add(1);
        });
        info!(
            session = self.id(),
            attempt = retry + 1,
            "Reconnecting in {}ms",
            delay.as_millis()
        );
        tokio::select! {
            () = self.cancel.cancelled() => Step::Halt,
            () = tokio::time::sleep(delay) => {
                if std::mem::take(&mut self.login_after_backoff) {
                    Step::Authenticate
                } else {
                    Step::Connect
                }
            }
        }
    }

    async fn run_connected(&mut self, socket: C::Socket) -> Step {
        let opened_at = Instant::now();
        self.fresh_token = false;
        self.writer.update(|s| {
            s.connection_state = ConnectionState::Connected;
            s.last_heartbeat_at = Some(opened_at);
            s.calculating_since = None;
            s.retry_count = 0;
        });
        info!(session = self.id(), "Socket open");

        let (mut sink, mut stream) = socket.split();
        let mut keepalive = Keepalive::new(
            opened_at,
            self.timing.keepalive_interval,
            self.timing.pulse_delay,
        );
        let mut watchdog = Watchdog::new(self.timing.stuck_threshold);
        let mut ticker = tokio::time::interval(self.timing.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                () = self.cancel.cancelled() => break Disconnect::Shutdown,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(text.as_str(), &mut keepalive, &mut watchdog);
                    }
                    Some(Ok(Message::Close(frame))) => break Disconnect::Closed(close_reason(frame)),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Disconnect::Failed(e.to_string()),
                    None => break Disconnect::Closed("connection ended".to_string()),
                },
                () = tokio::time::sleep_until(keepalive.next_ping_at()) => {
                    if let Err(e) = sink.send(Message::text(PING_FRAME)).await {
                        break Disconnect::Failed(format!("ping failed: {e}"));
                    }
                    keepalive.ping_sent(Instant::now());
                    debug!(session = self.id(), "Ping sent");
                }
                _ = ticker.tick() => {
                    if self.refresh_estimate(&mut watchdog) {
                        break Disconnect::Stuck;
                    }
                }
            }
        };

        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;

        match outcome {
            Disconnect::Shutdown => Step::Halt,
            Disconnect::Stuck => {
                warn!(
                    session = self.id(),
                    "No heartbeat for over {}s, forcing reconnect",
                    self.timing.stuck_threshold.as_secs()
                );
                self.immediate_closes = 0;
                self.writer.update(|s| {
                    s.connection_state = ConnectionState::Reconnecting;
                    s.calculating_since = None;
                    s.status_message = "Stuck calculating, reconnecting".to_string();
                });
                Step::Backoff
            }
            Disconnect::Closed(reason) => self.after_close(opened_at, &reason, false),
            Disconnect::Failed(reason) => self.after_close(opened_at, &reason, true),
        }
    }

    fn handle_text(&self, text: &str, keepalive: &mut Keepalive, watchdog: &mut Watchdog) {
        let msg = match parse_inbound(text) {
            Ok(msg) => msg,
            Err(anomaly) => {
                debug!(session = self.id(), "{anomaly}");
                return;
            }
        };
        let now = Instant::now();

        if let Some((total, today)) = msg.points {
            watchdog.reset();
            self.writer.update(|s| {
                s.points_total = total;
                s.points_today = today;
                if let Some(message) = &msg.message {
                    s.status_message.clone_from(message);
                }
                s.last_heartbeat_at = Some(now);
                s.calculating_since = None;
            });
            debug!(session = self.id(), total, today, "Heartbeat");
        }
        if msg.is_pulse() {
            keepalive.pulse(now);
            debug!(session = self.id(), "Pulse, keepalive delayed");
        }
    }

    /// Recompute the estimate for display. Returns `true` when the watchdog fires.
    fn refresh_estimate(&mut self, watchdog: &mut Watchdog) -> bool {
        let now = Instant::now();
        let last = self.writer.read(|s| s.last_heartbeat_at);
        let estimate = points::estimate(now, last, &mut self.rng);
        let stuck = watchdog.observe(now, estimate.is_calculating());
        let since = watchdog.calculating_since();
        self.writer.update(|s| {
            s.potential_points = estimate.potential_points;
            s.countdown = estimate.countdown;
            s.calculating_since = since;
        });
        stuck
    }

    fn after_close(&mut self, opened_at: Instant, reason: &str, failed: bool) -> Step {
        let lived = opened_at.elapsed();
        if lived < self.timing.immediate_close {
            self.immediate_closes += 1;
        } else {
            self.immediate_closes = 0;
        }
        warn!(
            session = self.id(),
            "Socket closed after {}s: {reason}",
            lived.as_secs()
        );

        self.writer.update(|s| {
            s.connection_state = ConnectionState::Reconnecting;
            if failed {
                s.set_error(reason);
            } else {
                s.status_message = format!("Disconnected: {reason}");
            }
        });

        if self.immediate_closes >= self.timing.immediate_close_limit {
            info!(
                session = self.id(),
                closes = self.immediate_closes,
                "Repeated immediate closes, logging in again"
            );
            self.immediate_closes = 0;
            return Step::Authenticate;
        }
        Step::Backoff
    }
}

fn close_reason(frame: Option<CloseFrame>) -> String {
    match frame {
        Some(f) if f.reason.is_empty() => format!("closed by server ({})", u16::from(f.code)),
        Some(f) => format!("closed by server ({}: {})", u16::from(f.code), &*f.reason),
        None => "closed by server".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use crate::session::Session;
    use crate::testing::{FakeAuth, FakeConnector, FakeLink};
    use tokio::sync::mpsc;

    const HEARTBEAT: &str = r#"{"pointsTotal":100,"pointsToday":5,"message":"Connected"}"#;

    struct Harness {
        registry: Arc<SessionRegistry>,
        auth: Arc<FakeAuth>,
        connector: Arc<FakeConnector>,
        links: mpsc::UnboundedReceiver<FakeLink>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(auth: Arc<FakeAuth>, auto_retry: bool) -> Harness {
        let registry = Arc::new(SessionRegistry::new(vec![Session::new(
            0,
            Credentials::new("a@x.io", "pw"),
            None,
        )]));
        let (connector, links) = FakeConnector::new();
        let cancel = CancellationToken::new();
        let supervisor = Supervisor::new(
            registry.writer(0).unwrap(),
            Arc::clone(&auth),
            Arc::clone(&connector),
            SessionTiming::default(),
            auto_retry,
            cancel.clone(),
        );
        let task = tokio::spawn(supervisor.run());
        Harness {
            registry,
            auth,
            connector,
            links,
            cancel,
            task,
        }
    }

    fn session(h: &Harness) -> Session {
        h.registry.get(0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn login_then_connect_with_fresh_token() {
        let mut h = start(FakeAuth::ok(), true);
        let link = h.links.recv().await.unwrap();
        assert_eq!(link.token, "token-1");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let s = session(&h);
        assert_eq!(s.connection_state, ConnectionState::Connected);
        assert_eq!(s.user_id.as_deref(), Some("user-1"));
        assert!(s.browser_id.is_some());
        assert!(s.last_heartbeat_at.is_some());
        assert_eq!(s.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_updates_points_and_status() {
        let mut h = start(FakeAuth::ok(), true);
        let link = h.links.recv().await.unwrap();
        link.inbound.send(Ok(Message::text(HEARTBEAT))).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let s = session(&h);
        assert_eq!(s.points_total, 100);
        assert_eq!(s.points_today, 5);
        assert_eq!(s.status_message, "Connected");
        assert!(!s.countdown.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_messages_are_ignored() {
        let mut h = start(FakeAuth::ok(), true);
        let link = h.links.recv().await.unwrap();
        link.inbound
            .send(Ok(Message::text(r#"{"type":"SOMETHING"}"#)))
            .unwrap();
        link.inbound.send(Ok(Message::text("garbage"))).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let s = session(&h);
        assert_eq!(s.connection_state, ConnectionState::Connected);
        assert_eq!(s.points_total, 0);
        assert_eq!(h.connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_on_interval() {
        let mut h = start(FakeAuth::ok(), true);
        let mut link = h.links.recv().await.unwrap();
        let opened = Instant::now();

        let ping = link.outbound.recv().await.unwrap();
        assert_eq!(ping.to_text().unwrap(), PING_FRAME);
        let waited = opened.elapsed();
        assert!(waited >= Duration::from_secs(60));
        assert!(waited < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_pushes_next_ping_out() {
        let mut h = start(FakeAuth::ok(), true);
        let mut link = h.links.recv().await.unwrap();
        let opened = Instant::now();
        link.inbound
            .send(Ok(Message::text(
                r#"{"pointsTotal":7,"pointsToday":1,"message":"Pulse from server"}"#,
            )))
            .unwrap();

        let ping = link.outbound.recv().await.unwrap();
        assert_eq!(ping.to_text().unwrap(), PING_FRAME);
        assert!(opened.elapsed() >= Duration::from_secs(70));
        assert_eq!(session(&h).points_total, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn close_reconnects_with_backoff_and_same_token() {
        let mut h = start(FakeAuth::ok(), true);
        let link = h.links.recv().await.unwrap();
        link.inbound.send(Ok(Message::text(HEARTBEAT))).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let closed_at = Instant::now();
        drop(link);
        let link = h.links.recv().await.unwrap();
        assert!(closed_at.elapsed() >= Duration::from_secs(1));
        assert_eq!(link.token, "token-1");
        assert_eq!(h.auth.calls(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let s = session(&h);
        assert_eq!(s.connection_state, ConnectionState::Connected);
        assert_eq!(s.retry_count, 0);
        assert_eq!(s.points_total, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_opens_back_off_exponentially() {
        let mut h = start(FakeAuth::ok(), true);
        for _ in 0..3 {
            h.connector.fail_next(TransportError::Proxy("refused".into()));
        }
        let begun = Instant::now();
        let _link = h.links.recv().await.unwrap();
        // 1s + 2s + 4s of backoff before the fourth attempt succeeds.
        let waited = begun.elapsed();
        assert!(waited >= Duration::from_secs(7));
        assert!(waited < Duration::from_secs(8));
        assert_eq!(h.connector.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_immediate_closes_trigger_login() {
        let mut h = start(FakeAuth::ok(), true);
        for _ in 0..3 {
            let link = h.links.recv().await.unwrap();
            assert_eq!(link.token, "token-1");
            drop(link);
        }
        let link = h.links.recv().await.unwrap();
        assert_eq!(h.auth.calls(), 2);
        assert_eq!(link.token, "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_handshake_triggers_login() {
        let auth = FakeAuth::ok();
        let (connector, mut links) = FakeConnector::new();
        connector.fail_next(TransportError::Rejected { status: 401 });
        let registry = Arc::new(SessionRegistry::new(vec![Session::new(
            0,
            Credentials::new("a@x.io", "pw"),
            None,
        )]));
        let cancel = CancellationToken::new();
        tokio::spawn(
            Supervisor::new(
                registry.writer(0).unwrap(),
                Arc::clone(&auth),
                connector,
                SessionTiming::default(),
                true,
                cancel.clone(),
            )
            .run(),
        );

        let link = links.recv().await.unwrap();
        assert_eq!(auth.calls(), 2);
        assert_eq!(link.token, "token-2");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_token_rejection_paces_logins() {
        let h = start(FakeAuth::ok(), true);
        for _ in 0..1000 {
            h.connector.fail_next(TransportError::Rejected { status: 401 });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.auth.calls(), 1);
        assert_eq!(h.connector.calls(), 1);

        // Logins at 0, 1, 3, 7, 15, 31, 61, 91s: backoff doubles, then caps at 30s.
        tokio::time::sleep(Duration::from_millis(119_000)).await;
        assert_eq!(h.auth.calls(), 8);
        assert_eq!(h.connector.calls(), 8);
        let s = session(&h);
        assert!(s.retry_count >= 5);
        assert!(s.status_message.starts_with("Error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_session_forces_exactly_one_reconnect() {
        let mut h = start(FakeAuth::ok(), true);
        let begun = Instant::now();
        let _first = h.links.recv().await.unwrap();

        // No heartbeats: estimate goes "Calculating" at 900s, watchdog fires
        // 60s later, then a 1s backoff.
        let _second = h.links.recv().await.unwrap();
        let waited = begun.elapsed();
        assert!(waited > Duration::from_secs(960));
        assert!(waited < Duration::from_secs(970));
        assert_eq!(h.connector.calls(), 2);
        assert_eq!(h.auth.calls(), 1);

        let third = tokio::time::timeout(Duration::from_secs(600), h.links.recv()).await;
        assert!(third.is_err());
        assert_eq!(h.connector.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn login_failure_without_retry_parks_errored() {
        let h = start(FakeAuth::failing("Invalid credentials"), false);
        tokio::time::sleep(Duration::from_secs(600)).await;

        let s = session(&h);
        assert_eq!(s.connection_state, ConnectionState::Errored);
        assert_eq!(s.status_message, "Error: Invalid credentials");
        assert_eq!(h.auth.calls(), 1);
        assert_eq!(h.connector.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn login_failure_with_retry_tries_again_later() {
        let h = start(FakeAuth::failing("Invalid credentials"), true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.auth.calls(), 1);
        assert_eq!(session(&h).connection_state, ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(178)).await;
        assert_eq!(h.auth.calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.auth.calls(), 2);
        assert_eq!(h.connector.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_reconnects() {
        let Harness {
            registry,
            connector,
            mut links,
            cancel,
            task,
            ..
        } = start(FakeAuth::ok(), true);
        let link = links.recv().await.unwrap();
        drop(link);
        // Cancel while the backoff timer is pending.
        tokio::task::yield_now().await;
        cancel.cancel();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.calls(), 1);
        let s = registry.get(0).unwrap();
        assert_eq!(s.connection_state, ConnectionState::Disconnected);
        assert_eq!(s.status_message, "Stopped");
    }

    #[test]
    fn close_reason_text() {
        assert_eq!(close_reason(None), "closed by server");
    }

    #[test]
    fn timing_from_config() {
        let timing = SessionTiming::default();
        assert_eq!(timing.keepalive_interval, Duration::from_secs(60));
        assert_eq!(timing.pulse_delay, Duration::from_secs(10));
        assert_eq!(timing.backoff_base, Duration::from_millis(1000));
        assert_eq!(timing.immediate_close_limit, 3);

        let zeroed = TimingConfig {
            tick_interval_secs: 0,
            keepalive_interval_secs: 0,
            ..TimingConfig::default()
        };
        let timing = SessionTiming::from(&zeroed);
        assert_eq!(timing.tick_interval, Duration::from_secs(1));
        assert_eq!(timing.keepalive_interval, Duration::from_secs(1));
    }
}
