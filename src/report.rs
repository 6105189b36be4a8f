//! Status reporter: the display sink.
//!
//! Logs the selected session whenever its visible state changes and a fleet
//! summary on a fixed interval. Estimator ticks alone (countdown, potential
//! points) do not produce a line.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tracing::{debug, info};

use crate::registry::{RegistryEvent, SessionRegistry};
use crate::session::{ConnectionState, Session};

/// Fields of the selected session worth a log line when they change.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Headline {
    id: usize,
    state: ConnectionState,
    points_total: u64,
    points_today: u64,
    status: String,
}

impl Headline {
    fn of(s: &Session) -> Self {
        Self {
            id: s.id,
            state: s.connection_state,
            points_total: s.points_total,
            points_today: s.points_today,
            status: s.status_message.clone(),
        }
    }
}

/// Aggregate view of every session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSummary {
    pub sessions: usize,
    pub connected: usize,
    pub errored: usize,
    pub points_total: u64,
    pub points_today: u64,
    pub potential_points: f64,
}

pub fn summarize(sessions: &[Session]) -> FleetSummary {
    sessions.iter().fold(
        FleetSummary {
            sessions: sessions.len(),
            ..FleetSummary::default()
        },
        |mut acc, s| {
            match s.connection_state {
                ConnectionState::Connected => acc.connected += 1,
                ConnectionState::Errored => acc.errored += 1,
                _ => {}
            }
            acc.points_total += s.points_total;
            acc.points_today += s.points_today;
            acc.potential_points += s.potential_points;
            acc
        },
    )
}

/// Spawn the reporter. An `interval` of zero disables the periodic summary.
pub fn spawn(registry: Arc<SessionRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(run(registry, interval))
}

async fn run(registry: Arc<SessionRegistry>, interval: Duration) {
    let mut events = registry.subscribe();
    let mut summary = (!interval.is_zero()).then(|| tokio::time::interval(interval));
    let mut last: Option<Headline> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RegistryEvent::SelectionChanged(_)) => {
                    last = None;
                    report_selected(&registry, &mut last);
                }
                Ok(RegistryEvent::SessionChanged(id)) if id == registry.selected_index() => {
                    report_selected(&registry, &mut last);
                }
                Ok(RegistryEvent::SessionChanged(_)) => {}
                Err(RecvError::Lagged(n)) => {
                    debug!("Reporter skipped {n} events");
                    report_selected(&registry, &mut last);
                }
                Err(RecvError::Closed) => break,
            },
            () = next_tick(&mut summary) => {
                let s = summarize(&registry.snapshot_all());
                info!(
                    sessions = s.sessions,
                    connected = s.connected,
                    errored = s.errored,
                    points_total = s.points_total,
                    points_today = s.points_today,
                    "Fleet: {:.2} potential points pending",
                    s.potential_points
                );
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Log the selected session if its headline differs from `last`.
fn report_selected(registry: &SessionRegistry, last: &mut Option<Headline>) {
    let Some(session) = registry.selected() else {
        return;
    };
    let headline = Headline::of(&session);
    if last.as_ref() == Some(&headline) {
        return;
    }
    info!(
        session = session.id,
        email = %session.email(),
        state = %session.connection_state,
        points_total = session.points_total,
        points_today = session.points_today,
        countdown = %session.countdown,
        "{}",
        session.status_message
    );
    *last = Some(headline);
}
