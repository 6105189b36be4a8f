//! Local estimate of points accrued since the last server heartbeat.
//!
//! The service credits up to [`MAX_POINTS`] per [`WINDOW`] of connection and
//! pushes the real totals with each heartbeat. Between heartbeats the display
//! shows a linear projection. The estimate is always derived from the last
//! heartbeat time, never accumulated tick by tick, so it cannot drift.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Accrual window between heartbeats.
pub const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Points credited for a full window.
pub const MAX_POINTS: f64 = 25.0;

/// Countdown text shown while no estimate is possible (no heartbeat yet, or overdue).
pub const CALCULATING: &str = "Calculating";

/// Chance per tick that a bonus is added to the projection.
const BONUS_PROBABILITY: f64 = 0.1;

/// Largest bonus added in one tick.
const MAX_BONUS: f64 = 2.0;

/// Result of one estimator tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub potential_points: f64,
    pub countdown: String,
}

impl Estimate {
    fn calculating(potential_points: f64) -> Self {
        Self {
            potential_points,
            countdown: CALCULATING.to_string(),
        }
    }

    /// True when the countdown shows the "Calculating" sentinel.
    pub fn is_calculating(&self) -> bool {
        self.countdown == CALCULATING
    }
}

/// Project potential points at `now` given the last heartbeat.
///
/// `rng` drives the occasional bonus; pass a seeded or mock generator for
/// reproducible results.
pub fn estimate<R: Rng + ?Sized>(
    now: Instant,
    last_heartbeat_at: Option<Instant>,
    rng: &mut R,
) -> Estimate {
    let Some(last) = last_heartbeat_at else {
        return Estimate::calculating(0.0);
    };

    let elapsed = now.saturating_duration_since(last);
    if elapsed >= WINDOW {
        return Estimate::calculating(MAX_POINTS);
    }

    let fraction = elapsed.as_secs_f64() / WINDOW.as_secs_f64();
    let mut points = round2((fraction * MAX_POINTS).min(MAX_POINTS));
    if rng.gen_bool(BONUS_PROBABILITY) {
        let bonus = rng.gen_range(0.0..=MAX_BONUS);
        points = round2((points + bonus).min(MAX_POINTS));
    }

    Estimate {
        potential_points: points,
        countdown: format_countdown(WINDOW - elapsed),
    }
}

/// `"{m}m {s}s"`, whole seconds rounded down.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
