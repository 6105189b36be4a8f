//! Pure timing rules used by the supervisor loop: reconnect backoff, keepalive
//! scheduling, and the stuck-session watchdog. None of these sleep; the loop
//! asks them for deadlines and decisions.

use std::time::Duration;

use tokio::time::Instant;

/// `min(base * 2^retry_count, max)`.
pub fn backoff_delay(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry_count);
    base.saturating_mul(factor).min(max)
}

/// When the next `PING` is due.
#[derive(Debug, Clone)]
pub struct Keepalive {
    interval: Duration,
    pulse_delay: Duration,
    next_ping_at: Instant,
}

impl Keepalive {
    /// Keepalive starting at socket open; first ping one interval later.
    pub fn new(opened_at: Instant, interval: Duration, pulse_delay: Duration) -> Self {
        Self {
            interval,
            pulse_delay,
            next_ping_at: opened_at + interval,
        }
    }

    pub fn next_ping_at(&self) -> Instant {
        self.next_ping_at
    }

    pub fn ping_sent(&mut self, now: Instant) {
        self.next_ping_at = now + self.interval;
    }

    /// A server pulse pauses keepalive: the interval restarts only after
    /// `pulse_delay`, so the next ping lands at `now + pulse_delay + interval`.
    pub fn pulse(&mut self, now: Instant) {
        self.next_ping_at = now + self.pulse_delay + self.interval;
    }
}

/// Detects sessions whose estimator has been stuck in "Calculating".
#[derive(Debug, Clone)]
pub struct Watchdog {
    threshold: Duration,
    calculating_since: Option<Instant>,
}

impl Watchdog {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            calculating_since: None,
        }
    }

    pub fn calculating_since(&self) -> Option<Instant> {
        self.calculating_since
    }

    /// Heartbeat arrived.
    pub fn reset(&mut self) {
        self.calculating_since = None;
    }

    /// Feed one tick. Returns `true` once when the session has been
    /// calculating for longer than the threshold; the clock then restarts.
    pub fn observe(&mut self, now: Instant, calculating: bool) -> bool {
        if !calculating {
            self.calculating_since = None;
            return false;
        }
        let since = *self.calculating_since.get_or_insert(now);
        if now.saturating_duration_since(since) > self.threshold {
            self.calculating_since = None;
            return true;
        }
        false
    }
}
