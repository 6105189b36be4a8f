//! Inbound frame classification and the outbound keepalive frame.
//!
//! The server pushes `{pointsTotal, pointsToday, message}`; a `message` of
//! [`PULSE_MESSAGE`] delays the next ping. Anything else is a
//! [`ProtocolAnomaly`] that the supervisor logs and drops.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolAnomaly;

/// Server text that pauses the keepalive cadence.
pub const PULSE_MESSAGE: &str = "Pulse from server";

/// Keepalive frame sent by the client.
pub const PING_FRAME: &str = r#"{"type":"PING"}"#;

/// Recognised server push.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// `(pointsTotal, pointsToday)` when the push carried point fields.
    pub points: Option<(u64, u64)>,
    pub message: Option<String>,
}

impl Inbound {
    pub fn is_pulse(&self) -> bool {
        self.message.as_deref() == Some(PULSE_MESSAGE)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    points_total: Option<Value>,
    points_today: Option<Value>,
    message: Option<String>,
}

/// Classify one text frame. Anything that is neither a point update nor a
/// pulse is a [`ProtocolAnomaly`].
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolAnomaly> {
    let raw: RawInbound =
        serde_json::from_str(text).map_err(|_| ProtocolAnomaly(truncate(text)))?;

    let points = match (raw.points_total, raw.points_today) {
        (Some(total), Some(today)) => Some((
            points_value(&total).ok_or_else(|| ProtocolAnomaly(truncate(text)))?,
            points_value(&today).ok_or_else(|| ProtocolAnomaly(truncate(text)))?,
        )),
        (None, None) => None,
        _ => return Err(ProtocolAnomaly(truncate(text))),
    };

    let inbound = Inbound {
        points,
        message: raw.message,
    };
    if inbound.points.is_none() && !inbound.is_pulse() {
        return Err(ProtocolAnomaly(truncate(text)));
    }
    Ok(inbound)
}

/// Points arrive as integers, but some deployments send floats.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn points_value(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 {
        Some(f.round() as u64)
    } else {
        None
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 120;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
