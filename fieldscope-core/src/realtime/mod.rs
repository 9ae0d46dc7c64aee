//! Push-notification channel
//!
//! The gateway exposes one notification endpoint per (token, field) scope,
//! delivering JSON frames shaped `{ "type": "reading" | "alert", "data":
//! {...} }`. [`channel::subscribe`] opens that endpoint on a background
//! task and yields a typed event stream; consumers drain
//! [`RealtimeEvent`]s instead of wiring socket callbacks.
//!
//! Malformed or unrecognized frames are logged and skipped without
//! disturbing the connection.

pub mod channel;

pub use channel::{subscribe, RealtimeHandle};

use std::time::Duration;

use serde::Deserialize;

use crate::types::{Alert, AlertPayload, Reading};

/// Event yielded by a realtime subscription.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// The socket opened for this scope
    Connected,
    /// One telemetry reading pushed by the gateway
    Reading(Reading),
    /// A rule fired; already normalized and stamped with arrival time
    Alert(Alert),
    /// The connection dropped and a retry is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// The connection is gone for good: retries exhausted or disabled
    ConnectionLost { reason: String },
}

/// Wire envelope around every pushed frame.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

/// Decode one text frame into an event.
///
/// Returns `None` for anything that should be skipped: malformed JSON,
/// unknown frame types, or a payload that does not match its tag.
fn parse_frame(text: &str) -> Option<RealtimeEvent> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed realtime frame");
            return None;
        }
    };

    match frame.kind.as_str() {
        "reading" => match serde_json::from_value::<Reading>(frame.data) {
            Ok(reading) => Some(RealtimeEvent::Reading(reading)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring reading frame with bad payload");
                None
            }
        },
        "alert" => match serde_json::from_value::<AlertPayload>(frame.data) {
            Ok(payload) => Some(RealtimeEvent::Alert(Alert::from_payload(payload))),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring alert frame with bad payload");
                None
            }
        },
        other => {
            tracing::debug!(kind = other, "Ignoring unknown realtime frame type");
            None
        }
    }
}
