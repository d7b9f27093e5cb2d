//! Wire messages for focus-sync.
//!
//! Every message is UTF-8 JSON on the wire. A timer-state object has
//! no discriminator field; a session-complete object carries
//! `"type": "sessionComplete"`. [`WireMessage`] hides that asymmetry
//! behind a closed two-variant enum so the rest of the system works
//! with strongly-typed messages.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{CodecError, DeviceClass, DeviceId, SessionId};

/// The wire value of the session-complete discriminator.
const SESSION_COMPLETE_TAG: &str = "sessionComplete";

/// Current seconds since the Unix epoch, as the wire's float timestamp.
pub fn unix_now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The phase a focus timer is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No session running.
    Idle,
    /// A focus interval.
    Work,
    /// A short break between focus intervals.
    ShortBreak,
    /// A long break after a full cycle.
    LongBreak,
}

/// Why a completed session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The timer ran to its natural end.
    Completed,
    /// The user stopped the session early.
    Stopped,
    /// The user skipped the remainder of the session.
    Skipped,
}

/// A snapshot of what one device's timer is doing right now.
///
/// Ephemeral: constructed on every observable transition, consumed by
/// the coordinator, discarded after delivery. It is a signal, not a
/// record. Fixed-duration modes carry `remaining_seconds` and
/// `total_seconds`; variable-duration modes carry elapsed time only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerStateMessage {
    /// Device that produced this state change.
    #[serde(rename = "deviceID")]
    pub origin: DeviceId,
    /// Class of the originating device.
    #[serde(rename = "deviceType")]
    pub origin_class: DeviceClass,
    /// Current timer phase.
    pub phase: Phase,
    /// Identifier of the timer mode in use.
    #[serde(rename = "mode")]
    pub mode_id: String,
    /// Seconds elapsed in the current phase.
    #[serde(rename = "elapsed")]
    pub elapsed_seconds: u64,
    /// Seconds remaining; present only for fixed-duration modes.
    #[serde(rename = "timeLeft", default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
    /// Total phase length; present only for fixed-duration modes.
    #[serde(rename = "totalTime", default, skip_serializing_if = "Option::is_none")]
    pub total_seconds: Option<u64>,
    /// Whether the timer is counting.
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    /// Seconds since epoch when the origin emitted this snapshot.
    #[serde(rename = "timestamp")]
    pub emitted_at: f64,
}

impl TimerStateMessage {
    /// Whether this snapshot came from a fixed-duration mode.
    pub fn is_fixed_duration(&self) -> bool {
        self.remaining_seconds.is_some() && self.total_seconds.is_some()
    }
}

/// The minimal wire event a remote device needs to materialize a
/// durable session record.
///
/// `session_id` is globally unique and the idempotency key: the same
/// event delivered twice (once via LAN, once via cloud) must not
/// create two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCompleteEvent {
    /// Globally unique session identifier.
    #[serde(rename = "id")]
    pub session_id: SessionId,
    /// Identifier of the timer mode the session ran under.
    #[serde(rename = "mode")]
    pub mode_id: String,
    /// Human-readable mode name.
    #[serde(rename = "modeLabel")]
    pub mode_label: String,
    /// Focused seconds in the session.
    #[serde(rename = "focusSeconds")]
    pub focus_seconds: u64,
    /// Focused whole minutes, as shown in history.
    #[serde(rename = "focusMinutes")]
    pub focus_minutes: u32,
    /// Why the session ended.
    #[serde(rename = "stopReason")]
    pub stop_reason: StopReason,
    /// Opaque tags attached by the business layer; not interpreted here.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Local calendar date of the session (origin's clock).
    #[serde(rename = "sessionDate")]
    pub session_date: String,
    /// Local wall-clock time of the session (origin's clock).
    #[serde(rename = "sessionTime")]
    pub session_time: String,
    /// Seconds since epoch when the session completed.
    #[serde(rename = "createdAt")]
    pub completed_at: f64,
    /// Device that produced the session.
    #[serde(rename = "deviceID")]
    pub origin: DeviceId,
    /// Class of the originating device.
    #[serde(rename = "deviceType")]
    pub origin_class: DeviceClass,
}

/// The closed set of messages any transport can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A timer-state snapshot.
    TimerState(TimerStateMessage),
    /// A completed-session event.
    SessionComplete(SessionCompleteEvent),
}

impl WireMessage {
    /// Serialize to the UTF-8 JSON wire form.
    ///
    /// Timer state is a bare object; session complete gets the
    /// `"type": "sessionComplete"` discriminator injected.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            WireMessage::TimerState(msg) => serde_json::to_vec(msg).map_err(CodecError::Encode),
            WireMessage::SessionComplete(event) => {
                let mut value = serde_json::to_value(event).map_err(CodecError::Encode)?;
                value["type"] = serde_json::Value::String(SESSION_COMPLETE_TAG.to_string());
                serde_json::to_vec(&value).map_err(CodecError::Encode)
            }
        }
    }

    /// Deserialize from the UTF-8 JSON wire form.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: serde_json::Value = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
        match value.get("type").and_then(|t| t.as_str()) {
            None => serde_json::from_value(value)
                .map(WireMessage::TimerState)
                .map_err(CodecError::Decode),
            Some(SESSION_COMPLETE_TAG) => serde_json::from_value(value)
                .map(WireMessage::SessionComplete)
                .map_err(CodecError::Decode),
            Some(other) => Err(CodecError::UnknownType(other.to_string())),
        }
    }

    /// The device that originally produced this message.
    ///
    /// Preserved across bridging hops: a re-emitted message keeps the
    /// origin of the device that actually produced the change.
    pub fn origin(&self) -> DeviceId {
        match self {
            WireMessage::TimerState(msg) => msg.origin,
            WireMessage::SessionComplete(event) => event.origin,
        }
    }

    /// Seconds since epoch when the origin emitted this message.
    pub fn emitted_at(&self) -> f64 {
        match self {
            WireMessage::TimerState(msg) => msg.emitted_at,
            WireMessage::SessionComplete(event) => event.completed_at,
        }
    }
}
