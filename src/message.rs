//! # Outbound messages and encoded frames.
//!
//! A [`Message`] is what viewers receive: a JSON envelope
//! `{"type": …, "payload": …, "timestamp": …}`. It is encoded **once** into a
//! [`Frame`]; the hub clones the frame (an `Arc<str>`) into every outbox, so all
//! clients see byte-identical data.
//!
//! The hub never looks inside a frame. Publishers that already hold serialized
//! bytes can wrap them with [`Frame::from`] and skip [`Message`] entirely.
//!
//! ## Example
//! ```rust
//! use ctfhub::{Message, ScoreboardUpdate, UpdateKind};
//!
//! let msg = Message::scoreboard(ScoreboardUpdate::new(UpdateKind::Solve, "team-1", "warmup", 100));
//! let frame = msg.encode().unwrap();
//! assert!(frame.as_str().contains("\"type\":\"scoreboard_update\""));
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PublishError;

/// Top-level message type (`type` field of the envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Greeting sent to a freshly registered client.
    Connected,
    /// Scoreboard changed (solve or first blood).
    ScoreboardUpdate,
    /// Competition started, paused, resumed, ended or was frozen.
    CompetitionStatusChanged,
    /// Free-form announcement from organizers.
    Notification,
}

impl MessageKind {
    /// Same string as the serialized `type` field.
    pub fn as_label(&self) -> &'static str {
        match self {
            MessageKind::Connected => "connected",
            MessageKind::ScoreboardUpdate => "scoreboard_update",
            MessageKind::CompetitionStatusChanged => "competition_status_changed",
            MessageKind::Notification => "notification",
        }
    }
}

/// Immutable outbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message with the current timestamp.
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// `connected` greeting with a `null` payload.
    pub fn connected() -> Self {
        Self::new(MessageKind::Connected, Value::Null)
    }

    pub fn scoreboard(update: ScoreboardUpdate) -> Self {
        Self::with_payload(MessageKind::ScoreboardUpdate, &update)
    }

    pub fn notification(notice: Notification) -> Self {
        Self::with_payload(MessageKind::Notification, &notice)
    }

    pub fn competition_status(status: CompetitionStatus) -> Self {
        Self::with_payload(MessageKind::CompetitionStatusChanged, &status)
    }

    fn with_payload<T: Serialize>(kind: MessageKind, payload: &T) -> Self {
        // Plain derive(Serialize) structs with string keys cannot fail here.
        let value = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self::new(kind, value)
    }

    /// Serializes the message into a shareable frame.
    pub fn encode(&self) -> Result<Frame, PublishError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| PublishError::Encode {
                error: e.to_string(),
            })
    }
}

/// Kind of scoreboard change (`payload.type` of a `scoreboard_update`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Solve,
    FirstBlood,
}

/// Payload of a `scoreboard_update` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub team_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub challenge: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub points: i64,
    pub timestamp: DateTime<Utc>,
}

impl ScoreboardUpdate {
    pub fn new(
        kind: UpdateKind,
        team_id: impl Into<String>,
        challenge: impl Into<String>,
        points: i64,
    ) -> Self {
        Self {
            kind,
            team_id: team_id.into(),
            challenge: challenge.into(),
            points,
            timestamp: Utc::now(),
        }
    }
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Severity of an organizer [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Payload of a `notification` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Always `"notification"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub level: NoticeLevel,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NoticeLevel) -> Self {
        Self {
            kind: "notification".to_string(),
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a `competition_status_changed` message.
///
/// `status` is whatever the competition rules derived (e.g. `"running"`,
/// `"paused"`, `"ended"`); the hub only forwards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionStatus {
    pub status: String,
    pub paused: bool,
    pub frozen: bool,
    pub timestamp: DateTime<Utc>,
}

impl CompetitionStatus {
    pub fn new(status: impl Into<String>, paused: bool, frozen: bool) -> Self {
        Self {
            status: status.into(),
            paused,
            frozen,
            timestamp: Utc::now(),
        }
    }
}

/// Encoded, immutable text frame. Cloning is an `Arc` bump.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame(Arc<str>);

impl Frame {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Frame {
    fn from(s: String) -> Self {
        Frame(s.into())
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Frame(s.into())
    }
}

impl AsRef<str> for Frame {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&&*self.0).finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_envelope_shape() {
        let frame = Message::connected().encode().unwrap();
        let v: Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(v["type"], "connected");
        assert!(v["payload"].is_null());
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn test_first_blood_payload() {
        let msg = Message::scoreboard(ScoreboardUpdate::new(
            UpdateKind::FirstBlood,
            "team-7",
            "chal42",
            500,
        ));
        let v: Value = serde_json::from_str(msg.encode().unwrap().as_str()).unwrap();
        assert_eq!(v["type"], "scoreboard_update");
        assert_eq!(v["payload"]["type"], "first_blood");
        assert_eq!(v["payload"]["team_id"], "team-7");
        assert_eq!(v["payload"]["challenge"], "chal42");
        assert_eq!(v["payload"]["points"], 500);
    }

    #[test]
    fn test_empty_scoreboard_fields_are_omitted() {
        let update = ScoreboardUpdate::new(UpdateKind::Solve, "", "", 0);
        let v = serde_json::to_value(&update).unwrap();
        assert!(v.get("team_id").is_none());
        assert!(v.get("challenge").is_none());
        assert!(v.get("points").is_none());
    }

    #[test]
    fn test_notification_and_status_kinds() {
        let n = Message::notification(Notification::new("hint released", NoticeLevel::Warning));
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["type"], "notification");
        assert_eq!(v["payload"]["type"], "notification");
        assert_eq!(v["payload"]["level"], "warning");

        let s = Message::competition_status(CompetitionStatus::new("paused", true, false));
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["type"], "competition_status_changed");
        assert_eq!(v["payload"]["paused"], true);
    }

    #[test]
    fn test_frame_clone_shares_bytes() {
        let a = Frame::from("solve:chal42");
        let b = a.clone();
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str().as_ptr(), b.as_str().as_ptr()));
    }
}
