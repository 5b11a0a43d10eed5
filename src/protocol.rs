/*!
 * Wire Protocol Types
 *
 * Message structures for the two WebSocket channels: the bidirectional
 * video channel (producer registration + frame stream) and the
 * server-to-client event channel (game telemetry).
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages exchanged on the video channel.
///
/// The producer sends `RegisterProducer` once, then a stream of `Frame`.
/// The server replies with `Registered`, relays `Frame` to viewers, or
/// reports `Error`. Unknown types deserialize as `Other` so a new server
/// message never breaks an older client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VideoMessage {
    RegisterProducer {
        device: String,
    },
    Frame {
        /// Base64-encoded JPEG, no data-URI prefix.
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<i64>,
    },
    Registered {
        role: String,
    },
    Error {
        message: String,
    },
    Connected {
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl VideoMessage {
    /// Producer registration handshake, sent once after socket open.
    pub fn register_producer() -> Self {
        VideoMessage::RegisterProducer {
            device: "mobile".to_string(),
        }
    }

    /// Frame message carrying an already base64-encoded JPEG.
    pub fn frame(data: String, timestamp_ms: i64) -> Self {
        VideoMessage::Frame {
            data,
            timestamp_ms: Some(timestamp_ms),
        }
    }
}

/// Motion classification for a tracked ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Stationary,
    Moving,
    Decelerating,
}

/// Per-ball snapshot from a `ball_update` message.
///
/// Ephemeral: the store replaces the whole snapshot on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallPosition {
    /// One of the 16 fixed ball identities ("cue", "1".."15" or "8" etc.).
    pub ball_name: String,
    /// X position in frame-pixel space.
    pub x: f64,
    /// Y position in frame-pixel space.
    pub y: f64,
    /// Detection confidence in [0, 1].
    pub confidence: f64,
    pub motion_state: MotionState,
}

/// Type tag for a stored game event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Shot,
    Pocket,
    Foul,
    /// Upper-cased passthrough tag for message types the client does not
    /// recognize (e.g. "STATUS").
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Shot => "SHOT",
            EventType::Pocket => "POCKET",
            EventType::Foul => "FOUL",
            EventType::Other(tag) => tag,
        }
    }

    /// Passthrough tag for an unrecognized incoming type.
    pub fn passthrough(incoming: &str) -> Self {
        EventType::Other(incoming.to_uppercase())
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A game event retained in the session event log.
#[derive(Debug, Clone)]
pub struct GameEvent {
    /// Client-assigned monotonic sequence id.
    pub id: u64,
    /// Session the event belongs to.
    pub session_id: Option<String>,
    /// Producer-assigned timestamp in milliseconds, not receipt time.
    pub timestamp_ms: i64,
    pub event_type: EventType,
    /// Free-form payload specific to the type.
    pub payload: Value,
    /// Local receipt time in milliseconds since epoch.
    pub received_at_ms: i64,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
