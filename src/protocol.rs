//! Socket event types for the room relay.
//!
//! ## Wire format
//! - Frames are JSON objects tagged with an `"event"` field; event names are
//!   kebab-case and payload fields are camelCase, matching the original
//!   client contract.
//! - All timestamps are ISO-8601 strings generated server-side at broadcast
//!   time.
//! - Live message events carry no database id; clients derive a
//!   content-addressed id (see [`content_id`]) so reconciliation has a stable
//!   dedup key.
//!
//! These types are intentionally small and self-contained so the server
//! relay, the client session, and the integration tests all speak exactly the
//! same frames.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Events a client sends to the relay.
///
/// Identifier fields default to empty strings on deserialization: the relay
/// tolerates malformed payloads and broadcasts whatever was supplied rather
/// than rejecting the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        #[serde(default)]
        room_name: String,
        #[serde(default)]
        user_id: String,
        /// Conversation or user object the client has open.  Opaque to the
        /// relay; accepted and ignored.
        #[serde(default, skip_serializing_if = "Value::is_null")]
        chat_details: Value,
    },
    LeaveRoom {
        #[serde(default)]
        room_name: String,
    },
    SendMessage {
        #[serde(default)]
        room_name: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    TypingIndicator {
        #[serde(default)]
        room_name: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        user_name: String,
    },
    StopTyping {
        #[serde(default)]
        room_name: String,
        #[serde(default)]
        user_id: String,
    },
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    UserJoined {
        user_id: String,
        room_name: String,
        timestamp: String,
    },
    UserLeft {
        user_id: String,
        room_name: String,
        timestamp: String,
    },
    /// Reply to the joining connection only.
    RoomInfo {
        member_count: usize,
        room_name: String,
    },
    /// Fan-out of `send-message`, delivered to every member including the
    /// sender.
    MessageReceived {
        room_name: String,
        user_id: String,
        content: String,
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Delivered to the sender only when a `send-message` handler fails.
    MessageError {
        error: String,
        timestamp: String,
    },
    UserTyping {
        user_id: String,
        user_name: String,
        room_name: String,
        timestamp: String,
    },
    UserStoppedTyping {
        user_id: String,
        room_name: String,
        timestamp: String,
    },
}

/// Current wall-clock time as an ISO-8601 string with millisecond precision,
/// e.g. `2026-08-06T09:12:45.123Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert an epoch-millisecond timestamp (the storage representation) to an
/// ISO-8601 string.  Out-of-range values fall back to the epoch.
pub fn iso_from_ms(ms: i64) -> String {
    chrono::DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp into epoch milliseconds.  Returns `None` for
/// unparseable input.
pub fn ms_from_iso(timestamp: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Derive a content-addressed identifier from an event's identifying fields.
///
/// SHA-256 over the parts joined with `\n`, encoded as URL-safe base64
/// without padding.  Used by clients to give live message events a stable
/// dedup key, since the relay does not assign database ids.
pub fn content_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_bytes());
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
