//! Shared utility functions for the server handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::Rng;

use crate::protocol::iso_from_ms;
use crate::storage::{ConversationWithMembers, MessageRow, UserRow};

/// Length of generated row ids (nanoid format).
const ID_LEN: usize = 21;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a random 21-character id for a persisted row.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Current time as milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// JSON representation of a user (camelCase wire contract).
pub fn user_to_json(u: &UserRow) -> serde_json::Value {
    serde_json::json!({
        "id": u.id,
        "name": u.name,
        "username": u.username,
        "email": u.email,
        "image": u.image,
        "createdAt": iso_from_ms(u.created_at),
        "updatedAt": iso_from_ms(u.updated_at),
    })
}

/// JSON representation of a message.
pub fn message_to_json(m: &MessageRow) -> serde_json::Value {
    serde_json::json!({
        "id": m.id,
        "conversationId": m.conversation_id,
        "senderId": m.sender_id,
        "content": m.content,
        "messageType": m.message_type,
        "isDeleted": m.is_deleted,
        "createdAt": iso_from_ms(m.created_at),
        "updatedAt": iso_from_ms(m.updated_at),
    })
}

/// JSON representation of a conversation with its member list, matching the
/// shape the conversation list endpoint returns.
pub fn conversation_to_json(c: &ConversationWithMembers) -> serde_json::Value {
    let members: Vec<serde_json::Value> = c
        .members
        .iter()
        .map(|m| {
            serde_json::json!({
                "conversationId": m.member.conversation_id,
                "userId": m.member.user_id,
                "role": m.member.role,
                "joinedAt": iso_from_ms(m.member.joined_at),
                "user": m.user.as_ref().map(user_to_json),
            })
        })
        .collect();

    serde_json::json!({
        "conversation": {
            "id": c.conversation.id,
            "isGroup": c.conversation.is_group,
            "name": c.conversation.name,
            "createdAt": iso_from_ms(c.conversation.created_at),
            "updatedAt": iso_from_ms(c.conversation.updated_at),
        },
        "conversationMembers": members,
    })
}
