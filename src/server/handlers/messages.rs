//! Message listing and sending handlers.
//!
//! This is the durable half of message delivery.  The live half is the
//! relay's `send-message` fan-out, which the client emits separately; the
//! two writes are independent and unordered.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, generate_id, message_to_json, now_ms};
use crate::storage::{ConversationMemberRow, ConversationRow, MessageRow, StorageError};

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    limit: Option<u32>,
    cursor: Option<String>,
}

/// `getMessages`: one page for a conversation, newest first, plus an opaque
/// cursor for the next page.
pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Response {
    let before = match query.cursor.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid cursor"),
        },
    };
    let limit = query.limit.unwrap_or(50);

    let storage = state.storage.lock().await;
    match storage.list_messages(&conversation_id, limit, before) {
        Ok(page) => {
            let messages: Vec<serde_json::Value> =
                page.messages.iter().map(message_to_json).collect();
            let body = serde_json::json!({
                "messages": messages,
                "nextCursor": page.next_cursor.map(|c| c.to_string()),
            });
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    sender_id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    recipient_id: Option<String>,
    content: String,
}

/// `sendTextMessage`: append a text message to an existing conversation, or
/// — when called with a recipient instead — create the direct conversation
/// (two member rows) and its first message in one request.
pub async fn send_text_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SendTextRequest>,
) -> Response {
    if req.content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content cannot be empty");
    }
    if req.conversation_id.is_none() && req.recipient_id.is_none() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "conversationId or recipientId required",
        );
    }

    let storage = state.storage.lock().await;
    let now = now_ms();

    let conversation_id = match (&req.conversation_id, &req.recipient_id) {
        (Some(id), _) => id.clone(),
        (None, Some(recipient_id)) => {
            let conversation = ConversationRow {
                id: generate_id(),
                is_group: false,
                name: None,
                created_at: now,
                updated_at: now,
            };
            if let Err(e) = storage.insert_conversation(&conversation) {
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
            for user_id in [&req.sender_id, recipient_id] {
                let member = ConversationMemberRow {
                    conversation_id: conversation.id.clone(),
                    user_id: user_id.clone(),
                    role: "member".to_string(),
                    joined_at: now,
                };
                if let Err(e) = storage.insert_member(&member) {
                    return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
            }
            crate::tlog!(
                "messages: created direct conversation {} for {} and {}",
                conversation.id,
                crate::logging::user_id(&req.sender_id),
                crate::logging::user_id(recipient_id)
            );
            conversation.id
        }
        (None, None) => unreachable!("validated above"),
    };

    let message = MessageRow {
        id: generate_id(),
        conversation_id,
        sender_id: req.sender_id.clone(),
        content: req.content.clone(),
        message_type: "text".to_string(),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    match storage.insert_message(&message) {
        Ok(()) => {
            crate::tlog!(
                "messages: {} from {} in conversation {}",
                crate::logging::msg_id(&message.id),
                crate::logging::user_id(&message.sender_id),
                message.conversation_id
            );
            (StatusCode::CREATED, axum::Json(message_to_json(&message))).into_response()
        }
        Err(StorageError::NotFound(what)) => api_error(StatusCode::NOT_FOUND, what),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
