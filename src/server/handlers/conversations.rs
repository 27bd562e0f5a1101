//! Conversation listing handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, conversation_to_json};

#[derive(Deserialize)]
pub struct ConversationsQuery {
    user_id: String,
}

/// `getConversations`: every conversation the user belongs to, with the
/// full member list attached so clients can render names and avatars.
pub async fn list_conversations_handler(
    State(state): State<SharedState>,
    Query(query): Query<ConversationsQuery>,
) -> Response {
    let storage = state.storage.lock().await;
    match storage.list_conversations(&query.user_id) {
        Ok(conversations) => {
            let json: Vec<serde_json::Value> =
                conversations.iter().map(conversation_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
