//! Group conversation creation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, conversation_to_json, generate_id, now_ms};
use crate::storage::{ConversationMemberRow, ConversationRow};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    name: String,
    creator_id: String,
    member_ids: Vec<String>,
}

/// `createGroup`: a named group conversation; the creator joins with role
/// `admin`, every listed member with role `member`.
pub async fn create_group_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateGroupRequest>,
) -> Response {
    if req.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "group name required");
    }
    if req.creator_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "creatorId required");
    }

    let storage = state.storage.lock().await;
    let now = now_ms();

    let conversation = ConversationRow {
        id: generate_id(),
        is_group: true,
        name: Some(req.name.clone()),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = storage.insert_conversation(&conversation) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let mut members = vec![(req.creator_id.clone(), "admin")];
    for member_id in &req.member_ids {
        if *member_id != req.creator_id {
            members.push((member_id.clone(), "member"));
        }
    }
    for (user_id, role) in &members {
        let member = ConversationMemberRow {
            conversation_id: conversation.id.clone(),
            user_id: user_id.clone(),
            role: (*role).to_string(),
            joined_at: now,
        };
        if let Err(e) = storage.insert_member(&member) {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    crate::tlog!(
        "groups: {} created '{}' with {} member(s)",
        crate::logging::user_id(&req.creator_id),
        req.name,
        members.len()
    );

    match storage.list_members(&conversation.id) {
        Ok(listed) => {
            let body = conversation_to_json(&crate::storage::ConversationWithMembers {
                conversation,
                members: listed,
            });
            (StatusCode::CREATED, axum::Json(body)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
