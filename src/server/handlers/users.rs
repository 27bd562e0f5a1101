//! User provisioning and lookup handlers.
//!
//! Identity itself is an external collaborator; these endpoints mirror user
//! records into local storage (the original system fed them from an identity
//! provider's webhook) and answer the "who can I start a chat with" query.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::state::SharedState;
use crate::server::utils::{api_error, now_ms, user_to_json};
use crate::storage::{UserMode, UserRow};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    id: String,
    name: String,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

pub async fn upsert_user_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<UpsertUserRequest>,
) -> Response {
    if req.id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user id required");
    }

    let storage = state.storage.lock().await;
    let now = now_ms();
    let created = match storage.get_user(&req.id) {
        Ok(existing) => existing.map(|u| u.created_at),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let is_new = created.is_none();

    let row = UserRow {
        id: req.id,
        name: req.name,
        username: req.username,
        email: req.email,
        image: req.image,
        created_at: created.unwrap_or(now),
        updated_at: now,
    };

    match storage.upsert_user(&row) {
        Ok(()) => {
            crate::tlog!(
                "users: {} {}",
                if is_new { "created" } else { "updated" },
                crate::logging::user_id(&row.id)
            );
            let status = if is_new {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, axum::Json(user_to_json(&row))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn delete_user_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    let storage = state.storage.lock().await;
    match storage.delete_user(&user_id) {
        Ok(true) => {
            crate::tlog!("users: deleted {}", crate::logging::user_id(&user_id));
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"status": "ok"})),
            )
                .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct OtherUsersQuery {
    user_id: String,
    mode: String,
}

/// `getOtherUsers`: users available to start a new direct chat or to invite
/// into a group, depending on `mode`.
pub async fn other_users_handler(
    State(state): State<SharedState>,
    Query(query): Query<OtherUsersQuery>,
) -> Response {
    let mode = match query.mode.as_str() {
        "direct" => UserMode::Direct,
        "group" => UserMode::Group,
        other => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown mode '{other}' (expected 'direct' or 'group')"),
            )
        }
    };

    let storage = state.storage.lock().await;
    match storage.list_other_users(&query.user_id, mode) {
        Ok(users) => {
            let json: Vec<serde_json::Value> = users.iter().map(user_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
