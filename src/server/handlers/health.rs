//! Health check handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "wsConnections": state.relay.connection_count(),
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}
