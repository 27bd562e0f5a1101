//! Axum router construction.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::server::handlers;
use crate::server::state::SharedState;

/// Build the complete Axum router with all API routes and the relay
/// WebSocket endpoint.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Users API
        .route("/api/users", put(handlers::users::upsert_user_handler))
        .route(
            "/api/users/:user_id",
            delete(handlers::users::delete_user_handler),
        )
        .route(
            "/api/users/other",
            get(handlers::users::other_users_handler),
        )
        // Conversations API
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations_handler),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(handlers::messages::list_messages_handler),
        )
        // Messages API
        .route(
            "/api/messages/text",
            post(handlers::messages::send_text_handler),
        )
        // Groups API
        .route("/api/groups", post(handlers::groups::create_group_handler))
        // Relay WebSocket
        .route("/ws", get(handlers::socket::ws_handler))
        .with_state(state)
}
