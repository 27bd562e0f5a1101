//! WebSocket upgrade into the room relay.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;

use crate::server::state::SharedState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| async move { relay.handle_connection(socket).await })
}
