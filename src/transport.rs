//! Client-side transport: blocking REST helpers for the persistence API and
//! a typed WebSocket attachment for the relay event stream.
//!
//! These functions encapsulate the two independent write paths a chat client
//! uses: the REST calls that make messages durable, and the socket that
//! makes them live.

use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::client::{ChatMessage, PersistRequest};
use crate::protocol::{ms_from_iso, ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

/// Message shape returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMessage {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    created_at: String,
}

impl ApiMessage {
    fn into_chat_message(self) -> ChatMessage {
        ChatMessage {
            created_at: ms_from_iso(&self.created_at).unwrap_or_default(),
            id: self.id,
            conversation_id: Some(self.conversation_id),
            sender_id: self.sender_id,
            content: self.content,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMessagesPage {
    messages: Vec<ApiMessage>,
    next_cursor: Option<String>,
}

/// One REST page of history plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub next_cursor: Option<String>,
}

/// Persist a message via `sendTextMessage`.  Independent of (and unordered
/// with) the socket broadcast for the same logical message.
pub fn send_text_message(
    base_url: &str,
    request: &PersistRequest,
) -> Result<ChatMessage, String> {
    let url = format!("{}/api/messages/text", base_url.trim_end_matches('/'));
    let json_val =
        serde_json::to_value(request).map_err(|e| format!("failed to serialize request: {e}"))?;
    let message: ApiMessage = ureq::post(&url)
        .send_json(json_val)
        .map_err(|e| format!("send POST failed: {e}"))?
        .into_json()
        .map_err(|e| format!("deserialize message: {e}"))?;
    Ok(message.into_chat_message())
}

/// Fetch one page of history for a conversation (newest first).
pub fn fetch_messages(
    base_url: &str,
    conversation_id: &str,
    limit: u32,
    cursor: Option<&str>,
) -> Result<HistoryPage, String> {
    let base = base_url.trim_end_matches('/');
    let mut url = format!("{base}/api/conversations/{conversation_id}/messages?limit={limit}");
    if let Some(cursor) = cursor {
        url.push_str(&format!("&cursor={cursor}"));
    }
    let page: ApiMessagesPage = ureq::get(&url)
        .call()
        .map_err(|e| format!("history fetch failed: {e}"))?
        .into_json()
        .map_err(|e| format!("deserialize page: {e}"))?;
    Ok(HistoryPage {
        messages: page
            .messages
            .into_iter()
            .map(ApiMessage::into_chat_message)
            .collect(),
        next_cursor: page.next_cursor,
    })
}

/// Fetch conversations for a user, as raw JSON (shape documented by the
/// conversations endpoint).
pub fn list_conversations(base_url: &str, user_id: &str) -> Result<serde_json::Value, String> {
    let base = base_url.trim_end_matches('/');
    let url = format!("{base}/api/conversations?user_id={user_id}");
    ureq::get(&url)
        .call()
        .map_err(|e| format!("conversations fetch failed: {e}"))?
        .into_json()
        .map_err(|e| format!("deserialize conversations: {e}"))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A typed connection to the relay's `/ws` endpoint.
pub struct Socket {
    inner: WsStream,
}

impl Socket {
    /// Connect to the relay of the server at `base_url` (an `http://` or
    /// `https://` origin).
    pub async fn connect(base_url: &str) -> Result<Self, String> {
        let origin = base_url.trim_end_matches('/');
        let ws_url = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}/ws")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}/ws")
        } else {
            return Err(format!("unsupported url scheme: {origin}"));
        };

        let (inner, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| format!("websocket connect failed: {e}"))?;
        Ok(Self { inner })
    }

    /// Emit one client event.
    pub async fn emit(&mut self, event: &ClientEvent) -> Result<(), String> {
        let text =
            serde_json::to_string(event).map_err(|e| format!("serialize event: {e}"))?;
        self.inner
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| format!("websocket send failed: {e}"))
    }

    /// Send a raw text frame, bypassing event serialization.  Exists for
    /// tests that exercise the relay's tolerance of malformed input.
    pub async fn emit_raw(&mut self, text: &str) -> Result<(), String> {
        self.inner
            .send(WsMessage::Text(text.to_string()))
            .await
            .map_err(|e| format!("websocket send failed: {e}"))
    }

    /// Receive the next server event.  Returns `None` when the connection
    /// closes.  Non-text frames are skipped; unparseable text is an error.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, String> {
        loop {
            match self.inner.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map(Some)
                        .map_err(|e| format!("unparseable server event: {e}"));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(format!("websocket receive failed: {e}")),
            }
        }
    }

    /// Close the connection.
    pub async fn close(mut self) {
        let _ = self.inner.close(None).await;
    }
}
