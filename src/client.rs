//! Client-side chat state: reconciliation of paginated history with live
//! socket events, the typing-user set, the typing debounce, and the
//! active-chat switch routine.
//!
//! Everything here is transport-free and clock-injected so it can be driven
//! deterministically from tests; the network halves live in [`crate::transport`].

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::protocol::{content_id, ms_from_iso, ClientEvent, ServerEvent};
use crate::rooms::{room_name, ChatTarget};

/// Trailing-edge typing debounce window.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(1000);

/// A message as the client renders it.  History rows and live events are
/// both normalized into this shape; `created_at` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub created_at: i64,
}

/// Merge history pages with the live buffer into one view: deduplicated by
/// message id (last occurrence wins), sorted ascending by creation time
/// (ties broken by id).  Idempotent and order-independent in its inputs.
pub fn reconcile(history: &[ChatMessage], live: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut by_id: HashMap<&str, &ChatMessage> = HashMap::new();
    for message in history.iter().chain(live) {
        by_id.insert(&message.id, message);
    }
    let mut merged: Vec<ChatMessage> = by_id.into_values().cloned().collect();
    merged.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// Output of the typing debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Started,
    Stopped,
}

/// Trailing-edge debounce with a fixed window: every non-empty keystroke
/// signals `Started` and re-arms the timer; the timer's expiry signals
/// `Stopped`; an empty input signals `Stopped` immediately and disarms.
#[derive(Debug)]
pub struct TypingDebounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(TYPING_DEBOUNCE)
    }
}

impl TypingDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Feed one keystroke's resulting input text.
    pub fn on_input(&mut self, text: &str, now: Instant) -> TypingSignal {
        if text.trim().is_empty() {
            self.deadline = None;
            TypingSignal::Stopped
        } else {
            self.deadline = Some(now + self.window);
            TypingSignal::Started
        }
    }

    /// Poll the timer.  Returns `Stopped` exactly once per quiet period.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(TypingSignal::Stopped)
            }
            _ => None,
        }
    }

    /// Disarm without signalling (used when a send already emitted the
    /// stop event).
    pub fn reset(&mut self) {
        self.deadline = None;
    }

    /// The next instant `poll` could fire, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// The two writes a message send performs, in emit order: the socket
/// broadcast first (live UX), then the REST persistence call, then the
/// trailing `stop-typing`.  The ordering matters for responsiveness only;
/// the writes are independent.
#[derive(Debug, Clone, PartialEq)]
pub struct SendPlan {
    pub broadcast: ClientEvent,
    pub persist: PersistRequest,
    pub stop_typing: ClientEvent,
}

/// Body of the `sendTextMessage` REST call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistRequest {
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub content: String,
}

/// Per-user chat session state: the active chat, its room, the live message
/// buffer, and who is currently typing.
pub struct ChatSession {
    user_id: String,
    user_name: String,
    chat: Option<ChatTarget>,
    current_room: Option<String>,
    live: Vec<ChatMessage>,
    typing: HashSet<String>,
    debounce: TypingDebounce,
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            chat: None,
            current_room: None,
            live: Vec::new(),
            typing: HashSet::new(),
            debounce: TypingDebounce::default(),
        }
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn live_messages(&self) -> &[ChatMessage] {
        &self.live
    }

    pub fn typing_users(&self) -> &HashSet<String> {
        &self.typing
    }

    /// The reconciled view for rendering.
    pub fn view(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        reconcile(history, &self.live)
    }

    /// Switch the active chat.
    ///
    /// Clears the live buffer and the typing set (stale-data avoidance) and
    /// returns the events to emit: `leave-room` for the previous room (when
    /// there was one), then `join-room` for the new one.  The new room name
    /// is tracked so the next switch can leave it correctly.
    pub fn switch_chat(&mut self, chat: Option<ChatTarget>) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        if let Some(previous) = self.current_room.take() {
            events.push(ClientEvent::LeaveRoom {
                room_name: previous,
            });
        }

        self.live.clear();
        self.typing.clear();
        self.debounce.reset();

        self.current_room = room_name(chat.as_ref(), &self.user_id);
        self.chat = chat;

        if let Some(room) = &self.current_room {
            events.push(ClientEvent::JoinRoom {
                room_name: room.clone(),
                user_id: self.user_id.clone(),
                chat_details: serde_json::Value::Null,
            });
        }

        events
    }

    /// Feed one keystroke's resulting input text; returns the typing event
    /// to emit, if any.
    pub fn input_changed(&mut self, text: &str, now: Instant) -> Option<ClientEvent> {
        let room = self.current_room.clone()?;
        match self.debounce.on_input(text, now) {
            TypingSignal::Started => Some(ClientEvent::TypingIndicator {
                room_name: room,
                user_id: self.user_id.clone(),
                user_name: self.user_name.clone(),
            }),
            TypingSignal::Stopped => Some(ClientEvent::StopTyping {
                room_name: room,
                user_id: self.user_id.clone(),
            }),
        }
    }

    /// Poll the debounce timer; emits the trailing `stop-typing` when the
    /// quiet period elapses.
    pub fn tick(&mut self, now: Instant) -> Option<ClientEvent> {
        let room = self.current_room.clone()?;
        match self.debounce.poll(now)? {
            TypingSignal::Stopped => Some(ClientEvent::StopTyping {
                room_name: room,
                user_id: self.user_id.clone(),
            }),
            TypingSignal::Started => None,
        }
    }

    /// Plan a message send for the active chat.  Returns `None` when no
    /// chat is active or the content is blank.
    pub fn compose_send(&mut self, content: &str) -> Option<SendPlan> {
        let chat = self.chat.as_ref()?;
        let room = self.current_room.clone()?;
        if content.trim().is_empty() {
            return None;
        }

        let conversation_id = chat.conversation_id().map(str::to_string);
        let recipient_id = match chat {
            ChatTarget::Direct { other_user_id } => Some(other_user_id.clone()),
            ChatTarget::Conversation { .. } => None,
        };

        self.debounce.reset();

        Some(SendPlan {
            broadcast: ClientEvent::SendMessage {
                room_name: room.clone(),
                user_id: self.user_id.clone(),
                content: content.to_string(),
                conversation_id: conversation_id.clone(),
            },
            persist: PersistRequest {
                sender_id: self.user_id.clone(),
                conversation_id,
                recipient_id,
                content: content.to_string(),
            },
            stop_typing: ClientEvent::StopTyping {
                room_name: room,
                user_id: self.user_id.clone(),
            },
        })
    }

    /// Apply one server event to local state.
    ///
    /// Live messages carry no database id, so a content-addressed id is
    /// derived for deduplication; the same broadcast seen twice collapses to
    /// one entry.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::MessageReceived {
                room_name,
                user_id,
                content,
                timestamp,
                conversation_id,
            } => {
                if self.current_room.as_deref() != Some(room_name.as_str()) {
                    return;
                }
                let id = content_id(&[room_name, user_id, timestamp, content].map(String::as_str));
                self.live.push(ChatMessage {
                    id,
                    conversation_id: conversation_id.clone(),
                    sender_id: user_id.clone(),
                    content: content.clone(),
                    created_at: ms_from_iso(timestamp).unwrap_or_default(),
                });
            }
            ServerEvent::UserTyping { user_id, .. } => {
                self.typing.insert(user_id.clone());
            }
            ServerEvent::UserStoppedTyping { user_id, .. } => {
                self.typing.remove(user_id);
            }
            // Presence and error events don't alter the reconciled view.
            _ => {}
        }
    }
}
