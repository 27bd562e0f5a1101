//! Room-based WebSocket relay: membership, presence, message fan-out, and
//! typing indicators.
//!
//! The relay holds no persistent state.  Membership lives in an explicit
//! in-memory registry (room name -> set of connection ids) owned by a single
//! [`RelayState`] instance and mutated only behind its mutex.  Each
//! connection carries at most one current subscription; a second `join-room`
//! auto-leaves the previous room before joining the new one.
//!
//! Messages are fire-and-forget: `send-message` fans out to every member of
//! the room (sender included) and never touches storage.  Durable writes are
//! the client's separate REST call.  Typing events fan out to everyone
//! except the sender.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;

use crate::logging;
use crate::protocol::{now_iso, ClientEvent, ServerEvent};

/// Shared relay handle.  Cheap to clone; all clones see the same registry.
#[derive(Clone, Default)]
pub struct RelayState {
    inner: Arc<Mutex<RelayInner>>,
    ws_connections: Arc<AtomicUsize>,
}

#[derive(Default)]
struct RelayInner {
    rooms: HashMap<String, HashSet<u64>>,
    conns: HashMap<u64, Connection>,
    next_conn_id: u64,
}

struct Connection {
    tx: mpsc::UnboundedSender<ServerEvent>,
    joined: Option<Subscription>,
}

#[derive(Clone)]
struct Subscription {
    room_name: String,
    user_id: String,
}

#[derive(Debug)]
pub enum RelayError {
    /// The sending connection is no longer registered.
    NotConnected,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::NotConnected => write!(f, "connection is not registered"),
        }
    }
}

impl std::error::Error for RelayError {}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Relaxed)
    }

    /// Drive one upgraded WebSocket until it closes.
    ///
    /// Outbound events for this connection arrive on an unbounded channel so
    /// broadcasts from other connections never block on this socket's I/O.
    pub async fn handle_connection(&self, mut socket: WebSocket) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id = {
            let mut inner = self.inner.lock().expect("relay registry lock poisoned");
            let id = inner.next_conn_id;
            inner.next_conn_id += 1;
            inner.conns.insert(id, Connection { tx, joined: None });
            id
        };
        self.ws_connections.fetch_add(1, Ordering::Relaxed);
        crate::tlog!("relay: connection {conn_id} opened");

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            let text = match serde_json::to_string(&event) {
                                Ok(t) => t,
                                Err(_) => continue,
                            };
                            if socket.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        // Registry entry gone; nothing left to deliver.
                        None => break,
                    }
                }
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(&text) {
                                Ok(event) => self.dispatch(conn_id, event),
                                Err(e) => {
                                    crate::tlog!("relay: connection {conn_id} sent unparseable frame: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }

        self.disconnect(conn_id);
        self.ws_connections.fetch_sub(1, Ordering::Relaxed);
        crate::tlog!("relay: connection {conn_id} closed");
    }

    fn dispatch(&self, conn_id: u64, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom {
                room_name, user_id, ..
            } => self.join_room(conn_id, room_name, user_id),
            ClientEvent::LeaveRoom { room_name } => self.leave_room(conn_id, &room_name),
            ClientEvent::SendMessage {
                room_name,
                user_id,
                content,
                conversation_id,
            } => {
                if let Err(error) =
                    self.send_message(conn_id, &room_name, user_id, content, conversation_id)
                {
                    crate::tlog!("relay: send-message failed on connection {conn_id}: {error}");
                    self.send_to(
                        conn_id,
                        ServerEvent::MessageError {
                            error: "Failed to send message".to_string(),
                            timestamp: now_iso(),
                        },
                    );
                }
            }
            ClientEvent::TypingIndicator {
                room_name,
                user_id,
                user_name,
            } => self.typing_indicator(conn_id, room_name, user_id, user_name),
            ClientEvent::StopTyping { room_name, user_id } => {
                self.stop_typing(conn_id, room_name, user_id)
            }
        }
    }

    /// Subscribe the connection to a room, auto-leaving any previous room.
    ///
    /// Broadcasts `user-joined` to the other members and replies `room-info`
    /// to the joining connection with the room size after the join.  The
    /// count can race with concurrent joins/leaves and is only eventually
    /// consistent.
    fn join_room(&self, conn_id: u64, room_name: String, user_id: String) {
        let mut inner = self.inner.lock().expect("relay registry lock poisoned");

        // Leave-before-join invariant: a second join never silently
        // overwrites the previous subscription.
        if let Some(previous) = inner.conns.get(&conn_id).and_then(|c| c.joined.clone()) {
            if previous.room_name != room_name {
                inner.depart(conn_id, &previous.room_name, &previous.user_id, false);
            }
        }

        inner
            .rooms
            .entry(room_name.clone())
            .or_default()
            .insert(conn_id);
        let member_count = inner.rooms.get(&room_name).map_or(1, HashSet::len);

        if let Some(conn) = inner.conns.get_mut(&conn_id) {
            conn.joined = Some(Subscription {
                room_name: room_name.clone(),
                user_id: user_id.clone(),
            });
        }

        inner.broadcast(
            &room_name,
            Some(conn_id),
            &ServerEvent::UserJoined {
                user_id: user_id.clone(),
                room_name: room_name.clone(),
                timestamp: now_iso(),
            },
        );
        inner.send_to(
            conn_id,
            ServerEvent::RoomInfo {
                member_count,
                room_name: room_name.clone(),
            },
        );

        crate::tlog!(
            "relay: {} joined {} ({member_count} member(s))",
            logging::user_id(&user_id),
            logging::room(&room_name)
        );
    }

    fn leave_room(&self, conn_id: u64, room_name: &str) {
        let mut inner = self.inner.lock().expect("relay registry lock poisoned");

        let user_id = inner
            .conns
            .get(&conn_id)
            .and_then(|c| c.joined.as_ref())
            .map(|s| s.user_id.clone())
            .unwrap_or_default();

        inner.depart(conn_id, room_name, &user_id, false);

        if let Some(conn) = inner.conns.get_mut(&conn_id) {
            if conn
                .joined
                .as_ref()
                .is_some_and(|s| s.room_name == room_name)
            {
                conn.joined = None;
            }
        }

        crate::tlog!(
            "relay: {} left {}",
            logging::user_id(&user_id),
            logging::room(room_name)
        );
    }

    /// Fan out a message to every member of the room, sender included, so
    /// the sender's UI updates through the same path as remote peers.
    fn send_message(
        &self,
        conn_id: u64,
        room_name: &str,
        user_id: String,
        content: String,
        conversation_id: Option<String>,
    ) -> Result<(), RelayError> {
        let inner = self.inner.lock().expect("relay registry lock poisoned");
        if !inner.conns.contains_key(&conn_id) {
            return Err(RelayError::NotConnected);
        }

        inner.broadcast(
            room_name,
            None,
            &ServerEvent::MessageReceived {
                room_name: room_name.to_string(),
                user_id: user_id.clone(),
                content,
                timestamp: now_iso(),
                conversation_id,
            },
        );

        crate::tlog!(
            "relay: message from {} in {}",
            logging::user_id(&user_id),
            logging::room(room_name)
        );
        Ok(())
    }

    fn typing_indicator(&self, conn_id: u64, room_name: String, user_id: String, user_name: String) {
        let inner = self.inner.lock().expect("relay registry lock poisoned");
        inner.broadcast(
            &room_name,
            Some(conn_id),
            &ServerEvent::UserTyping {
                user_id,
                user_name,
                room_name: room_name.clone(),
                timestamp: now_iso(),
            },
        );
    }

    fn stop_typing(&self, conn_id: u64, room_name: String, user_id: String) {
        let inner = self.inner.lock().expect("relay registry lock poisoned");
        inner.broadcast(
            &room_name,
            Some(conn_id),
            &ServerEvent::UserStoppedTyping {
                user_id,
                room_name: room_name.clone(),
                timestamp: now_iso(),
            },
        );
    }

    /// Implicit transition on transport close: notify the prior room (if
    /// any) that the user left and stopped typing, then drop the record.
    fn disconnect(&self, conn_id: u64) {
        let mut inner = self.inner.lock().expect("relay registry lock poisoned");
        if let Some(conn) = inner.conns.remove(&conn_id) {
            if let Some(sub) = conn.joined {
                inner.depart(conn_id, &sub.room_name, &sub.user_id, true);
                crate::tlog!(
                    "relay: {} disconnected from {}",
                    logging::user_id(&sub.user_id),
                    logging::room(&sub.room_name)
                );
            }
        }
    }

    fn send_to(&self, conn_id: u64, event: ServerEvent) {
        let inner = self.inner.lock().expect("relay registry lock poisoned");
        inner.send_to(conn_id, event);
    }
}

impl RelayInner {
    /// Send an event to every member of `room`, optionally excluding one
    /// connection.  Sends to dead channels are ignored; their cleanup
    /// happens in the owning connection task.
    fn broadcast(&self, room: &str, except: Option<u64>, event: &ServerEvent) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for &member in members {
            if Some(member) == except {
                continue;
            }
            if let Some(conn) = self.conns.get(&member) {
                let _ = conn.tx.send(event.clone());
            }
        }
    }

    fn send_to(&self, conn_id: u64, event: ServerEvent) {
        if let Some(conn) = self.conns.get(&conn_id) {
            let _ = conn.tx.send(event);
        }
    }

    /// Remove the connection from `room` and notify the remaining members
    /// with `user-left` (and `user-stopped-typing` when the departure is a
    /// disconnect, in case the user was mid-keystroke).  Empty rooms are
    /// dropped from the registry; a room has no persisted identity.
    fn depart(&mut self, conn_id: u64, room: &str, user_id: &str, disconnected: bool) {
        let removed = match self.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&conn_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return;
        }

        self.broadcast(
            room,
            Some(conn_id),
            &ServerEvent::UserLeft {
                user_id: user_id.to_string(),
                room_name: room.to_string(),
                timestamp: now_iso(),
            },
        );
        if disconnected {
            self.broadcast(
                room,
                Some(conn_id),
                &ServerEvent::UserStoppedTyping {
                    user_id: user_id.to_string(),
                    room_name: room.to_string(),
                    timestamp: now_iso(),
                },
            );
        }
    }
}
