//! Tests for the client-side state: reconciliation, the typing debounce,
//! and the chat session's room lifecycle.

use std::time::{Duration, Instant};

use palaver::client::{
    reconcile, ChatMessage, ChatSession, TypingDebounce, TypingSignal, TYPING_DEBOUNCE,
};
use palaver::protocol::{now_iso, ClientEvent, ServerEvent};
use palaver::rooms::ChatTarget;

fn msg(id: &str, created_at: i64, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        conversation_id: Some("c1".to_string()),
        sender_id: "alice".to_string(),
        content: content.to_string(),
        created_at,
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[test]
fn reconcile_sorts_ascending_and_dedups_last_wins() {
    let history = vec![msg("m2", 200, "two"), msg("m1", 100, "one")];
    let live = vec![msg("m3", 300, "three"), msg("m2", 200, "two (edited)")];

    let merged = reconcile(&history, &live);

    let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    // The live copy of m2 replaced the history copy.
    assert_eq!(merged[1].content, "two (edited)");
}

#[test]
fn reconcile_is_idempotent() {
    let history = vec![msg("m1", 100, "one"), msg("m2", 200, "two")];
    let live = vec![msg("m2", 200, "two"), msg("m3", 300, "three")];

    let once = reconcile(&history, &live);
    let twice = reconcile(&once, &live);
    assert_eq!(once, twice);
}

#[test]
fn reconcile_is_order_independent_in_inputs() {
    let mut history = vec![msg("m1", 100, "one"), msg("m2", 200, "two")];
    let live = vec![msg("m3", 300, "three")];

    let forward = reconcile(&history, &live);
    history.reverse();
    let reversed = reconcile(&history, &live);
    assert_eq!(forward, reversed);
}

#[test]
fn reconcile_breaks_timestamp_ties_by_id() {
    let history = vec![msg("b", 100, "second"), msg("a", 100, "first")];
    let merged = reconcile(&history, &[]);
    let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

// ---------------------------------------------------------------------------
// Typing debounce
// ---------------------------------------------------------------------------

#[test]
fn debounce_emits_one_stop_after_last_keystroke() {
    let mut debounce = TypingDebounce::default();
    let start = Instant::now();

    // Three keystrokes within one second: a Started per keystroke is
    // permitted, and the timer keeps re-arming.
    for i in 0..3u64 {
        let at = start + Duration::from_millis(i * 300);
        assert_eq!(debounce.on_input("hell", at), TypingSignal::Started);
        assert!(debounce.poll(at).is_none());
    }

    let last_keystroke = start + Duration::from_millis(600);
    // Just before the window elapses: nothing.
    assert!(debounce
        .poll(last_keystroke + TYPING_DEBOUNCE - Duration::from_millis(1))
        .is_none());
    // At expiry: exactly one Stopped.
    assert_eq!(
        debounce.poll(last_keystroke + TYPING_DEBOUNCE),
        Some(TypingSignal::Stopped)
    );
    // And never a second one.
    assert!(debounce
        .poll(last_keystroke + TYPING_DEBOUNCE * 2)
        .is_none());
}

#[test]
fn debounce_stops_immediately_on_empty_input() {
    let mut debounce = TypingDebounce::default();
    let start = Instant::now();

    assert_eq!(debounce.on_input("hi", start), TypingSignal::Started);
    assert_eq!(debounce.on_input("", start), TypingSignal::Stopped);
    // The timer was disarmed; expiry produces nothing further.
    assert!(debounce.poll(start + TYPING_DEBOUNCE * 2).is_none());
}

// ---------------------------------------------------------------------------
// Chat session
// ---------------------------------------------------------------------------

fn received(room: &str, sender: &str, content: &str) -> ServerEvent {
    ServerEvent::MessageReceived {
        room_name: room.to_string(),
        user_id: sender.to_string(),
        content: content.to_string(),
        timestamp: now_iso(),
        conversation_id: None,
    }
}

#[test]
fn switch_chat_leaves_previous_room_and_joins_new() {
    let mut session = ChatSession::new("u1", "Uma");

    let events = session.switch_chat(Some(ChatTarget::Direct {
        other_user_id: "u2".to_string(),
    }));
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ClientEvent::JoinRoom { room_name, user_id, .. }
            if room_name == "dm-u1-u2" && user_id == "u1"
    ));
    assert_eq!(session.current_room(), Some("dm-u1-u2"));

    let events = session.switch_chat(Some(ChatTarget::Conversation {
        conversation_id: "c7".to_string(),
    }));
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        ClientEvent::LeaveRoom { room_name } if room_name == "dm-u1-u2"
    ));
    assert!(matches!(
        &events[1],
        ClientEvent::JoinRoom { room_name, .. } if room_name == "conversation-c7"
    ));

    let events = session.switch_chat(None);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ClientEvent::LeaveRoom { .. }));
    assert_eq!(session.current_room(), None);
}

#[test]
fn switch_chat_clears_stale_state() {
    let mut session = ChatSession::new("u1", "Uma");
    session.switch_chat(Some(ChatTarget::Conversation {
        conversation_id: "c1".to_string(),
    }));

    session.apply(&received("conversation-c1", "u2", "hello"));
    session.apply(&ServerEvent::UserTyping {
        user_id: "u2".to_string(),
        user_name: "Bea".to_string(),
        room_name: "conversation-c1".to_string(),
        timestamp: now_iso(),
    });
    assert_eq!(session.live_messages().len(), 1);
    assert!(session.typing_users().contains("u2"));

    session.switch_chat(Some(ChatTarget::Conversation {
        conversation_id: "c2".to_string(),
    }));
    assert!(session.live_messages().is_empty());
    assert!(session.typing_users().is_empty());
}

#[test]
fn duplicate_broadcasts_collapse_in_the_view() {
    let mut session = ChatSession::new("u1", "Uma");
    session.switch_chat(Some(ChatTarget::Direct {
        other_user_id: "u2".to_string(),
    }));

    let event = received("dm-u1-u2", "u2", "hi");
    session.apply(&event);
    session.apply(&event);
    assert_eq!(session.live_messages().len(), 2);

    // Same room, sender, timestamp, and content derive the same id, so the
    // reconciled view contains the message once.
    let view = session.view(&[]);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].content, "hi");
}

#[test]
fn messages_for_other_rooms_are_ignored() {
    let mut session = ChatSession::new("u1", "Uma");
    session.switch_chat(Some(ChatTarget::Direct {
        other_user_id: "u2".to_string(),
    }));

    session.apply(&received("conversation-other", "u3", "elsewhere"));
    assert!(session.live_messages().is_empty());
}

#[test]
fn compose_send_plans_broadcast_persist_then_stop() {
    let mut session = ChatSession::new("u1", "Uma");
    session.switch_chat(Some(ChatTarget::Direct {
        other_user_id: "u2".to_string(),
    }));

    let plan = session.compose_send("hi there").expect("plan");
    assert!(matches!(
        &plan.broadcast,
        ClientEvent::SendMessage { room_name, user_id, content, conversation_id }
            if room_name == "dm-u1-u2"
                && user_id == "u1"
                && content == "hi there"
                && conversation_id.is_none()
    ));
    assert_eq!(plan.persist.recipient_id.as_deref(), Some("u2"));
    assert!(plan.persist.conversation_id.is_none());
    assert!(matches!(
        &plan.stop_typing,
        ClientEvent::StopTyping { room_name, .. } if room_name == "dm-u1-u2"
    ));

    // Blank content and missing chat produce no plan.
    assert!(session.compose_send("   ").is_none());
    session.switch_chat(None);
    assert!(session.compose_send("hello").is_none());
}

#[test]
fn compose_send_for_conversation_targets_conversation_id() {
    let mut session = ChatSession::new("u1", "Uma");
    session.switch_chat(Some(ChatTarget::Conversation {
        conversation_id: "c9".to_string(),
    }));

    let plan = session.compose_send("yo").expect("plan");
    assert_eq!(plan.persist.conversation_id.as_deref(), Some("c9"));
    assert!(plan.persist.recipient_id.is_none());
    assert!(matches!(
        &plan.broadcast,
        ClientEvent::SendMessage { conversation_id, .. }
            if conversation_id.as_deref() == Some("c9")
    ));
}

#[test]
fn input_changes_emit_room_scoped_typing_events() {
    let mut session = ChatSession::new("u1", "Uma");
    let now = Instant::now();

    // No active chat: keystrokes emit nothing.
    assert!(session.input_changed("h", now).is_none());

    session.switch_chat(Some(ChatTarget::Conversation {
        conversation_id: "c1".to_string(),
    }));

    assert!(matches!(
        session.input_changed("h", now),
        Some(ClientEvent::TypingIndicator { room_name, user_name, .. })
            if room_name == "conversation-c1" && user_name == "Uma"
    ));
    assert!(session.tick(now + Duration::from_millis(500)).is_none());
    assert!(matches!(
        session.tick(now + TYPING_DEBOUNCE),
        Some(ClientEvent::StopTyping { room_name, .. }) if room_name == "conversation-c1"
    ));

    // Emptying the input stops immediately.
    assert!(matches!(
        session.input_changed("", now),
        Some(ClientEvent::StopTyping { .. })
    ));
}
