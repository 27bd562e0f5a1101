//! Integration tests for the REST API against a live server on an ephemeral
//! port.  REST calls run in `spawn_blocking` since the transport helpers are
//! blocking.

use tokio::sync::oneshot;

use palaver::client::PersistRequest;
use palaver::relay::RelayState;
use palaver::server::router::build_router;
use palaver::server::state::{AppState, SharedState};
use palaver::storage::{ConversationRow, MessageRow, Storage};
use palaver::transport;

async fn start_server() -> (String, SharedState, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let state = AppState::shared(storage, RelayState::new());
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{}", addr), state, shutdown_tx)
}

fn put_user(base_url: &str, id: &str, name: &str) -> u16 {
    let response = ureq::put(&format!("{base_url}/api/users"))
        .send_json(serde_json::json!({
            "id": id,
            "name": name,
            "username": id,
            "email": format!("{id}@example.com"),
        }))
        .expect("put user");
    response.status()
}

fn get_json(url: &str) -> serde_json::Value {
    ureq::get(url)
        .call()
        .expect("GET")
        .into_json()
        .expect("json body")
}

#[tokio::test]
async fn user_upsert_creates_then_updates() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let statuses = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let first = put_user(&base_url, "alice", "Alice A");
            let second = put_user(&base_url, "alice", "Alice B");
            let loaded = get_json(&format!("{base_url}/api/users/other?user_id=zzz&mode=group"));
            (first, second, loaded)
        }
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    let (first, second, loaded) = statuses;
    assert_eq!(first, 201);
    assert_eq!(second, 200);
    let users = loaded.as_array().expect("array");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "Alice B");
}

#[tokio::test]
async fn send_with_recipient_creates_direct_conversation() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let (message, alice_convs, bob_convs, direct_pool) = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
                put_user(&base_url, id, name);
            }

            let message = transport::send_text_message(
                &base_url,
                &PersistRequest {
                    sender_id: "alice".to_string(),
                    conversation_id: None,
                    recipient_id: Some("bob".to_string()),
                    content: "first!".to_string(),
                },
            )
            .expect("send");

            let alice_convs = transport::list_conversations(&base_url, "alice").expect("convs");
            let bob_convs = transport::list_conversations(&base_url, "bob").expect("convs");
            let direct_pool =
                get_json(&format!("{base_url}/api/users/other?user_id=alice&mode=direct"));
            (message, alice_convs, bob_convs, direct_pool)
        }
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    assert_eq!(message.content, "first!");
    let conversation_id = message.conversation_id.expect("conversation id");

    for convs in [&alice_convs, &bob_convs] {
        let list = convs.as_array().expect("array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["conversation"]["id"], conversation_id.as_str());
        assert_eq!(list[0]["conversation"]["isGroup"], false);
        assert_eq!(
            list[0]["conversationMembers"].as_array().expect("members").len(),
            2
        );
    }

    // Bob now shares a direct conversation with Alice, so only Carol is
    // offered for a new DM.
    let pool: Vec<&str> = direct_pool
        .as_array()
        .expect("array")
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert_eq!(pool, vec!["carol"]);
}

#[tokio::test]
async fn send_into_existing_conversation_appends() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let (second, page) = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let first = transport::send_text_message(
                &base_url,
                &PersistRequest {
                    sender_id: "alice".to_string(),
                    conversation_id: None,
                    recipient_id: Some("bob".to_string()),
                    content: "hello".to_string(),
                },
            )
            .expect("send first");
            let conversation_id = first.conversation_id.expect("conversation id");

            let second = transport::send_text_message(
                &base_url,
                &PersistRequest {
                    sender_id: "bob".to_string(),
                    conversation_id: Some(conversation_id.clone()),
                    recipient_id: None,
                    content: "hello back".to_string(),
                },
            )
            .expect("send second");

            let page =
                transport::fetch_messages(&base_url, &conversation_id, 50, None).expect("page");
            (second, page)
        }
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    assert_eq!(second.sender_id, "bob");
    assert_eq!(page.messages.len(), 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn message_pagination_over_http() {
    let (base_url, state, shutdown_tx) = start_server().await;

    // Seed with controlled timestamps so cursor boundaries are exact.
    {
        let storage = state.storage.lock().await;
        storage
            .insert_conversation(&ConversationRow {
                id: "c1".to_string(),
                is_group: false,
                name: None,
                created_at: 0,
                updated_at: 0,
            })
            .expect("conversation");
        let base = 1_700_000_000_000i64;
        for i in 0..5 {
            storage
                .insert_message(&MessageRow {
                    id: format!("m{i}"),
                    conversation_id: "c1".to_string(),
                    sender_id: "alice".to_string(),
                    content: format!("message {i}"),
                    message_type: "text".to_string(),
                    is_deleted: false,
                    created_at: base + i,
                    updated_at: base + i,
                })
                .expect("message");
        }
    }

    let (page1, page2) = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let page1 = transport::fetch_messages(&base_url, "c1", 2, None).expect("page 1");
            let cursor = page1.next_cursor.clone().expect("cursor");
            let page2 =
                transport::fetch_messages(&base_url, "c1", 2, Some(&cursor)).expect("page 2");
            (page1, page2)
        }
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    let ids1: Vec<&str> = page1.messages.iter().map(|m| m.id.as_str()).collect();
    let ids2: Vec<&str> = page2.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids1, vec!["m4", "m3"]);
    assert_eq!(ids2, vec!["m2", "m1"]);
    assert!(page2.next_cursor.is_some());
}

#[tokio::test]
async fn create_group_assigns_roles() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let (group, alice_convs) = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
                put_user(&base_url, id, name);
            }
            let group: serde_json::Value = ureq::post(&format!("{base_url}/api/groups"))
                .send_json(serde_json::json!({
                    "name": "Lunch Crew",
                    "creatorId": "alice",
                    "memberIds": ["bob", "carol"],
                }))
                .expect("create group")
                .into_json()
                .expect("group json");
            let alice_convs = transport::list_conversations(&base_url, "alice").expect("convs");
            (group, alice_convs)
        }
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    assert_eq!(group["conversation"]["isGroup"], true);
    assert_eq!(group["conversation"]["name"], "Lunch Crew");
    let members = group["conversationMembers"].as_array().expect("members");
    assert_eq!(members.len(), 3);
    let role_of = |id: &str| {
        members
            .iter()
            .find(|m| m["userId"] == id)
            .map(|m| m["role"].as_str().unwrap().to_string())
            .expect("member present")
    };
    assert_eq!(role_of("alice"), "admin");
    assert_eq!(role_of("bob"), "member");
    assert_eq!(role_of("carol"), "member");

    assert_eq!(alice_convs.as_array().expect("array").len(), 1);
}

#[tokio::test]
async fn send_rejects_bad_requests() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let (empty_content, missing_ids, unknown_conversation, bad_cursor) =
        tokio::task::spawn_blocking({
            let base_url = base_url.clone();
            move || {
                let status_of = |body: serde_json::Value| -> u16 {
                    match ureq::post(&format!("{base_url}/api/messages/text")).send_json(body) {
                        Ok(resp) => resp.status(),
                        Err(ureq::Error::Status(code, _)) => code,
                        Err(e) => panic!("transport error: {e}"),
                    }
                };

                let empty_content = status_of(serde_json::json!({
                    "senderId": "alice",
                    "recipientId": "bob",
                    "content": "   ",
                }));
                let missing_ids = status_of(serde_json::json!({
                    "senderId": "alice",
                    "content": "hello",
                }));
                let unknown_conversation = status_of(serde_json::json!({
                    "senderId": "alice",
                    "conversationId": "no-such-conversation",
                    "content": "hello",
                }));

                let bad_cursor = match ureq::get(&format!(
                    "{base_url}/api/conversations/c1/messages?cursor=not-a-cursor"
                ))
                .call()
                {
                    Ok(resp) => resp.status(),
                    Err(ureq::Error::Status(code, _)) => code,
                    Err(e) => panic!("transport error: {e}"),
                };

                (empty_content, missing_ids, unknown_conversation, bad_cursor)
            }
        })
        .await
        .expect("task");

    shutdown_tx.send(()).ok();

    assert_eq!(empty_content, 400);
    assert_eq!(missing_ids, 400);
    assert_eq!(unknown_conversation, 404);
    assert_eq!(bad_cursor, 400);
}

#[tokio::test]
async fn health_reports_connection_count() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    let health = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || get_json(&format!("{base_url}/api/health"))
    })
    .await
    .expect("task");

    shutdown_tx.send(()).ok();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["wsConnections"], 0);
}
