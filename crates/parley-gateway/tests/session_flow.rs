use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::session::{self, Session, SessionDeps};
use parley_gateway::store::HISTORY_WINDOW;
use parley_gateway::transport::ConnId;
use parley_types::api::Claims;
use parley_types::events::{ClientCommand, ServerEvent};

const SECRET: &str = "test-secret";

fn deps() -> SessionDeps {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    SessionDeps::new(db, SECRET.to_string())
}

fn register_user(deps: &SessionDeps, username: &str) {
    deps.db
        .create_user(&Uuid::new_v4().to_string(), username, "argon2-hash", "")
        .expect("create user");
}

fn token_for(username: &str) -> String {
    let claims = Claims {
        sub: Uuid::new_v4(),
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token")
}

/// Register a channel-backed connection and run the sign-on sequence, the
/// same way the WebSocket loop does minus the socket.
async fn connect(
    deps: &SessionDeps,
    username: &str,
) -> (Session, ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
    let (conn_id, rx) = deps.transport.register().await;
    let session = Session::authenticate(deps.clone(), conn_id, &token_for(username))
        .await
        .expect("authenticate");
    (session, conn_id, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn chat_bodies(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|ev| match ev {
            ServerEvent::ChatMessage(m) => m.body.clone(),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn authenticate_registers_presence_and_signs_on() {
    let deps = deps();
    register_user(&deps, "alice");

    let (session, conn_id, mut rx) = connect(&deps, "alice").await;
    assert_eq!(session.username(), "alice");
    assert_eq!(session.current_room(), "#general");
    assert_eq!(deps.presence.lookup("alice").await, Some(conn_id));

    let events = drain(&mut rx);
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::UserSettings { background } if background == "default"
    )));
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::SystemNotice { text } if text == "Welcome, alice!"
    )));
    // Fresh room: an empty window, not an error.
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::LoadHistory { messages } if messages.is_empty()
    )));
}

#[tokio::test]
async fn bad_token_is_rejected_and_leaves_no_presence() {
    let deps = deps();
    register_user(&deps, "alice");
    let (conn_id, _rx) = deps.transport.register().await;

    let result = Session::authenticate(deps.clone(), conn_id, "not-a-jwt").await;
    assert!(matches!(
        result,
        Err(session::SessionError::TokenInvalid)
    ));
    assert_eq!(deps.presence.lookup("alice").await, None);

    // A valid token for an identity the credential store doesn't know.
    let result = Session::authenticate(deps.clone(), conn_id, &token_for("mallory")).await;
    assert!(matches!(
        result,
        Err(session::SessionError::TokenInvalid)
    ));
}

#[tokio::test]
async fn room_message_reaches_current_members_only() {
    let deps = deps();
    for name in ["alice", "bob", "carol"] {
        register_user(&deps, name);
    }

    let (mut alice, _, mut alice_rx) = connect(&deps, "alice").await;
    let (_bob, _, mut bob_rx) = connect(&deps, "bob").await;
    let (mut carol, _, mut carol_rx) = connect(&deps, "carol").await;

    carol
        .handle(ClientCommand::JoinRoom {
            room: "#random".to_string(),
        })
        .await
        .expect("join room");

    drain(&mut alice_rx);
    drain(&mut bob_rx);
    drain(&mut carol_rx);

    alice
        .handle(ClientCommand::SendRoomMessage {
            text: "hi".to_string(),
        })
        .await
        .expect("send");

    // Sender and room members get the live copy; carol gets nothing.
    assert_eq!(chat_bodies(&drain(&mut alice_rx)), vec!["hi"]);
    assert_eq!(chat_bodies(&drain(&mut bob_rx)), vec!["hi"]);
    assert!(chat_bodies(&drain(&mut carol_rx)).is_empty());

    // Carol still sees it via the history replay when she joins the room.
    carol
        .handle(ClientCommand::JoinRoom {
            room: "#general".to_string(),
        })
        .await
        .expect("join room");
    let events = drain(&mut carol_rx);
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::LoadHistory { messages }
            if messages.iter().any(|m| m.body.as_deref() == Some("hi"))
    )));
}

#[tokio::test]
async fn direct_message_to_offline_user_persists() {
    let deps = deps();
    register_user(&deps, "alice");
    register_user(&deps, "bob");

    let (mut alice, _, mut alice_rx) = connect(&deps, "alice").await;
    drain(&mut alice_rx);

    alice
        .handle(ClientCommand::SendDirectMessage {
            to: "bob".to_string(),
            text: "you around?".to_string(),
        })
        .await
        .expect("send dm");

    // The sender gets a live copy even though bob is offline.
    let events = drain(&mut alice_rx);
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::PrivateMessage(m)
            if m.body.as_deref() == Some("you around?")
                && m.convo_id.as_deref() == Some("alice-bob")
    )));

    // Bob sees it on his next history load, not proactively on reconnect.
    let (mut bob, _, mut bob_rx) = connect(&deps, "bob").await;
    drain(&mut bob_rx);
    bob.handle(ClientCommand::LoadDmHistory {
        with: "alice".to_string(),
    })
    .await
    .expect("load dm history");

    let events = drain(&mut bob_rx);
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::LoadHistory { messages }
            if messages.iter().any(|m| m.body.as_deref() == Some("you around?"))
    )));
}

#[tokio::test]
async fn delete_is_author_only_and_notifies_the_room() {
    let deps = deps();
    register_user(&deps, "alice");
    register_user(&deps, "bob");

    let (mut alice, _, mut alice_rx) = connect(&deps, "alice").await;
    let (mut bob, _, mut bob_rx) = connect(&deps, "bob").await;

    alice
        .handle(ClientCommand::SendRoomMessage {
            text: "oops".to_string(),
        })
        .await
        .expect("send");
    let message_id = deps
        .store
        .room_window("#general")
        .await
        .expect("window")
        .last()
        .expect("message persisted")
        .id;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    // Bob is not the author: persistent no-op, no notice, repeatable.
    for _ in 0..2 {
        bob.handle(ClientCommand::DeleteMessage { message_id })
            .await
            .expect("delete attempt");
    }
    assert!(deps.store.find_by_id(message_id).await.expect("find").is_some());
    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut bob_rx).is_empty());

    // Unknown ids are the same silent no-op.
    bob.handle(ClientCommand::DeleteMessage {
        message_id: Uuid::new_v4(),
    })
    .await
    .expect("delete attempt");

    // The author may delete; the whole room hears about it.
    alice
        .handle(ClientCommand::DeleteMessage { message_id })
        .await
        .expect("delete");
    assert!(deps.store.find_by_id(message_id).await.expect("find").is_none());
    assert!(drain(&mut alice_rx).iter().any(|ev| matches!(
        ev,
        ServerEvent::MessageDeleted { message_id: id } if *id == message_id
    )));
    assert!(drain(&mut bob_rx).iter().any(|ev| matches!(
        ev,
        ServerEvent::MessageDeleted { message_id: id } if *id == message_id
    )));
}

#[tokio::test]
async fn deleting_a_direct_message_notifies_both_participants_only() {
    let deps = deps();
    for name in ["alice", "bob", "carol"] {
        register_user(&deps, name);
    }

    let (mut alice, _, mut alice_rx) = connect(&deps, "alice").await;
    let (_bob, _, mut bob_rx) = connect(&deps, "bob").await;
    let (_carol, _, mut carol_rx) = connect(&deps, "carol").await;

    alice
        .handle(ClientCommand::SendDirectMessage {
            to: "bob".to_string(),
            text: "secret".to_string(),
        })
        .await
        .expect("send dm");
    let message_id = deps
        .store
        .convo_window("alice-bob")
        .await
        .expect("window")
        .last()
        .expect("message persisted")
        .id;
    drain(&mut alice_rx);
    drain(&mut bob_rx);
    drain(&mut carol_rx);

    alice
        .handle(ClientCommand::DeleteMessage { message_id })
        .await
        .expect("delete");

    for rx in [&mut alice_rx, &mut bob_rx] {
        assert!(drain(rx).iter().any(|ev| matches!(
            ev,
            ServerEvent::MessageDeleted { message_id: id } if *id == message_id
        )));
    }
    assert!(drain(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn history_window_is_capped_and_oldest_first() {
    let deps = deps();
    register_user(&deps, "alice");
    let (mut alice, _, mut rx) = connect(&deps, "alice").await;

    for i in 0..60 {
        alice
            .handle(ClientCommand::SendRoomMessage {
                text: format!("msg {i}"),
            })
            .await
            .expect("send");
    }
    drain(&mut rx);

    alice
        .handle(ClientCommand::JoinRoom {
            room: "#general".to_string(),
        })
        .await
        .expect("re-join");

    let events = drain(&mut rx);
    let window = events
        .iter()
        .find_map(|ev| match ev {
            ServerEvent::LoadHistory { messages } => Some(messages),
            _ => None,
        })
        .expect("history replay");

    assert_eq!(window.len(), HISTORY_WINDOW as usize);
    assert_eq!(window.first().unwrap().body.as_deref(), Some("msg 10"));
    assert_eq!(window.last().unwrap().body.as_deref(), Some("msg 59"));
}

#[tokio::test]
async fn second_login_wins_and_stale_disconnect_is_ignored() {
    let deps = deps();
    register_user(&deps, "alice");
    register_user(&deps, "bob");

    let (_first, first_conn, _first_rx) = connect(&deps, "alice").await;
    let (_second, second_conn, _second_rx) = connect(&deps, "alice").await;
    let (_bob, _, mut bob_rx) = connect(&deps, "bob").await;

    // Exactly one presence entry, pointing at the most recent connection.
    assert_eq!(deps.presence.lookup("alice").await, Some(second_conn));
    drain(&mut bob_rx);

    // The first connection's teardown arrives late; alice stays online and
    // nobody is told she left.
    session::disconnect(&deps, "alice", first_conn).await;
    assert_eq!(deps.presence.lookup("alice").await, Some(second_conn));
    assert!(!drain(&mut bob_rx).iter().any(|ev| matches!(
        ev,
        ServerEvent::SystemNotice { text } if text.contains("left")
    )));

    session::disconnect(&deps, "alice", second_conn).await;
    assert_eq!(deps.presence.lookup("alice").await, None);
    assert!(drain(&mut bob_rx).iter().any(|ev| matches!(
        ev,
        ServerEvent::SystemNotice { text } if text == "alice has left the chat."
    )));
}

#[tokio::test]
async fn directory_lists_online_before_offline() {
    let deps = deps();
    for name in ["dave", "bob", "alice"] {
        register_user(&deps, name);
    }

    let (_alice, _, mut rx) = connect(&deps, "alice").await;

    let events = drain(&mut rx);
    let directory = events
        .iter()
        .find_map(|ev| match ev {
            ServerEvent::UserDirectory { users } => Some(users),
            _ => None,
        })
        .expect("directory broadcast");

    let order: Vec<(&str, bool)> = directory
        .iter()
        .map(|u| (u.username.as_str(), u.online))
        .collect();
    assert_eq!(
        order,
        vec![("alice", true), ("bob", false), ("dave", false)]
    );
}
