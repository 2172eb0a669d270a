use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::events::{ClientCommand, ServerEvent};
use parley_types::models::{DEFAULT_ROOM, Message, MessageKind, timestamp_now};

use crate::directory::DirectoryBroadcaster;
use crate::presence::PresenceRegistry;
use crate::router::{Router, conversation_key};
use crate::store::MessageStore;
use crate::transport::{ConnId, Transport};

/// Everything a session needs to reach the rest of the engine. Cheap to
/// clone; every handle is Arc-backed and shared process-wide.
#[derive(Clone)]
pub struct SessionDeps {
    pub db: Arc<Database>,
    pub transport: Transport,
    pub presence: PresenceRegistry,
    pub router: Router,
    pub store: MessageStore,
    pub directory: DirectoryBroadcaster,
    pub jwt_secret: String,
}

impl SessionDeps {
    pub fn new(db: Arc<Database>, jwt_secret: String) -> Self {
        let transport = Transport::new();
        let presence = PresenceRegistry::new();
        let router = Router::new(transport.clone(), presence.clone());
        let store = MessageStore::new(db.clone());
        let directory = DirectoryBroadcaster::new(db.clone(), presence.clone(), transport.clone());
        Self {
            db,
            transport,
            presence,
            router,
            store,
            directory,
            jwt_secret,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad, expired, or malformed token — or a token signed for an identity
    /// that no longer exists. The connection must be signalled with
    /// `AuthError` and dropped.
    #[error("invalid or expired token")]
    TokenInvalid,

    /// Storage failed mid-operation. The operation is dropped; presence and
    /// room state are untouched and the session stays usable.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// State machine bound to one connection. A connection starts
/// unauthenticated; `authenticate` is the only way to obtain a `Session`,
/// so every other operation is authenticated by construction.
pub struct Session {
    deps: SessionDeps,
    conn_id: ConnId,
    username: String,
    current_room: String,
}

impl Session {
    /// Validate `token` and run the full sign-on sequence: presence
    /// registration (displacing any previous login), default-room join,
    /// directory broadcast, settings + welcome + history replay to the
    /// caller, and a join notice to the rest of the room.
    pub async fn authenticate(
        deps: SessionDeps,
        conn_id: ConnId,
        token: &str,
    ) -> Result<Session, SessionError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(deps.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| SessionError::TokenInvalid)?
        .claims;

        let db = deps.db.clone();
        let name = claims.username.clone();
        let profile = tokio::task::spawn_blocking(move || db.get_user_by_username(&name))
            .await
            .map_err(anyhow::Error::new)??;
        let Some(profile) = profile else {
            return Err(SessionError::TokenInvalid);
        };

        let session = Session {
            deps,
            conn_id,
            username: claims.username,
            current_room: DEFAULT_ROOM.to_string(),
        };

        if let Some(displaced) = session
            .deps
            .presence
            .register(&session.username, conn_id)
            .await
        {
            info!(
                "{} re-authenticated; displacing connection {}",
                session.username, displaced
            );
        }
        session.deps.transport.join_group(conn_id, DEFAULT_ROOM).await;
        session.deps.directory.publish().await;

        session
            .send_self(ServerEvent::UserSettings {
                background: profile.background,
            })
            .await;
        session
            .send_self(ServerEvent::SystemNotice {
                text: format!("Welcome, {}!", session.username),
            })
            .await;
        session.replay_room_history(DEFAULT_ROOM).await?;
        session
            .notify_room(
                DEFAULT_ROOM,
                format!("{} has joined the chat.", session.username),
            )
            .await;

        info!("{} authenticated on {}", session.username, conn_id);
        Ok(session)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn current_room(&self) -> &str {
        &self.current_room
    }

    /// Dispatch one inbound command. The connection loop awaits each call
    /// before reading the next frame, so commands from one connection are
    /// handled in arrival order, never reentrantly.
    pub async fn handle(&mut self, cmd: ClientCommand) -> Result<(), SessionError> {
        match cmd {
            // The connection authenticated before entering the event loop.
            ClientCommand::Authenticate { .. } => Ok(()),
            ClientCommand::JoinRoom { room } => self.switch_room(room).await,
            ClientCommand::LoadDmHistory { with } => self.load_conversation(&with).await,
            ClientCommand::SendRoomMessage { text } => self.send_room_message(text).await,
            ClientCommand::SendDirectMessage { to, text } => {
                self.send_direct_message(to, text).await
            }
            ClientCommand::DeleteMessage { message_id } => self.delete_message(message_id).await,
        }
    }

    /// Leave the current room, join `room`, confirm privately, replay its
    /// recent history, and announce to everyone already there. Re-joining
    /// the current room is treated as an idempotent re-join.
    async fn switch_room(&mut self, room: String) -> Result<(), SessionError> {
        self.deps
            .transport
            .leave_group(self.conn_id, &self.current_room)
            .await;
        self.deps.transport.join_group(self.conn_id, &room).await;
        self.current_room = room;

        self.send_self(ServerEvent::SystemNotice {
            text: format!("You joined the {} room.", self.current_room),
        })
        .await;
        let room = self.current_room.clone();
        self.replay_room_history(&room).await?;
        self.notify_room(&room, format!("{} has joined this room.", self.username))
            .await;
        Ok(())
    }

    /// History for the conversation with `with`, to the caller only. Room
    /// membership is unchanged.
    async fn load_conversation(&self, with: &str) -> Result<(), SessionError> {
        let key = conversation_key(&self.username, with);
        let messages = self.deps.store.convo_window(&key).await?;
        self.send_self(ServerEvent::LoadHistory { messages }).await;
        Ok(())
    }

    async fn send_room_message(&self, text: String) -> Result<(), SessionError> {
        let message = Message {
            id: Uuid::new_v4(),
            kind: MessageKind::Text,
            from: self.username.clone(),
            to: None,
            room: Some(self.current_room.clone()),
            convo_id: None,
            body: Some(text),
            file: None,
            timestamp: timestamp_now(),
        };
        self.deps.store.append(&message).await?;
        self.deps.router.deliver(&message).await;
        Ok(())
    }

    /// Persisted even when `to` is offline; live delivery then reaches only
    /// the sender's own connection.
    async fn send_direct_message(&self, to: String, text: String) -> Result<(), SessionError> {
        let message = Message {
            id: Uuid::new_v4(),
            kind: MessageKind::Text,
            from: self.username.clone(),
            convo_id: Some(conversation_key(&self.username, &to)),
            to: Some(to),
            room: None,
            body: Some(text),
            file: None,
            timestamp: timestamp_now(),
        };
        self.deps.store.append(&message).await?;
        self.deps.router.deliver(&message).await;
        Ok(())
    }

    /// Author-only delete. A missing message, or one sent by someone else,
    /// is a silent no-op — an authorization outcome, not an error.
    async fn delete_message(&self, message_id: Uuid) -> Result<(), SessionError> {
        let Some(message) = self.deps.store.find_by_id(message_id).await? else {
            return Ok(());
        };
        if message.from != self.username {
            return Ok(());
        }
        self.deps.store.delete_by_id(message_id).await?;
        self.deps.router.deliver_deletion(&message).await;
        Ok(())
    }

    async fn send_self(&self, event: ServerEvent) {
        self.deps.transport.send_to(self.conn_id, event).await;
    }

    async fn replay_room_history(&self, room: &str) -> Result<(), SessionError> {
        let messages = self.deps.store.room_window(room).await?;
        self.send_self(ServerEvent::LoadHistory { messages }).await;
        Ok(())
    }

    /// Join notices go to everyone in the room except the caller.
    async fn notify_room(&self, room: &str, text: String) {
        self.deps
            .transport
            .send_to_group(room, ServerEvent::SystemNotice { text }, Some(self.conn_id))
            .await;
    }
}

/// Tear-down after the socket closes: drop the connection's channel and, if
/// this connection still owns the presence entry, announce the departure.
/// A stale disconnect racing a newer login cleans up only its own channel.
pub async fn disconnect(deps: &SessionDeps, username: &str, conn_id: ConnId) {
    deps.transport.unregister(conn_id).await;
    if deps.presence.unregister(username, conn_id).await {
        deps.directory.publish().await;
        deps.transport
            .broadcast_all(ServerEvent::SystemNotice {
                text: format!("{username} has left the chat."),
            })
            .await;
        info!("{username} went offline");
    }
}
