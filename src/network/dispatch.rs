//! Message Dispatcher
//!
//! Routes decoded client messages to the registry, the session and the
//! spatial index. Lookup and permission failures are answered with an
//! `error` message to the sender only; `update` and `sound` never reply.

use std::sync::Arc;

use tracing::debug;

use crate::core::SessionId;
use crate::game::registry::encode;
use crate::game::{Player, Registry, RegistryError, SoundPolicy};
use crate::network::protocol::{
    ClientMessage, CreateSessionRequest, JoinSessionRequest, PlaySound, PlayerUpdate,
    ServerMessage, SoundRequest, StartSessionRequest,
};

/// Longest accepted display name, in characters.
pub const MAX_USERNAME_CHARS: usize = 24;

/// Trim a client-supplied name. Blank names count as absent.
pub fn sanitize_username(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_USERNAME_CHARS).collect())
}

/// Per-message handlers shared by every connection.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one message from `player`.
    pub async fn dispatch(&self, player: &Arc<Player>, message: ClientMessage) {
        match message {
            ClientMessage::ListSessions => self.handle_list_sessions(player).await,
            ClientMessage::CreateSession(req) => self.handle_create_session(player, req).await,
            ClientMessage::JoinSession(req) => self.handle_join_session(player, req).await,
            ClientMessage::StartSession(req) => self.handle_start_session(player, req).await,
            ClientMessage::Update(update) => self.handle_update(player, update).await,
            ClientMessage::Sound(req) => self.handle_sound(player, req).await,
            ClientMessage::Unknown => {
                debug!(player = %player.id(), "Ignoring unknown message type");
            }
        }
    }

    async fn handle_list_sessions(&self, player: &Arc<Player>) {
        let sessions = self.registry.list_sessions().await;
        player.send(&ServerMessage::UpdateSessionList { sessions }).await;
    }

    async fn handle_create_session(&self, player: &Arc<Player>, req: CreateSessionRequest) {
        if let Some(name) = sanitize_username(req.username.as_deref()) {
            player.set_username(name).await;
        }
        self.leave_current_session(player).await;
        self.registry
            .create_and_join(player, req.session_name.trim().to_string())
            .await;
    }

    async fn handle_join_session(&self, player: &Arc<Player>, req: JoinSessionRequest) {
        let session_id = SessionId::from(req.session_id);

        // A mistyped code must not kick the player out of its current session.
        if self.registry.get_session(&session_id).await.is_none() {
            player.send(&ServerMessage::session_not_found()).await;
            return;
        }

        if let Some(name) = sanitize_username(req.username.as_deref()) {
            player.set_username(name).await;
        }
        if player.session_id().await.as_ref() != Some(&session_id) {
            self.leave_current_session(player).await;
        }

        match self.registry.join(player, &session_id).await {
            Ok(_) => {}
            Err(RegistryError::SessionNotFound(_)) => {
                // Deleted between the check and the join.
                player.send(&ServerMessage::session_not_found()).await;
            }
            Err(e) => debug!(player = %player.id(), "Join rejected: {}", e),
        }
    }

    async fn handle_start_session(&self, player: &Arc<Player>, req: StartSessionRequest) {
        let session_id = SessionId::from(req.session_id);
        match self.registry.start_session(player, &session_id).await {
            Ok(_) => {}
            Err(RegistryError::SessionNotFound(_)) => {
                player.send(&ServerMessage::session_not_found()).await;
            }
            Err(RegistryError::NotCreator(_)) => {
                player.send(&ServerMessage::not_creator()).await;
            }
        }
    }

    async fn handle_update(&self, player: &Arc<Player>, update: PlayerUpdate) {
        let event = player.update_state(update).await;

        let Some(session) = self.registry.session_of(player).await else {
            return;
        };

        let grid = session.grid();
        grid.update_player_position(player.id(), event.position).await;
        let nearby = grid.nearby_players(player.id()).await;
        if nearby.is_empty() {
            return;
        }

        if let Some(payload) = encode(&ServerMessage::PlayerUpdate(event)) {
            session.broadcast_to_players(&payload, &nearby).await;
        }
    }

    async fn handle_sound(&self, player: &Arc<Player>, req: SoundRequest) {
        let Some(session) = self.registry.session_of(player).await else {
            return;
        };

        let sound = ServerMessage::PlaySound(PlaySound {
            id: player.id().clone(),
            sound_type: req.sound_type,
            position: req.position,
        });
        let Some(payload) = encode(&sound) else {
            return;
        };

        match session.sound_policy() {
            SoundPolicy::SessionWide => session.broadcast(&payload).await,
            SoundPolicy::Nearby => {
                let nearby = session.grid().nearby_players(player.id()).await;
                session.broadcast_to_players(&payload, &nearby).await;
            }
        }
    }

    /// Leave the current session, if any, and return to the lobby.
    async fn leave_current_session(&self, player: &Arc<Player>) {
        if let Some(session) = self.registry.session_of(player).await {
            self.registry.leave_session(player, &session).await;
            self.registry.add_lobby_player(player.clone()).await;
        }
    }
}
