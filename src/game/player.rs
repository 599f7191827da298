//! Connected Player
//!
//! One player per WebSocket. Presence state sits behind its own lock so
//! updates from the player's connection task and snapshots taken by
//! broadcasts never see a half-written state.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::core::{PlayerId, SessionId, Vec3, Yaw};
use crate::network::connection::{Connection, ConnectionError};
use crate::network::protocol::{Payload, PlayerInfo, PlayerUpdate, PlayerUpdateEvent, ServerMessage};

/// Animation tag of a freshly connected player.
pub const DEFAULT_ANIMATION: &str = "idle";

/// Mutable presence state.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Display name, empty until set.
    pub username: String,
    /// World position.
    pub position: Vec3,
    /// Yaw.
    pub rotation: Yaw,
    /// Model yaw.
    pub model_rotation: Yaw,
    /// Animation tag.
    pub animation: String,
    /// Session the player belongs to, if any.
    pub session_id: Option<SessionId>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            username: String::new(),
            position: Vec3::default(),
            rotation: Yaw::default(),
            model_rotation: Yaw::default(),
            animation: DEFAULT_ANIMATION.to_string(),
            session_id: None,
        }
    }
}

/// A connected client.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    state: RwLock<PlayerState>,
    connection: Connection,
    disconnected: AtomicBool,
}

impl Player {
    /// Create a player at the origin, idle, in no session.
    pub fn new(id: PlayerId, connection: Connection) -> Self {
        Self {
            id,
            state: RwLock::new(PlayerState::default()),
            connection,
            disconnected: AtomicBool::new(false),
        }
    }

    /// Player ID.
    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    /// Write half of the player's socket.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Encode and send one message to this player. Failures are logged.
    pub async fn send(&self, message: &ServerMessage) {
        match Payload::encode(message) {
            Ok(payload) => self.send_payload(&payload).await,
            Err(e) => error!(kind = message.kind(), "Failed to encode message: {}", e),
        }
    }

    /// Send a pre-encoded message. Failures are logged.
    pub async fn send_payload(&self, payload: &Payload) {
        match self.connection.send(payload).await {
            Ok(()) => {}
            Err(ConnectionError::Closed) => {
                debug!(player = %self.id, kind = payload.kind(), "Skipping send to closed connection");
            }
            Err(e) => {
                warn!(player = %self.id, kind = payload.kind(), "Send failed: {}", e);
            }
        }
    }

    /// Replace all presence fields at once and return the relay event.
    pub async fn update_state(&self, update: PlayerUpdate) -> PlayerUpdateEvent {
        let mut state = self.state.write().await;
        state.position = update.position;
        state.rotation = update.rotation;
        state.model_rotation = update.model_rotation;
        state.animation = update.animation;

        PlayerUpdateEvent {
            id: self.id.clone(),
            position: state.position,
            rotation: state.rotation,
            model_rotation: state.model_rotation,
            animation: state.animation.clone(),
        }
    }

    /// Set the display name.
    pub async fn set_username(&self, username: String) {
        self.state.write().await.username = username;
    }

    /// Record session membership.
    pub async fn set_session(&self, session_id: SessionId) {
        self.state.write().await.session_id = Some(session_id);
    }

    /// Clear session membership.
    pub async fn clear_session(&self) {
        self.state.write().await.session_id = None;
    }

    /// Current session, if any.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.state.read().await.session_id.clone()
    }

    /// Copy of the full state.
    pub async fn snapshot(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    /// Public projection sent to other clients.
    pub async fn export_info(&self) -> PlayerInfo {
        let state = self.state.read().await;
        PlayerInfo {
            id: self.id.clone(),
            username: state.username.clone(),
            position: state.position,
            rotation: state.rotation,
            model_rotation: state.model_rotation,
            animation: state.animation.clone(),
        }
    }

    /// Flag the player as disconnected. Returns true only for the first caller.
    pub fn mark_disconnected(&self) -> bool {
        self.disconnected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the disconnect handler has run.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}
