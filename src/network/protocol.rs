//! Protocol Messages
//!
//! Wire format for client-relay communication over WebSocket.
//! Every frame is a JSON text frame with a `type` discriminator and
//! camelCase field names, matching what the browser client sends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, SessionId, Vec3, Yaw};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask for the current session roster.
    ListSessions,

    /// Create a session and join it as its creator.
    CreateSession(CreateSessionRequest),

    /// Join an existing session by code.
    JoinSession(JoinSessionRequest),

    /// Creator-only: flip the session from idling to in-progress.
    StartSession(StartSessionRequest),

    /// Full presence state of the sender.
    Update(PlayerUpdate),

    /// Sound emitted by the sender.
    Sound(SoundRequest),

    /// Any `type` this relay does not know. Ignored.
    #[serde(other)]
    Unknown,
}

/// Create session request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Display name for the session.
    #[serde(default)]
    pub session_name: String,
    /// Creator's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Join session request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    /// Session code. Missing codes are treated as unknown sessions.
    #[serde(default)]
    pub session_id: String,
    /// Joiner's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Start session request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Session code.
    #[serde(default)]
    pub session_id: String,
}

/// Presence update. Always carries the full state, never a delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    /// World position.
    #[serde(default)]
    pub position: Vec3,
    /// Camera/body yaw.
    #[serde(default)]
    pub rotation: Yaw,
    /// Model yaw.
    #[serde(default)]
    pub model_rotation: Yaw,
    /// Animation tag.
    #[serde(default)]
    pub animation: String,
}

/// Sound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundRequest {
    /// Sound tag understood by the client.
    #[serde(default)]
    pub sound_type: String,
    /// Where the sound was emitted.
    #[serde(default)]
    pub position: Vec3,
}

impl ClientMessage {
    /// Wire name of the message type, used for telemetry labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::ListSessions => "listSessions",
            ClientMessage::CreateSession(_) => "createSession",
            ClientMessage::JoinSession(_) => "joinSession",
            ClientMessage::StartSession(_) => "startSession",
            ClientMessage::Update(_) => "update",
            ClientMessage::Sound(_) => "sound",
            ClientMessage::Unknown => "unknown",
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Session roster.
    UpdateSessionList {
        /// All live sessions.
        sessions: Vec<SessionInfo>,
    },

    /// Session was created by the recipient.
    SessionCreated(SessionCreated),

    /// Recipient joined a session.
    SessionJoined(SessionJoined),

    /// Session moved from idling to in-progress.
    SessionStarted(SessionStarted),

    /// Someone joined the recipient's session (or any session, for lobby
    /// listeners).
    PlayerJoined {
        /// Joiner's public info.
        player: PlayerInfo,
    },

    /// Someone left.
    PlayerLeft {
        /// Leaver's ID.
        id: PlayerId,
    },

    /// Presence update of a nearby player.
    PlayerUpdate(PlayerUpdateEvent),

    /// Sound emitted by a session member.
    PlaySound(PlaySound),

    /// Request-scoped failure.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// Public projection of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session code.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Creator's player ID.
    pub creator_id: PlayerId,
    /// Live member count.
    pub player_count: usize,
    /// Creation time (RFC 3339).
    pub created_at: DateTime<Utc>,
    /// Whether the game is in progress.
    pub started: bool,
}

/// Public projection of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Player ID.
    pub id: PlayerId,
    /// Display name (empty until set).
    pub username: String,
    /// World position.
    pub position: Vec3,
    /// Yaw.
    pub rotation: Yaw,
    /// Model yaw.
    pub model_rotation: Yaw,
    /// Animation tag.
    pub animation: String,
}

/// Session created confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// Session code.
    pub session_id: SessionId,
    /// Display name.
    pub session_name: String,
}

/// Session joined confirmation with the initial roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoined {
    /// Session code.
    pub session_id: SessionId,
    /// The recipient's own player ID.
    pub player_id: PlayerId,
    /// Members present before the recipient joined.
    pub players: Vec<PlayerInfo>,
    /// Whether the game is already running.
    pub started: bool,
}

/// Session started notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    /// Session code.
    pub session_id: SessionId,
}

/// Presence update relayed to nearby players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateEvent {
    /// Originating player.
    pub id: PlayerId,
    /// World position.
    pub position: Vec3,
    /// Yaw.
    pub rotation: Yaw,
    /// Model yaw.
    pub model_rotation: Yaw,
    /// Animation tag.
    pub animation: String,
}

/// Sound relayed to session members.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySound {
    /// Emitter.
    pub id: PlayerId,
    /// Sound tag.
    pub sound_type: String,
    /// Emission point.
    pub position: Vec3,
}

impl ServerMessage {
    /// Error reply for an unknown session code.
    pub fn session_not_found() -> Self {
        ServerMessage::Error {
            message: "Session not found. Please check the ID and try again.".to_string(),
        }
    }

    /// Error reply for a non-creator trying to start a session.
    pub fn not_creator() -> Self {
        ServerMessage::Error {
            message: "Only the session creator can start the game".to_string(),
        }
    }

    /// Wire name of the message type, used for telemetry labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::UpdateSessionList { .. } => "updateSessionList",
            ServerMessage::SessionCreated(_) => "sessionCreated",
            ServerMessage::SessionJoined(_) => "sessionJoined",
            ServerMessage::SessionStarted(_) => "sessionStarted",
            ServerMessage::PlayerJoined { .. } => "playerJoined",
            ServerMessage::PlayerLeft { .. } => "playerLeft",
            ServerMessage::PlayerUpdate(_) => "playerUpdate",
            ServerMessage::PlaySound(_) => "playSound",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// =============================================================================
// ENCODED PAYLOADS
// =============================================================================

/// A server message serialized once and shared by every recipient of a
/// broadcast.
#[derive(Debug, Clone)]
pub struct Payload {
    kind: &'static str,
    text: Arc<str>,
}

impl Payload {
    /// Serialize a message.
    pub fn encode(msg: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: msg.kind(),
            text: msg.to_json()?.into(),
        })
    }

    /// Message type label.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// JSON text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the encoded text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
