//! Global Registry
//!
//! Owns the lobby (connected players not in a session) and the session
//! table. The registry lock only covers edits to those two maps; it is
//! never held while waiting on a session, so a slow broadcast in one
//! session cannot stall lookups, joins or health checks elsewhere.
//!
//! Lock order is registry, then session, then player. The grid and
//! connection locks are leaves.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::core::{PlayerId, SessionId};
use crate::network::protocol::{
    Payload, PlayerInfo, ServerMessage, SessionCreated, SessionInfo, SessionJoined,
    SessionStarted,
};
use crate::network::telemetry::Telemetry;

use super::player::Player;
use super::session::{fan_out, Departure, Session, SessionConfig};

/// Registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live session has the requested code.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Only the creator may do this.
    #[error("player {0} is not the session creator")]
    NotCreator(PlayerId),
}

#[derive(Debug, Default)]
struct RegistryState {
    lobby: HashMap<PlayerId, Arc<Player>>,
    sessions: HashMap<SessionId, Arc<Session>>,
}

/// Process-wide lobby and session table.
#[derive(Debug)]
pub struct Registry {
    state: RwLock<RegistryState>,
    session_config: SessionConfig,
    telemetry: Arc<Telemetry>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(session_config: SessionConfig, telemetry: Arc<Telemetry>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            session_config,
            telemetry,
        }
    }

    /// Shared telemetry.
    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    // =========================================================================
    // Lobby
    // =========================================================================

    /// Put a freshly connected player in the lobby.
    pub async fn add_lobby_player(&self, player: Arc<Player>) {
        let id = player.id().clone();
        self.state.write().await.lobby.insert(id.clone(), player);
        debug!(player = %id, "Player added to lobby");
    }

    /// Remove a player from the lobby. No-op if absent.
    pub async fn remove_lobby_player(&self, id: &PlayerId) -> bool {
        let removed = self.state.write().await.lobby.remove(id).is_some();
        if removed {
            debug!(player = %id, "Player removed from lobby");
        }
        removed
    }

    /// Number of players in the lobby.
    pub async fn lobby_count(&self) -> usize {
        self.state.read().await.lobby.len()
    }

    /// Whether `id` is in the lobby.
    pub async fn in_lobby(&self, id: &PlayerId) -> bool {
        self.state.read().await.lobby.contains_key(id)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Create a session and move `creator` into it.
    ///
    /// An empty `name` falls back to the session code. The creator receives
    /// `sessionCreated` then `sessionJoined`; the lobby sees the new roster.
    pub async fn create_and_join(&self, creator: &Arc<Player>, name: String) -> Arc<Session> {
        let session = {
            let mut state = self.state.write().await;

            let id = loop {
                let candidate = SessionId::generate();
                if !state.sessions.contains_key(&candidate) {
                    break candidate;
                }
                debug!(session = %candidate, "Session code collision, regenerating");
            };
            let name = if name.is_empty() { id.to_string() } else { name };

            // The creator is a member from the moment the session is visible.
            let session = Arc::new(Session::with_creator(
                id.clone(),
                name,
                creator.clone(),
                &self.session_config,
                self.telemetry.clone(),
            ));
            state.sessions.insert(id, session.clone());
            state.lobby.remove(creator.id());
            session
        };
        creator.set_session(session.id().clone()).await;

        self.telemetry.session_created();
        info!(
            session = %session.id(),
            name = session.name(),
            creator = %creator.id(),
            "Session created"
        );

        creator
            .send(&ServerMessage::SessionCreated(SessionCreated {
                session_id: session.id().clone(),
                session_name: session.name().to_string(),
            }))
            .await;
        self.announce_join(&session, creator, Vec::new(), false).await;
        self.broadcast_session_list().await;

        session
    }

    /// Move `player` into the session with code `session_id`.
    pub async fn join(
        &self,
        player: &Arc<Player>,
        session_id: &SessionId,
    ) -> Result<Arc<Session>, RegistryError> {
        let session = {
            let mut state = self.state.write().await;
            let session = state
                .sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| RegistryError::SessionNotFound(session_id.clone()))?;
            state.lobby.remove(player.id());
            session
        };

        let Some((existing, started)) = session.admit(player.clone()).await else {
            // Closed between the lookup and the insert.
            self.return_to_lobby(player).await;
            return Err(RegistryError::SessionNotFound(session_id.clone()));
        };
        player.set_session(session_id.clone()).await;

        let players = session.player_count();
        info!(
            session = %session.id(),
            player = %player.id(),
            players,
            "Player joined session"
        );
        self.announce_join(&session, player, existing, started).await;

        Ok(session)
    }

    /// Start session `session_id` on behalf of `player` and tell its members.
    pub async fn start_session(
        &self,
        player: &Player,
        session_id: &SessionId,
    ) -> Result<Arc<Session>, RegistryError> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.clone()))?;
        if !session.is_creator(player.id()) {
            return Err(RegistryError::NotCreator(player.id().clone()));
        }

        session.start();
        info!(session = %session.id(), creator = %player.id(), "Session started");

        let started = ServerMessage::SessionStarted(SessionStarted {
            session_id: session.id().clone(),
        });
        if let Some(payload) = encode(&started) {
            session.broadcast(&payload).await;
        }
        Ok(session)
    }

    /// `sessionJoined` to the joiner, then `playerJoined` to the session and
    /// the lobby.
    async fn announce_join(
        &self,
        session: &Arc<Session>,
        player: &Arc<Player>,
        existing: Vec<PlayerInfo>,
        started: bool,
    ) {
        player
            .send(&ServerMessage::SessionJoined(SessionJoined {
                session_id: session.id().clone(),
                player_id: player.id().clone(),
                players: existing,
                started,
            }))
            .await;

        let joined = ServerMessage::PlayerJoined {
            player: player.export_info().await,
        };
        if let Some(payload) = encode(&joined) {
            session.broadcast(&payload).await;
            self.broadcast_lobby(&payload).await;
        }
    }

    /// Take `player` out of `session`, applying the deletion rules.
    ///
    /// The player is not returned to the lobby; callers that keep the
    /// player connected do that themselves.
    pub async fn leave_session(&self, player: &Arc<Player>, session: &Arc<Session>) -> Departure {
        let departure = session.remove_player(player.id()).await;
        player.clear_session().await;

        match departure {
            Departure::NotMember => {}
            Departure::Abandoned => {
                info!(
                    session = %session.id(),
                    creator = %player.id(),
                    "Creator left idling session, removing it"
                );
                self.remove_session(session.id()).await;
            }
            Departure::Left { now_empty } => {
                info!(
                    session = %session.id(),
                    player = %player.id(),
                    "Player left session"
                );
                let left = ServerMessage::PlayerLeft {
                    id: player.id().clone(),
                };
                if let Some(payload) = encode(&left) {
                    if !now_empty {
                        session.broadcast(&payload).await;
                    }
                    self.broadcast_lobby(&payload).await;
                }
                if now_empty && session.is_started() {
                    self.remove_session(session.id()).await;
                }
            }
        }

        departure
    }

    /// Remove a player entirely: leave its session or the lobby.
    pub async fn disconnect(&self, player: &Arc<Player>) {
        if let Some(session) = self.session_of(player).await {
            self.leave_session(player, &session).await;
        }
        // The session may have been swept while we were leaving it, which
        // moves its members to the lobby.
        self.remove_lobby_player(player.id()).await;
    }

    /// Session with code `id`.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.state.read().await.sessions.get(id).cloned()
    }

    /// Session `player` currently belongs to.
    pub async fn session_of(&self, player: &Player) -> Option<Arc<Session>> {
        let id = player.session_id().await?;
        self.get_session(&id).await
    }

    /// All live sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .live_sessions()
            .await
            .iter()
            .map(|session| session.export_info())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Delete a session, returning any remaining members to the lobby.
    ///
    /// The lobby receives the updated roster.
    pub async fn remove_session(&self, id: &SessionId) -> bool {
        let Some(session) = self.state.write().await.sessions.remove(id) else {
            return false;
        };

        let orphans = session.drain_players().await;
        for orphan in &orphans {
            orphan.clear_session().await;
        }
        {
            let mut state = self.state.write().await;
            for orphan in orphans {
                if !orphan.is_disconnected() {
                    state.lobby.insert(orphan.id().clone(), orphan);
                }
            }
        }

        info!(session = %id, "Session removed");
        self.broadcast_session_list().await;
        true
    }

    /// Delete every session with no members. Returns how many went.
    pub async fn sweep_empty_sessions(&self) -> usize {
        let mut closed = Vec::new();
        for session in self.live_sessions().await {
            if session.is_empty() && session.close_if_empty().await {
                closed.push(session);
            }
        }
        if closed.is_empty() {
            return 0;
        }

        {
            let mut state = self.state.write().await;
            for session in &closed {
                let current = state.sessions.get(session.id());
                if current.is_some_and(|live| Arc::ptr_eq(live, session)) {
                    state.sessions.remove(session.id());
                }
            }
        }

        for session in &closed {
            info!(session = %session.id(), "Swept empty session");
        }
        self.broadcast_session_list().await;
        closed.len()
    }

    /// `(players, sessions)`, where players counts the lobby plus every
    /// session member.
    pub async fn counts(&self) -> (usize, usize) {
        let (lobby, sessions) = {
            let state = self.state.read().await;
            (state.lobby.len(), state.sessions.values().cloned().collect::<Vec<_>>())
        };
        let members: usize = sessions.iter().map(|session| session.player_count()).sum();
        (lobby + members, sessions.len())
    }

    /// Handles to every session in the table. The registry lock is released
    /// before the caller touches any of them.
    async fn live_sessions(&self) -> Vec<Arc<Session>> {
        self.state.read().await.sessions.values().cloned().collect()
    }

    /// Put a player that is still connected back in the lobby.
    async fn return_to_lobby(&self, player: &Arc<Player>) {
        let mut state = self.state.write().await;
        if !player.is_disconnected() {
            state.lobby.insert(player.id().clone(), player.clone());
        }
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Send `payload` to every lobby player.
    pub async fn broadcast_lobby(&self, payload: &Arc<Payload>) {
        let recipients: Vec<Arc<Player>> = self.state.read().await.lobby.values().cloned().collect();
        fan_out(recipients.iter(), payload, &self.telemetry).await;
    }

    /// Send the current roster to the lobby.
    pub async fn broadcast_session_list(&self) {
        let list = ServerMessage::UpdateSessionList {
            sessions: self.list_sessions().await,
        };
        if let Some(payload) = encode(&list) {
            self.broadcast_lobby(&payload).await;
        }
    }
}

/// Encode once for a broadcast. Failures are logged.
pub(crate) fn encode(message: &ServerMessage) -> Option<Arc<Payload>> {
    match Payload::encode(message) {
        Ok(payload) => Some(Arc::new(payload)),
        Err(e) => {
            error!(kind = message.kind(), "Failed to encode broadcast: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::game::player::test_support::{stalled_player, test_player};
    use crate::network::connection::test_support::{assert_silent, recv, TestClient};

    fn registry() -> (Arc<Registry>, Arc<Telemetry>) {
        let telemetry = Arc::new(Telemetry::new());
        (
            Arc::new(Registry::new(SessionConfig::default(), telemetry.clone())),
            telemetry,
        )
    }

    async fn lobby_player(registry: &Registry, telemetry: &Arc<Telemetry>) -> (Arc<Player>, TestClient) {
        let (player, client) = test_player(telemetry).await;
        registry.add_lobby_player(player.clone()).await;
        (player, client)
    }

    #[tokio::test]
    async fn test_create_and_join_moves_creator_out_of_lobby() {
        let (registry, telemetry) = registry();
        let (alice, mut ca) = lobby_player(&registry, &telemetry).await;

        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;

        assert!(!registry.in_lobby(alice.id()).await);
        assert_eq!(alice.session_id().await.as_ref(), Some(session.id()));
        assert_eq!(registry.counts().await, (1, 1));

        match recv(&mut ca).await {
            ServerMessage::SessionCreated(created) => {
                assert_eq!(created.session_id, *session.id());
                assert_eq!(created.session_name, "Alpha");
            }
            other => panic!("expected sessionCreated, got {:?}", other),
        }
        match recv(&mut ca).await {
            ServerMessage::SessionJoined(joined) => {
                assert_eq!(joined.player_id, *alice.id());
                assert!(joined.players.is_empty());
                assert!(!joined.started);
            }
            other => panic!("expected sessionJoined, got {:?}", other),
        }
        assert!(matches!(recv(&mut ca).await, ServerMessage::PlayerJoined { .. }));
    }

    #[tokio::test]
    async fn test_empty_name_falls_back_to_code() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, String::new()).await;
        assert_eq!(session.name(), session.id().as_str());
    }

    #[tokio::test]
    async fn test_lobby_sees_new_sessions_and_joins() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (carol, mut cc) = lobby_player(&registry, &telemetry).await;

        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;

        // playerJoined mirror, then the roster.
        assert!(matches!(recv(&mut cc).await, ServerMessage::PlayerJoined { .. }));
        match recv(&mut cc).await {
            ServerMessage::UpdateSessionList { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].id, *session.id());
                assert_eq!(sessions[0].player_count, 1);
            }
            other => panic!("expected updateSessionList, got {:?}", other),
        }
        assert!(registry.in_lobby(carol.id()).await);
    }

    #[tokio::test]
    async fn test_join_unknown_session() {
        let (registry, telemetry) = registry();
        let (bob, _cb) = lobby_player(&registry, &telemetry).await;

        let err = registry.join(&bob, &SessionId::from("ZZZZZZ")).await.unwrap_err();
        assert_eq!(err, RegistryError::SessionNotFound(SessionId::from("ZZZZZZ")));
        assert!(registry.in_lobby(bob.id()).await);
    }

    #[tokio::test]
    async fn test_join_delivers_roster_and_announcement() {
        let (registry, telemetry) = registry();
        let (alice, mut ca) = lobby_player(&registry, &telemetry).await;
        let (bob, mut cb) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        for _ in 0..3 {
            recv(&mut ca).await;
        }
        // Bob was in the lobby for the mirror and the roster.
        recv(&mut cb).await;
        recv(&mut cb).await;

        registry.join(&bob, session.id()).await.unwrap();

        match recv(&mut cb).await {
            ServerMessage::SessionJoined(joined) => {
                assert_eq!(joined.players.len(), 1);
                assert_eq!(joined.players[0].id, *alice.id());
            }
            other => panic!("expected sessionJoined, got {:?}", other),
        }
        match recv(&mut ca).await {
            ServerMessage::PlayerJoined { player } => assert_eq!(player.id, *bob.id()),
            other => panic!("expected playerJoined, got {:?}", other),
        }
        assert_eq!(session.player_count(), 2);
        assert_eq!(registry.counts().await, (2, 1));
    }

    #[tokio::test]
    async fn test_idle_creator_leaving_removes_session() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (bob, _cb) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        registry.join(&bob, session.id()).await.unwrap();

        assert!(alice.mark_disconnected());
        registry.disconnect(&alice).await;

        assert!(registry.list_sessions().await.is_empty());
        assert!(registry.get_session(session.id()).await.is_none());
        // Bob is orphaned back into the lobby.
        assert!(registry.in_lobby(bob.id()).await);
        assert!(bob.session_id().await.is_none());
        assert_eq!(registry.counts().await, (1, 0));
    }

    #[tokio::test]
    async fn test_started_session_removed_when_last_member_leaves() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (bob, mut cb) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        registry.join(&bob, session.id()).await.unwrap();
        session.start();

        registry.disconnect(&alice).await;
        assert_eq!(session.player_count(), 1);
        assert!(registry.get_session(session.id()).await.is_some());

        // Drain everything Bob saw so far, the last frame is Alice leaving.
        let mut saw_left = false;
        while let Ok(msg) = tokio::time::timeout(Duration::from_millis(200), recv(&mut cb)).await {
            if let ServerMessage::PlayerLeft { id } = msg {
                assert_eq!(id, *alice.id());
                saw_left = true;
            }
        }
        assert!(saw_left);

        registry.disconnect(&bob).await;
        assert!(registry.get_session(session.id()).await.is_none());
        assert_eq!(registry.counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_player_count_tracks_membership() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        session.start();

        let mut members = Vec::new();
        for _ in 0..5 {
            let (p, c) = lobby_player(&registry, &telemetry).await;
            registry.join(&p, session.id()).await.unwrap();
            members.push((p, c));
        }
        for (p, _) in members.iter().take(2) {
            registry.disconnect(p).await;
        }

        let listed = registry.list_sessions().await;
        assert_eq!(listed[0].player_count, 4);
        assert_eq!(listed[0].player_count, session.player_count());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_empty_sessions() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (bob, _cb) = lobby_player(&registry, &telemetry).await;
        let kept = registry.create_and_join(&alice, "Kept".to_string()).await;
        let swept = registry.create_and_join(&bob, "Swept".to_string()).await;
        swept.remove_player(bob.id()).await;

        assert_eq!(registry.sweep_empty_sessions().await, 1);
        assert!(registry.get_session(kept.id()).await.is_some());
        assert!(registry.get_session(swept.id()).await.is_none());
        assert_eq!(registry.sweep_empty_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_list_sessions_is_oldest_first() {
        let (registry, telemetry) = registry();
        let mut expected = Vec::new();
        for name in ["one", "two", "three"] {
            let (p, c) = lobby_player(&registry, &telemetry).await;
            let session = registry.create_and_join(&p, name.to_string()).await;
            expected.push((session.id().clone(), p, c));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let listed: Vec<SessionId> = registry.list_sessions().await.into_iter().map(|s| s.id).collect();
        let expected: Vec<SessionId> = expected.into_iter().map(|(id, _, _)| id).collect();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_only_creator_can_start() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (bob, _cb) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        registry.join(&bob, session.id()).await.unwrap();

        let err = registry.start_session(&bob, session.id()).await.unwrap_err();
        assert_eq!(err, RegistryError::NotCreator(bob.id().clone()));
        assert!(!session.is_started());

        registry.start_session(&alice, session.id()).await.unwrap();
        assert!(session.is_started());
        assert!(registry.list_sessions().await[0].started);

        let missing = registry.start_session(&alice, &SessionId::from("QQQQQQ")).await;
        assert!(matches!(missing, Err(RegistryError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_slow_member_does_not_stall_other_sessions() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let session_a = registry.create_and_join(&alice, "A".to_string()).await;
        let slow = stalled_player(&telemetry);
        session_a.admit(slow.clone()).await;
        slow.set_session(session_a.id().clone()).await;

        // A fan-out in A waits on the slow member while holding A's lock.
        let payload = encode(&ServerMessage::not_creator()).unwrap();
        let stuck = {
            let session_a = session_a.clone();
            tokio::spawn(async move { session_a.broadcast(&payload).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A join to A queues behind that fan-out.
        let (carol, _cc) = lobby_player(&registry, &telemetry).await;
        let joining = {
            let registry = registry.clone();
            let carol = carol.clone();
            let id = session_a.id().clone();
            tokio::spawn(async move { registry.join(&carol, &id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!joining.is_finished());

        let (dave, mut cd) = lobby_player(&registry, &telemetry).await;
        let session_b = tokio::time::timeout(Duration::from_secs(2), async {
            assert_eq!(registry.list_sessions().await.len(), 1);
            assert_eq!(registry.counts().await, (3, 1));
            assert!(registry.get_session(session_a.id()).await.is_some());
            registry.create_and_join(&dave, "B".to_string()).await
        })
        .await
        .expect("session B waited on session A");

        assert!(matches!(recv(&mut cd).await, ServerMessage::SessionCreated(_)));
        let current = registry.session_of(&dave).await.map(|s| s.id().clone());
        assert_eq!(current.as_ref(), Some(session_b.id()));
        stuck.abort();
        joining.abort();
    }

    #[tokio::test]
    async fn test_join_racing_creator_departure_is_not_found() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let (bob, mut cb) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;

        // The creator is out of the membership but the table still lists
        // the session.
        assert_eq!(session.remove_player(alice.id()).await, Departure::Abandoned);
        assert!(registry.get_session(session.id()).await.is_some());

        let err = registry.join(&bob, session.id()).await.unwrap_err();
        assert_eq!(err, RegistryError::SessionNotFound(session.id().clone()));
        assert!(registry.in_lobby(bob.id()).await);
        assert!(bob.session_id().await.is_none());
        assert!(session.is_empty());

        while let Ok(msg) = tokio::time::timeout(Duration::from_millis(200), recv(&mut cb)).await {
            assert!(
                !matches!(msg, ServerMessage::SessionJoined(_)),
                "joined a session that is being removed"
            );
        }

        assert!(registry.remove_session(session.id()).await);
        assert!(registry.in_lobby(bob.id()).await);
    }

    #[tokio::test]
    async fn test_sweep_spares_session_that_gained_a_member() {
        let (registry, telemetry) = registry();
        let (alice, _ca) = lobby_player(&registry, &telemetry).await;
        let session = registry.create_and_join(&alice, "Alpha".to_string()).await;
        session.start();

        assert_eq!(registry.sweep_empty_sessions().await, 0);
        assert!(registry.get_session(session.id()).await.is_some());
    }

    #[tokio::test]
    async fn test_lobby_only_disconnect() {
        let (registry, telemetry) = registry();
        let (carol, mut cc) = lobby_player(&registry, &telemetry).await;
        registry.disconnect(&carol).await;
        assert_eq!(registry.lobby_count().await, 0);
        assert_silent(&mut cc).await;
    }
}
