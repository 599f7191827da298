//! Game Session
//!
//! A named room of players sharing one world. Sessions start out idling;
//! only the creator can start them. Membership sits behind the session's
//! own lock; the member count and started flag are mirrored in atomics so
//! session lists and health checks never wait on a broadcast in progress.
//! Presence filtering goes through the session's spatial grid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::error;

use crate::core::{PlayerId, SessionId};
use crate::network::protocol::{Payload, PlayerInfo, SessionInfo};
use crate::network::telemetry::Telemetry;

use super::player::Player;
use super::spatial::{SpatialConfig, SpatialGrid};

/// Who receives `playSound`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SoundPolicy {
    /// Every member of the session.
    #[default]
    SessionWide,
    /// Same area of interest as presence updates.
    Nearby,
}

/// Per-session tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionConfig {
    /// Spatial grid tuning.
    pub spatial: SpatialConfig,
    /// Sound relay policy.
    pub sound_policy: SoundPolicy,
}

/// Outcome of removing a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Departure {
    /// The creator left before the game started; the session must go.
    Abandoned,
    /// A member left.
    Left {
        /// No members remain.
        now_empty: bool,
    },
    /// The player was not a member.
    NotMember,
}

#[derive(Debug, Default)]
struct Membership {
    players: HashMap<PlayerId, Arc<Player>>,
    /// Set once the session is on its way out of the registry. Closed
    /// sessions admit nobody.
    closed: bool,
}

/// A game session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    creator_id: PlayerId,
    created_at: DateTime<Utc>,
    inner: RwLock<Membership>,
    member_count: AtomicUsize,
    started: AtomicBool,
    grid: SpatialGrid,
    sound_policy: SoundPolicy,
    telemetry: Arc<Telemetry>,
}

impl Session {
    /// Create an idle, empty session.
    pub fn new(
        id: SessionId,
        name: String,
        creator_id: PlayerId,
        config: &SessionConfig,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            id,
            name,
            creator_id,
            created_at: Utc::now(),
            inner: RwLock::new(Membership::default()),
            member_count: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            grid: SpatialGrid::new(config.spatial),
            sound_policy: config.sound_policy,
            telemetry,
        }
    }

    /// Create an idle session whose only member is `creator`.
    pub fn with_creator(
        id: SessionId,
        name: String,
        creator: Arc<Player>,
        config: &SessionConfig,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let mut session = Self::new(id, name, creator.id().clone(), config, telemetry);
        session.inner.get_mut().players.insert(creator.id().clone(), creator);
        *session.member_count.get_mut() = 1;
        session
    }

    /// Session code.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creator's player ID.
    pub fn creator_id(&self) -> &PlayerId {
        &self.creator_id
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Spatial index for this session.
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Sound relay policy.
    pub fn sound_policy(&self) -> SoundPolicy {
        self.sound_policy
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Insert `player` and return the other members' info plus the started
    /// flag, all read under the same lock as the insert.
    ///
    /// Returns `None` if the session has closed.
    pub async fn admit(&self, player: Arc<Player>) -> Option<(Vec<PlayerInfo>, bool)> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return None;
        }

        let mut existing = Vec::with_capacity(inner.players.len());
        for (id, member) in inner.players.iter() {
            if id != player.id() {
                existing.push(member.export_info().await);
            }
        }

        inner.players.insert(player.id().clone(), player);
        self.member_count.store(inner.players.len(), Ordering::Release);
        Some((existing, self.is_started()))
    }

    /// Remove `id` from the session and its grid.
    ///
    /// A departure that dooms the session (the creator leaving before the
    /// start, or the last member leaving a started game) closes it in the
    /// same step, so nobody can join in between.
    pub async fn remove_player(&self, id: &PlayerId) -> Departure {
        let departure = {
            let mut inner = self.inner.write().await;
            if inner.players.remove(id).is_none() {
                return Departure::NotMember;
            }
            self.member_count.store(inner.players.len(), Ordering::Release);

            let started = self.is_started();
            if *id == self.creator_id && !started {
                inner.closed = true;
                Departure::Abandoned
            } else {
                let now_empty = inner.players.is_empty();
                if now_empty && started {
                    inner.closed = true;
                }
                Departure::Left { now_empty }
            }
        };

        self.grid.remove_player(id).await;
        departure
    }

    /// Close the session, then remove and return every member.
    pub async fn drain_players(&self) -> Vec<Arc<Player>> {
        let players: Vec<_> = {
            let mut inner = self.inner.write().await;
            inner.closed = true;
            self.member_count.store(0, Ordering::Release);
            inner.players.drain().map(|(_, p)| p).collect()
        };
        for player in &players {
            self.grid.remove_player(player.id()).await;
        }
        players
    }

    /// Whether `id` is a member.
    pub async fn contains(&self, id: &PlayerId) -> bool {
        self.inner.read().await.players.contains_key(id)
    }

    /// Close the session if it has no members. Returns whether it did.
    pub async fn close_if_empty(&self) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.players.is_empty() {
            return false;
        }
        inner.closed = true;
        true
    }

    /// Whether the session has closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Whether the session has no members.
    pub fn is_empty(&self) -> bool {
        self.player_count() == 0
    }

    /// Number of members.
    pub fn player_count(&self) -> usize {
        self.member_count.load(Ordering::Acquire)
    }

    /// Whether the game is in progress.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether `id` created this session.
    pub fn is_creator(&self, id: &PlayerId) -> bool {
        self.creator_id == *id
    }

    /// Move the session to in-progress. Idempotent.
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Public projection for session lists. Never waits on the membership
    /// lock.
    pub fn export_info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            creator_id: self.creator_id.clone(),
            player_count: self.player_count(),
            created_at: self.created_at,
            started: self.is_started(),
        }
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Send `payload` to every member.
    pub async fn broadcast(&self, payload: &Arc<Payload>) {
        let inner = self.inner.read().await;
        fan_out(inner.players.values(), payload, &self.telemetry).await;
    }

    /// Send `payload` to the listed members. Unknown IDs are skipped.
    pub async fn broadcast_to_players(&self, payload: &Arc<Payload>, ids: &[PlayerId]) {
        let inner = self.inner.read().await;
        fan_out(
            ids.iter().filter_map(|id| inner.players.get(id)),
            payload,
            &self.telemetry,
        )
        .await;
    }
}

/// Send `payload` to each recipient on its own task and wait for all of
/// them. A failed send only affects its recipient.
pub async fn fan_out<'a, I>(recipients: I, payload: &Arc<Payload>, telemetry: &Telemetry)
where
    I: IntoIterator<Item = &'a Arc<Player>>,
{
    let mut tasks = JoinSet::new();
    for player in recipients {
        let player = Arc::clone(player);
        let payload = Arc::clone(payload);
        tasks.spawn(async move { player.send_payload(&payload).await });
    }

    let recipients = tasks.len();
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(kind = payload.kind(), "Broadcast task failed: {}", e);
        }
    }
    telemetry.record_broadcast(recipients).await;
}
