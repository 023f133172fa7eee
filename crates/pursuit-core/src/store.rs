use std::collections::HashMap;

use crate::events::EventSink;
use crate::player::{PlayerId, PlayerPatch, PlayerPursuitState, RoomId, SPEED_MAX, SPEED_MIN};

/// How a write is tagged. Reset writes are the only path allowed to raise
/// health or revive an eliminated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Normal,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(PlayerId),
    /// The write would raise health outside a reset. Applied as a no-op.
    HealthRaise {
        player_id: PlayerId,
        from: i32,
        to: i32,
    },
    /// The write would revive an eliminated player outside a reset.
    Revive(PlayerId),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "player {id} not found"),
            Self::HealthRaise { player_id, from, to } => {
                write!(f, "write would raise player {player_id} health {from} -> {to}")
            },
            Self::Revive(id) => write!(f, "write would revive eliminated player {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Authoritative per-player record store for one room.
///
/// Every write is clamped to the health/speed bounds before applying, and
/// writes that would violate the health-monotonicity or permanent-death
/// invariants are rejected as logged no-ops unless tagged [`WriteKind::Reset`].
/// A successful write emits `player.changed` on the supplied sink.
#[derive(Debug)]
pub struct PursuitStore {
    room_id: RoomId,
    max_health: i32,
    players: HashMap<PlayerId, PlayerPursuitState>,
    join_order: Vec<PlayerId>,
}

impl PursuitStore {
    pub fn new(room_id: RoomId, max_health: i32) -> Self {
        Self {
            room_id,
            max_health,
            players: HashMap::new(),
            join_order: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    /// Create a record for a newly joined player at lifecycle defaults and
    /// emit `player.changed`. Rejoining an existing id is a no-op returning
    /// the current record.
    pub fn insert_player(
        &mut self,
        player_id: PlayerId,
        now_ms: u64,
        sink: &mut EventSink,
    ) -> &PlayerPursuitState {
        if !self.players.contains_key(&player_id) {
            let state =
                PlayerPursuitState::new(self.room_id.clone(), player_id, self.max_health, now_ms);
            sink.player_changed(&state);
            self.players.insert(player_id, state);
            self.join_order.push(player_id);
        }
        &self.players[&player_id]
    }

    /// Drop a player's record (room teardown or permanent leave).
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<PlayerPursuitState> {
        self.join_order.retain(|&id| id != player_id);
        self.players.remove(&player_id)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&PlayerPursuitState> {
        self.players.get(&player_id)
    }

    /// All records in join order.
    pub fn list(&self) -> Vec<&PlayerPursuitState> {
        self.join_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .collect()
    }

    /// Player ids in join order.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.join_order.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn living_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive).count()
    }

    /// Apply a partial write. Clamps health and speed to their bounds,
    /// rejects invariant-violating writes (no-op, logged) unless tagged as a
    /// reset, and emits `player.changed` after a successful write.
    pub fn upsert(
        &mut self,
        player_id: PlayerId,
        patch: PlayerPatch,
        kind: WriteKind,
        sink: &mut EventSink,
    ) -> Result<&PlayerPursuitState, StoreError> {
        let Some(state) = self.players.get_mut(&player_id) else {
            return Err(StoreError::NotFound(player_id));
        };

        let mut patch = patch;
        if let Some(health) = patch.health {
            let clamped = health.clamp(0, self.max_health);
            if kind == WriteKind::Normal && clamped > state.health {
                tracing::warn!(
                    room = %self.room_id,
                    player_id,
                    from = state.health,
                    to = clamped,
                    "rejecting non-reset write that raises health"
                );
                return Err(StoreError::HealthRaise {
                    player_id,
                    from: state.health,
                    to: clamped,
                });
            }
            patch.health = Some(clamped);
        }
        if let Some(speed) = patch.speed {
            patch.speed = Some(speed.clamp(SPEED_MIN, SPEED_MAX));
        }
        if kind == WriteKind::Normal && patch.is_alive == Some(true) && !state.is_alive {
            tracing::warn!(
                room = %self.room_id,
                player_id,
                "rejecting non-reset write that revives an eliminated player"
            );
            return Err(StoreError::Revive(player_id));
        }
        // An eliminated player never re-acquires a countdown; drop that
        // field and apply the rest.
        if kind == WriteKind::Normal
            && !state.is_alive
            && matches!(patch.countdown, Some(Some(_)))
        {
            tracing::warn!(
                room = %self.room_id,
                player_id,
                "dropping countdown write for eliminated player"
            );
            patch.countdown = Some(None);
        }

        if let Some(health) = patch.health {
            state.health = health;
        }
        if let Some(speed) = patch.speed {
            state.speed = speed;
        }
        if let Some(attacked) = patch.is_being_attacked {
            state.is_being_attacked = attacked;
        }
        if let Some(alive) = patch.is_alive {
            state.is_alive = alive;
        }
        if let Some(last) = patch.last_answer_time {
            state.last_answer_time = last;
        }
        if let Some(countdown) = patch.countdown {
            state.countdown = countdown;
        }

        sink.player_changed(state);
        Ok(&self.players[&player_id])
    }
}
