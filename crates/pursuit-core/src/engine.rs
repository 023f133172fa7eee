use serde::{Deserialize, Serialize};

use crate::attack::{AttackCoordinator, AttackPhase};
use crate::countdown::CountdownSupervisor;
use crate::events::{EventEnvelope, EventSink};
use crate::player::{PlayerId, PlayerPatch, PlayerPursuitState, RoomId, SPEED_MIN};
use crate::room::{PursuitConfig, RoomPursuitState};
use crate::speed::SpeedController;
use crate::store::{PursuitStore, StoreError, WriteKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    PlayerNotFound(PlayerId),
    RejectedWrite(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlayerNotFound(id) => write!(f, "player {id} not found"),
            Self::RejectedWrite(e) => write!(f, "rejected write: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::PlayerNotFound(id),
            other => Self::RejectedWrite(other),
        }
    }
}

/// Full authoritative picture of a room at one instant, used by the
/// anti-entropy pull path. `seq` is the sequence number of the last event
/// emitted before the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub seq: u64,
    pub room: RoomPursuitState,
    pub attack: AttackPhase,
    pub players: Vec<PlayerPursuitState>,
    /// Players idle long enough for views to show an early slow warning.
    /// Display data only; the authoritative decay rule is the engine's.
    pub slow_warnings: Vec<PlayerId>,
}

/// The authoritative pursuit state machine for one room.
///
/// All state transitions for a room flow through one engine instance; the
/// hosting actor serializes calls, so no two mutations interleave. Every
/// public operation returns the events its mutations emitted, stamped with
/// the room's sequence numbers, for fan-out to observers.
#[derive(Debug)]
pub struct PursuitEngine {
    config: PursuitConfig,
    store: PursuitStore,
    room: RoomPursuitState,
    speed: SpeedController,
    countdown: CountdownSupervisor,
    coordinator: AttackCoordinator,
    sink: EventSink,
    seq: u64,
}

impl PursuitEngine {
    /// Build a room's engine with the given players (join order preserved).
    /// The creation events for the initial records are available through
    /// [`PursuitEngine::take_events`].
    pub fn new(room_id: RoomId, config: PursuitConfig, players: &[PlayerId], now_ms: u64) -> Self {
        let mut store = PursuitStore::new(room_id.clone(), config.max_health);
        let mut sink = EventSink::default();
        for &player_id in players {
            store.insert_player(player_id, now_ms, &mut sink);
        }
        Self {
            speed: SpeedController::new(&config),
            countdown: CountdownSupervisor::new(&config),
            coordinator: AttackCoordinator::new(&config),
            room: RoomPursuitState::new(room_id),
            store,
            config,
            sink,
            seq: 0,
        }
    }

    pub fn room_id(&self) -> &str {
        self.store.room_id()
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    /// Seal and return any events buffered since the last call.
    pub fn take_events(&mut self) -> Vec<EventEnvelope> {
        let room_id = self.store.room_id().to_string();
        self.sink
            .drain()
            .into_iter()
            .map(|event| {
                self.seq += 1;
                EventEnvelope {
                    room_id: room_id.clone(),
                    seq: self.seq,
                    event,
                }
            })
            .collect()
    }

    /// The quiz collaborator's answer outcome feed. A correct answer speeds
    /// the player up and interrupts an attack on them; a wrong answer hands
    /// them to the attack coordinator, which decides whether damage is
    /// scheduled. Answers from eliminated players are ignored.
    pub fn report_answer(
        &mut self,
        player_id: PlayerId,
        is_correct: bool,
        now_ms: u64,
    ) -> Result<Vec<EventEnvelope>, EngineError> {
        let Some(state) = self.store.get(player_id) else {
            return Err(EngineError::PlayerNotFound(player_id));
        };
        if !state.is_alive {
            tracing::debug!(room = %self.room.room_id, player_id, "ignoring answer from eliminated player");
            return Ok(Vec::new());
        }

        if is_correct {
            self.speed
                .apply_correct_answer(&mut self.store, player_id, now_ms, &mut self.sink)?;
            self.coordinator.interrupt_for(
                &mut self.store,
                &mut self.room,
                player_id,
                &self.countdown,
                &mut self.sink,
            );
        } else {
            self.speed
                .apply_wrong_answer(&mut self.store, player_id, now_ms, &mut self.sink)?;
            self.coordinator
                .request_attack(&mut self.store, &mut self.room, player_id, &mut self.sink);
        }
        self.prune_queue();
        Ok(self.take_events())
    }

    /// Drop queued players that are no longer eligible, keeping the queue
    /// invariant visible at every observable instant (a correct answer can
    /// lift a queued player past the speed threshold).
    fn prune_queue(&mut self) {
        let before = self.room.attack_queue.len();
        let store = &self.store;
        self.room
            .attack_queue
            .retain(|&id| store.get(id).is_some_and(|p| p.is_eligible()));
        if self.room.attack_queue.len() != before {
            self.sink.room_changed(&self.room);
        }
    }

    /// The 1 Hz manage-status pass: inactivity decay, then the countdown
    /// tick, then an attack request for every countdown that expired (in
    /// the order they reached zero; losers of the race enqueue).
    ///
    /// The hosting actor runs this before any answer queued for the same
    /// tick, so a same-tick correct answer is always applied last.
    pub fn tick_status(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        self.speed
            .apply_inactivity_decay(&mut self.store, now_ms, &mut self.sink);
        let tick = self.countdown.tick(&mut self.store, &self.room, &mut self.sink);
        for target_id in tick.expired {
            self.coordinator
                .request_attack(&mut self.store, &mut self.room, target_id, &mut self.sink);
        }
        self.prune_queue();
        self.take_events()
    }

    /// The fast attack-progress tick (reference cadence 30 ms). No-op while
    /// no attack is running.
    pub fn tick_attack(&mut self) -> Vec<EventEnvelope> {
        self.coordinator.tick_progress(
            &mut self.store,
            &mut self.room,
            &self.countdown,
            &mut self.sink,
        );
        self.take_events()
    }

    /// Explicit game-restart collaborator action: the only path that may
    /// raise health or revive players. Cancels any in-flight attack, empties
    /// the queue, and restores every player to lifecycle defaults.
    pub fn reset(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        // Empty the queue first so the interrupt's drain finds nothing.
        let had_queue = !self.room.attack_queue.is_empty();
        self.room.attack_queue.clear();
        let interrupted = if let Some(target_id) = self.coordinator.active_target() {
            self.coordinator.interrupt_for(
                &mut self.store,
                &mut self.room,
                target_id,
                &self.countdown,
                &mut self.sink,
            )
        } else {
            false
        };
        if had_queue && !interrupted {
            self.sink.room_changed(&self.room);
        }

        for player_id in self.store.ids() {
            let patch = PlayerPatch {
                health: Some(self.config.max_health),
                speed: Some(SPEED_MIN),
                is_being_attacked: Some(false),
                is_alive: Some(true),
                last_answer_time: Some(now_ms),
                countdown: Some(None),
            };
            if let Err(e) = self
                .store
                .upsert(player_id, patch, WriteKind::Reset, &mut self.sink)
            {
                tracing::warn!(room = %self.room.room_id, player_id, error = %e, "reset write rejected");
            }
        }
        tracing::info!(room = %self.room.room_id, "room reset to lifecycle defaults");
        self.take_events()
    }

    /// A player joining mid-game gets a fresh record at lifecycle defaults.
    pub fn player_joined(&mut self, player_id: PlayerId, now_ms: u64) -> Vec<EventEnvelope> {
        self.store.insert_player(player_id, now_ms, &mut self.sink);
        self.take_events()
    }

    /// A player leaving permanently: their attack is interrupted, their
    /// queue slot dropped, and their record removed.
    pub fn player_left(&mut self, player_id: PlayerId) -> Vec<EventEnvelope> {
        let interrupted = self.coordinator.interrupt_for(
            &mut self.store,
            &mut self.room,
            player_id,
            &self.countdown,
            &mut self.sink,
        );
        if self.room.remove_queued(player_id) && !interrupted {
            self.sink.room_changed(&self.room);
        }
        self.store.remove_player(player_id);
        self.take_events()
    }

    pub fn player_state(&self, player_id: PlayerId) -> Option<&PlayerPursuitState> {
        self.store.get(player_id)
    }

    pub fn list_players(&self) -> Vec<&PlayerPursuitState> {
        self.store.list()
    }

    pub fn room_state(&self) -> &RoomPursuitState {
        &self.room
    }

    pub fn player_count(&self) -> usize {
        self.store.len()
    }

    pub fn snapshot(&self, now_ms: u64) -> RoomSnapshot {
        let slow_warnings = self
            .store
            .list()
            .into_iter()
            .filter(|p| {
                p.is_alive
                    && now_ms.saturating_sub(p.last_answer_time) >= self.config.warning_after_ms
            })
            .map(|p| p.player_id)
            .collect();
        RoomSnapshot {
            seq: self.seq,
            room: self.room.clone(),
            attack: self.coordinator.phase(),
            players: self.store.list().into_iter().cloned().collect(),
            slow_warnings,
        }
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn store_mut(&mut self) -> &mut PursuitStore {
        &mut self.store
    }
}
