use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use pursuit_core::engine::{EngineError, PursuitEngine, RoomSnapshot};
use pursuit_core::events::EventEnvelope;
use pursuit_core::player::{PlayerId, RoomId};
use pursuit_core::room::{generate_room_code, is_valid_room_code};
use pursuit_core::time::now_ms;

use crate::bus::RoomEventBus;
use crate::config::ServerConfig;
use crate::durability::RowUpdate;
use crate::session::{RoomCommand, SessionTiming, spawn_room_session};

/// Parameters the lobby collaborator supplies when a game starts.
#[derive(Debug, Clone)]
pub struct CreateRoomParams {
    /// Lobby-assigned room id; a code is generated when absent.
    pub room_id: Option<RoomId>,
    pub max_health: Option<i32>,
    pub question_count: Option<u32>,
    /// Player ids in join order.
    pub players: Vec<PlayerId>,
}

/// Manages all active rooms: one session actor per room, plus its event bus.
pub struct RoomManager {
    config: Arc<ServerConfig>,
    durability_tx: mpsc::UnboundedSender<RowUpdate>,
    rooms: HashMap<RoomId, RoomEntry>,
}

struct RoomEntry {
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
    bus: Arc<Mutex<RoomEventBus>>,
    task: JoinHandle<()>,
    last_activity: Instant,
    player_count: usize,
}

impl RoomManager {
    pub fn new(config: Arc<ServerConfig>, durability_tx: mpsc::UnboundedSender<RowUpdate>) -> Self {
        Self {
            config,
            durability_tx,
            rooms: HashMap::new(),
        }
    }

    /// Create a room and spawn its session actor. Returns the room id.
    pub fn create_room(&mut self, params: CreateRoomParams) -> Result<RoomId, String> {
        if params.players.is_empty() {
            return Err("A room needs at least one player".to_string());
        }
        if params.players.len() > self.config.limits.max_players_per_room {
            return Err(format!(
                "Too many players: {} (max {})",
                params.players.len(),
                self.config.limits.max_players_per_room
            ));
        }
        {
            let mut seen = std::collections::HashSet::new();
            for &id in &params.players {
                if !seen.insert(id) {
                    return Err(format!("Duplicate player id: {id}"));
                }
            }
        }
        let max_health = params.max_health.unwrap_or(pursuit_core::player::DEFAULT_MAX_HEALTH);
        if max_health < 1 {
            return Err("max_health must be at least 1".to_string());
        }

        let room_id = match params.room_id {
            Some(id) => {
                if !is_valid_room_code(&id) {
                    return Err(format!("Invalid room id: {id}"));
                }
                if self.rooms.contains_key(&id) {
                    return Err(format!("Room {id} already exists"));
                }
                id
            },
            None => generate_unique_room_code(&self.rooms),
        };

        let pursuit_config = self
            .config
            .pursuit
            .to_pursuit_config(max_health, params.question_count.unwrap_or(10));
        let engine = PursuitEngine::new(room_id.clone(), pursuit_config, &params.players, now_ms());
        let bus = Arc::new(Mutex::new(RoomEventBus::with_capacity(
            self.config.limits.event_buffer,
            self.config.limits.broadcast_capacity,
        )));
        let timing = SessionTiming {
            status_tick_ms: self.config.pursuit.status_tick_ms,
            attack_tick_ms: self.config.pursuit.attack_tick_ms,
        };
        let (cmd_tx, task) = spawn_room_session(
            engine,
            Arc::clone(&bus),
            self.durability_tx.clone(),
            timing,
        );

        tracing::info!(room = %room_id, players = params.players.len(), "room created");
        self.rooms.insert(
            room_id.clone(),
            RoomEntry {
                cmd_tx,
                bus,
                task,
                last_activity: Instant::now(),
                player_count: params.players.len(),
            },
        );
        Ok(room_id)
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Subscribe to a room's push event stream.
    pub fn subscribe(&self, room_id: &str) -> Option<broadcast::Receiver<EventEnvelope>> {
        self.rooms
            .get(room_id)
            .map(|e| e.bus.lock().unwrap().subscribe())
    }

    /// Ask the room actor for an authoritative snapshot. The returned
    /// receiver resolves outside the manager lock.
    pub fn request_snapshot(&self, room_id: &str) -> Option<oneshot::Receiver<RoomSnapshot>> {
        let entry = self.rooms.get(room_id)?;
        let (reply, rx) = oneshot::channel();
        entry
            .cmd_tx
            .send(RoomCommand::Query { reply })
            .ok()
            .map(|()| rx)
    }

    /// Route an answer outcome from the quiz collaborator to the room actor.
    pub fn submit_answer(
        &mut self,
        room_id: &str,
        player_id: PlayerId,
        is_correct: bool,
        question_index: Option<u32>,
    ) -> Option<oneshot::Receiver<Result<(), EngineError>>> {
        let entry = self.rooms.get_mut(room_id)?;
        entry.last_activity = Instant::now();
        let (reply, rx) = oneshot::channel();
        entry
            .cmd_tx
            .send(RoomCommand::Answer {
                player_id,
                is_correct,
                question_index,
                reply,
            })
            .ok()
            .map(|()| rx)
    }

    /// Game-restart collaborator action.
    pub fn reset_room(&mut self, room_id: &str) -> bool {
        if let Some(entry) = self.rooms.get_mut(room_id) {
            entry.last_activity = Instant::now();
            entry.cmd_tx.send(RoomCommand::Reset).is_ok()
        } else {
            false
        }
    }

    /// A player joining mid-game.
    pub fn player_joined(&mut self, room_id: &str, player_id: PlayerId) -> Result<(), String> {
        let max_players = self.config.limits.max_players_per_room;
        let Some(entry) = self.rooms.get_mut(room_id) else {
            return Err("Room not found".to_string());
        };
        if entry.player_count >= max_players {
            return Err("Room is full".to_string());
        }
        entry.last_activity = Instant::now();
        entry.player_count += 1;
        entry
            .cmd_tx
            .send(RoomCommand::PlayerJoined { player_id })
            .map_err(|_| "Room session gone".to_string())
    }

    /// A player leaving permanently. Destroys the room when it empties;
    /// returns true if the room was destroyed.
    pub fn player_left(&mut self, room_id: &str, player_id: PlayerId) -> Option<bool> {
        let entry = self.rooms.get_mut(room_id)?;
        entry.last_activity = Instant::now();
        if let Err(e) = entry.cmd_tx.send(RoomCommand::PlayerLeft { player_id }) {
            tracing::debug!(room = room_id, player_id, error = %e, "room session gone");
        }
        entry.player_count = entry.player_count.saturating_sub(1);
        if entry.player_count == 0 {
            self.stop_room(room_id);
            return Some(true);
        }
        Some(false)
    }

    /// Tear a room down: the actor exits, its timers with it.
    pub fn stop_room(&mut self, room_id: &str) -> bool {
        if let Some(entry) = self.rooms.remove(room_id) {
            if entry.cmd_tx.send(RoomCommand::Stop).is_err() {
                // Session already gone; make sure the task is not lingering.
                entry.task.abort();
            }
            tracing::info!(room = room_id, "room destroyed");
            true
        } else {
            false
        }
    }

    /// Remove rooms idle for longer than `max_idle`, stopping their actors.
    /// Returns the number of rooms removed.
    pub fn cleanup_idle_rooms(&mut self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_activity) >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for room_id in &stale {
            tracing::info!(room = %room_id, "removing idle room");
            self.stop_room(room_id);
        }
        stale.len()
    }

    /// (active rooms, total players) for the health endpoint.
    pub fn stats(&self) -> (usize, usize) {
        let players = self.rooms.values().map(|e| e.player_count).sum();
        (self.rooms.len(), players)
    }

    #[cfg(test)]
    fn age_room(&mut self, room_id: &str, age: Duration) {
        if let Some(entry) = self.rooms.get_mut(room_id) {
            entry.last_activity = Instant::now() - age;
        }
    }
}

/// Generate a unique room code, retrying on collision with existing rooms.
fn generate_unique_room_code(existing: &HashMap<RoomId, RoomEntry>) -> RoomId {
    loop {
        let code = generate_room_code();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (RoomManager, mpsc::UnboundedReceiver<RowUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RoomManager::new(Arc::new(ServerConfig::default()), tx), rx)
    }

    fn params(players: Vec<PlayerId>) -> CreateRoomParams {
        CreateRoomParams {
            room_id: None,
            max_health: None,
            question_count: None,
            players,
        }
    }

    #[tokio::test]
    async fn create_room_generates_valid_code() {
        let (mut mgr, _rx) = manager();
        let room_id = mgr.create_room(params(vec![1, 2])).unwrap();
        assert!(is_valid_room_code(&room_id));
        assert!(mgr.room_exists(&room_id));
        assert_eq!(mgr.stats(), (1, 2));
    }

    #[tokio::test]
    async fn create_room_accepts_lobby_id() {
        let (mut mgr, _rx) = manager();
        let room_id = mgr
            .create_room(CreateRoomParams {
                room_id: Some("QUIZ-0007".to_string()),
                ..params(vec![1])
            })
            .unwrap();
        assert_eq!(room_id, "QUIZ-0007");

        // The same id cannot be claimed twice.
        let err = mgr
            .create_room(CreateRoomParams {
                room_id: Some("QUIZ-0007".to_string()),
                ..params(vec![2])
            })
            .unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[tokio::test]
    async fn create_room_rejects_bad_input() {
        let (mut mgr, _rx) = manager();
        assert!(mgr.create_room(params(vec![])).is_err());
        assert!(mgr.create_room(params(vec![1, 1])).is_err());
        assert!(
            mgr.create_room(CreateRoomParams {
                room_id: Some("not a code".to_string()),
                ..params(vec![1])
            })
            .is_err()
        );
        assert!(
            mgr.create_room(CreateRoomParams {
                max_health: Some(0),
                ..params(vec![1])
            })
            .is_err()
        );
        let too_many: Vec<PlayerId> = (1..=17).collect();
        assert!(mgr.create_room(params(too_many)).is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_actor() {
        let (mut mgr, _rx) = manager();
        let room_id = mgr.create_room(params(vec![1, 2, 3])).unwrap();
        let rx = mgr.request_snapshot(&room_id).unwrap();
        let snapshot = rx.await.unwrap();
        assert_eq!(snapshot.players.len(), 3);
        assert_eq!(snapshot.room.room_id, room_id);
        assert!(!snapshot.room.attacker_busy);
    }

    #[tokio::test]
    async fn unknown_room_has_no_snapshot() {
        let (mgr, _rx) = manager();
        assert!(mgr.request_snapshot("QUIZ-0000").is_none());
    }

    #[tokio::test]
    async fn last_player_leaving_destroys_room() {
        let (mut mgr, _rx) = manager();
        let room_id = mgr.create_room(params(vec![1, 2])).unwrap();

        assert_eq!(mgr.player_left(&room_id, 1), Some(false));
        assert!(mgr.room_exists(&room_id));

        assert_eq!(mgr.player_left(&room_id, 2), Some(true));
        assert!(!mgr.room_exists(&room_id));
    }

    #[tokio::test]
    async fn join_respects_capacity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = ServerConfig {
            limits: crate::config::LimitsConfig {
                max_players_per_room: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut mgr = RoomManager::new(Arc::new(config), tx);
        let room_id = mgr.create_room(params(vec![1, 2])).unwrap();
        let err = mgr.player_joined(&room_id, 3).unwrap_err();
        assert!(err.contains("full"));
    }

    #[tokio::test]
    async fn idle_rooms_are_swept() {
        let (mut mgr, _rx) = manager();
        let keep = mgr.create_room(params(vec![1])).unwrap();
        let stale = mgr.create_room(params(vec![2])).unwrap();
        mgr.age_room(&stale, Duration::from_secs(7200));

        let removed = mgr.cleanup_idle_rooms(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(mgr.room_exists(&keep));
        assert!(!mgr.room_exists(&stale));
    }

    #[tokio::test]
    async fn stop_room_removes_entry() {
        let (mut mgr, _rx) = manager();
        let room_id = mgr.create_room(params(vec![1])).unwrap();
        assert!(mgr.stop_room(&room_id));
        assert!(!mgr.stop_room(&room_id));
        assert!(mgr.request_snapshot(&room_id).is_none());
    }
}
