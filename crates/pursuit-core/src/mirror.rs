use std::collections::HashMap;

use crate::engine::RoomSnapshot;
use crate::events::{EventEnvelope, PursuitEvent};
use crate::player::{PlayerId, PlayerPursuitState, RoomId};
use crate::room::{RoomMode, RoomPursuitState};

/// A read-only local copy of one room's pursuit state, as maintained by an
/// observer (the moderator view or a participant's own view).
///
/// Updated two ways: push events applied as patches, and periodic
/// anti-entropy pulls that overwrite the mirror with authoritative state.
/// Push is a latency optimization only; a mirror fed exclusively by
/// [`ObserverMirror::reconcile`] still converges within one pull interval.
/// Duplicate events from at-least-once delivery are dropped by sequence
/// number; a sequence gap flags the mirror for an early pull.
#[derive(Debug, Clone)]
pub struct ObserverMirror {
    room_id: RoomId,
    players: HashMap<PlayerId, PlayerPursuitState>,
    room: RoomPursuitState,
    active_progress: Option<f32>,
    last_seq: u64,
    gap_detected: bool,
}

impl ObserverMirror {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room: RoomPursuitState::new(room_id.clone()),
            room_id,
            players: HashMap::new(),
            active_progress: None,
            last_seq: 0,
            gap_detected: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerPursuitState> {
        self.players.get(&player_id)
    }

    pub fn players(&self) -> &HashMap<PlayerId, PlayerPursuitState> {
        &self.players
    }

    pub fn room(&self) -> &RoomPursuitState {
        &self.room
    }

    /// Progress of the attack currently displayed, if any.
    pub fn active_progress(&self) -> Option<f32> {
        self.active_progress
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// True when a sequence gap was seen since the last reconcile; the
    /// observer should pull early rather than wait out the interval.
    pub fn needs_repair(&self) -> bool {
        self.gap_detected
    }

    /// Apply one push event. Returns false for duplicates and stale events
    /// (dropped without effect).
    pub fn apply(&mut self, envelope: &EventEnvelope) -> bool {
        if envelope.room_id != self.room_id {
            return false;
        }
        if envelope.seq <= self.last_seq {
            tracing::debug!(
                room = %self.room_id,
                seq = envelope.seq,
                last = self.last_seq,
                "dropping duplicate or stale event"
            );
            return false;
        }
        if envelope.seq > self.last_seq + 1 && self.last_seq > 0 {
            self.gap_detected = true;
        }
        self.last_seq = envelope.seq;

        match &envelope.event {
            PursuitEvent::PlayerChanged { player } => {
                self.players.insert(player.player_id, player.clone());
            },
            PursuitEvent::AttackStarted { target_id } => {
                self.room.attacker_busy = true;
                self.room.active_target_id = Some(*target_id);
                self.room.mode = RoomMode::Panic;
                self.active_progress = Some(0.0);
                if let Some(p) = self.players.get_mut(target_id) {
                    p.is_being_attacked = true;
                }
            },
            PursuitEvent::AttackProgress { target_id, progress } => {
                if self.room.active_target_id == Some(*target_id) {
                    self.active_progress = Some(*progress);
                }
            },
            PursuitEvent::AttackEnded { target_id } => {
                self.room.attacker_busy = false;
                self.room.active_target_id = None;
                self.room.mode = RoomMode::Normal;
                self.active_progress = None;
                if let Some(p) = self.players.get_mut(target_id) {
                    p.is_being_attacked = false;
                }
            },
            PursuitEvent::PlayerEliminated { player_id } => {
                if let Some(p) = self.players.get_mut(player_id) {
                    p.is_alive = false;
                    p.countdown = None;
                }
                self.room.remove_queued(*player_id);
            },
            PursuitEvent::RoomChanged { room } => {
                self.room = room.clone();
            },
        }
        true
    }

    /// Anti-entropy overwrite of the player records (the 2 s pull).
    pub fn reconcile_players(&mut self, seq: u64, players: Vec<PlayerPursuitState>) {
        self.players = players.into_iter().map(|p| (p.player_id, p)).collect();
        self.advance_to(seq);
    }

    /// Anti-entropy overwrite of the room-wide state (the 1 s pull).
    pub fn reconcile_room(&mut self, seq: u64, room: RoomPursuitState, progress: Option<f32>) {
        self.room = room;
        self.active_progress = progress;
        self.advance_to(seq);
    }

    /// Full overwrite from an authoritative snapshot (reconnect, or both
    /// pulls landing together).
    pub fn reconcile(&mut self, snapshot: &RoomSnapshot) {
        self.reconcile_players(snapshot.seq, snapshot.players.clone());
        self.room = snapshot.room.clone();
        self.active_progress = match snapshot.attack {
            crate::attack::AttackPhase::Attacking { progress, .. } => Some(progress),
            crate::attack::AttackPhase::Idle => None,
        };
    }

    fn advance_to(&mut self, seq: u64) {
        // The pull is authoritative: the cursor may move backwards when a
        // reordered push ran ahead of the snapshot. Re-applied duplicates
        // are idempotent and the next pull corrects any residue.
        self.last_seq = seq;
        self.gap_detected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PursuitEngine;
    use crate::player::PlayerPatch;
    use crate::room::PursuitConfig;
    use crate::store::WriteKind;

    fn engine_with_two() -> PursuitEngine {
        PursuitEngine::new(
            "ROOM-0001".to_string(),
            PursuitConfig::default(),
            &[1, 2],
            0,
        )
    }

    #[test]
    fn push_events_keep_mirror_in_step() {
        let mut engine = engine_with_two();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());
        for e in engine.take_events() {
            mirror.apply(&e);
        }

        for e in engine.report_answer(1, false, 1_000).unwrap() {
            mirror.apply(&e);
        }

        assert!(mirror.room().attacker_busy);
        assert_eq!(mirror.room().active_target_id, Some(1));
        assert_eq!(mirror.player(1).unwrap().health, 2);
        assert!(mirror.player(1).unwrap().is_being_attacked);
        let expected: HashMap<PlayerId, PlayerPursuitState> = engine
            .snapshot(1_000)
            .players
            .into_iter()
            .map(|p| (p.player_id, p))
            .collect();
        assert_eq!(mirror.players(), &expected);
    }

    #[test]
    fn duplicate_events_are_dropped() {
        let mut engine = engine_with_two();
        engine.take_events();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());

        let events = engine.report_answer(1, false, 1_000).unwrap();
        for e in &events {
            assert!(mirror.apply(e));
        }
        // At-least-once delivery replays the batch; nothing changes.
        for e in &events {
            assert!(!mirror.apply(e));
        }
        assert_eq!(mirror.player(1).unwrap().health, 2);
    }

    #[test]
    fn gap_flags_mirror_for_repair() {
        let mut engine = engine_with_two();
        engine.take_events();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());

        let first = engine.report_answer(1, false, 1_000).unwrap();
        let second = engine.tick_attack();
        mirror.apply(&first[0]);
        // The rest of the first batch is lost; the attack tick arrives.
        mirror.apply(&second[0]);
        assert!(mirror.needs_repair());

        mirror.reconcile(&engine.snapshot(1_000));
        assert!(!mirror.needs_repair());
    }

    #[test]
    fn wrong_room_events_are_ignored() {
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());
        let envelope = EventEnvelope {
            room_id: "ROOM-0002".to_string(),
            seq: 1,
            event: PursuitEvent::AttackStarted { target_id: 1 },
        };
        assert!(!mirror.apply(&envelope));
        assert!(!mirror.room().attacker_busy);
    }

    #[test]
    fn pull_alone_converges() {
        // Push disabled entirely: the mirror is fed only by reconcile.
        let mut engine = engine_with_two();
        engine.take_events();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());

        engine.report_answer(1, false, 1_000).unwrap();
        engine.tick_attack();
        mirror.reconcile(&engine.snapshot(1_000));

        let snapshot = engine.snapshot(1_000);
        assert_eq!(mirror.room(), &snapshot.room);
        assert_eq!(mirror.last_seq(), snapshot.seq);
        assert_eq!(mirror.player(1).unwrap(), snapshot.players.iter().find(|p| p.player_id == 1).unwrap());
    }

    #[test]
    fn stale_push_after_pull_is_dropped() {
        let mut engine = engine_with_two();
        engine.take_events();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());

        let events = engine.report_answer(1, false, 1_000).unwrap();
        mirror.reconcile(&engine.snapshot(1_000));
        let health_after_pull = mirror.player(1).unwrap().health;

        // A delayed push from before the pull must not regress the mirror.
        for e in &events {
            assert!(!mirror.apply(e));
        }
        assert_eq!(mirror.player(1).unwrap().health, health_after_pull);
    }

    #[test]
    fn elimination_patch_applies_without_player_changed() {
        let mut engine = engine_with_two();
        engine.take_events();
        let mut mirror = ObserverMirror::new("ROOM-0001".to_string());
        mirror.reconcile(&engine.snapshot(0));

        // Deliver only the eliminated event out of a larger batch.
        let mut sink = crate::events::EventSink::default();
        engine
            .store_mut()
            .upsert(
                2,
                PlayerPatch {
                    health: Some(0),
                    is_alive: Some(false),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .unwrap();
        let envelope = EventEnvelope {
            room_id: "ROOM-0001".to_string(),
            seq: mirror.last_seq() + 1,
            event: PursuitEvent::PlayerEliminated { player_id: 2 },
        };
        mirror.apply(&envelope);
        assert!(!mirror.player(2).unwrap().is_alive);
    }
}
