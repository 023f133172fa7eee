use serde::{Deserialize, Serialize};

use crate::countdown::CountdownSupervisor;
use crate::events::{EventSink, PursuitEvent};
use crate::player::{PlayerId, PlayerPatch};
use crate::room::{PursuitConfig, RoomMode, RoomPursuitState};
use crate::store::{PursuitStore, WriteKind};

/// Attack state machine phase for one room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AttackPhase {
    Idle,
    Attacking { target_id: PlayerId, progress: f32 },
}

/// What the coordinator decided to do with an attack request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackDecision {
    /// The attack began; damage has been applied.
    Started,
    /// Another attack is in progress; the target joined the queue.
    Queued,
    /// The target is not eligible. Nothing happened.
    Rejected,
}

/// Enforces the single-active-attacker invariant and drives the attack
/// progress state machine. The sole writer of being-attacked status and of
/// the room's busy flag, target, queue, and mode.
///
/// All trigger paths (countdown expiry, wrong answers, queue drain) go
/// through [`AttackCoordinator::request_attack`], which decides
/// attack-now / enqueue / reject; callers never duplicate the busy check.
#[derive(Debug)]
pub struct AttackCoordinator {
    phase: AttackPhase,
    progress_step: f32,
}

impl AttackCoordinator {
    pub fn new(config: &PursuitConfig) -> Self {
        Self {
            phase: AttackPhase::Idle,
            progress_step: config.attack_progress_step,
        }
    }

    pub fn phase(&self) -> AttackPhase {
        self.phase
    }

    pub fn active_target(&self) -> Option<PlayerId> {
        match self.phase {
            AttackPhase::Attacking { target_id, .. } => Some(target_id),
            AttackPhase::Idle => None,
        }
    }

    /// Unified attack entry point. Checks eligibility, then either begins
    /// the attack, appends the target to the FIFO queue (another attack in
    /// progress), or rejects.
    ///
    /// When the target is the sole living player, the busy flag cannot
    /// refer to anyone else; an idle coordinator attacks without consulting
    /// it.
    pub fn request_attack(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        target_id: PlayerId,
        sink: &mut EventSink,
    ) -> AttackDecision {
        let eligible = store.get(target_id).is_some_and(|p| p.is_eligible());
        if !eligible {
            tracing::debug!(room = %room.room_id, target_id, "attack request rejected: not eligible");
            return AttackDecision::Rejected;
        }

        match self.phase {
            AttackPhase::Attacking { .. } => {
                if room.enqueue(target_id) {
                    sink.room_changed(room);
                }
                AttackDecision::Queued
            },
            AttackPhase::Idle => {
                let sole_survivor = store.living_count() == 1;
                if room.attacker_busy && !sole_survivor {
                    if room.enqueue(target_id) {
                        sink.room_changed(room);
                    }
                    AttackDecision::Queued
                } else {
                    self.begin(store, room, target_id, sink);
                    AttackDecision::Started
                }
            },
        }
    }

    /// Advance the attack window by one fixed tick. Emits progress while
    /// attacking; on completion transitions to idle and drains the queue.
    /// No-op while idle.
    pub fn tick_progress(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        countdown: &CountdownSupervisor,
        sink: &mut EventSink,
    ) {
        let AttackPhase::Attacking { target_id, progress } = self.phase else {
            return;
        };
        let next = progress + self.progress_step;
        if next >= 1.0 {
            self.finish(store, room, countdown, sink, true);
        } else {
            self.phase = AttackPhase::Attacking {
                target_id,
                progress: next,
            };
            sink.push(PursuitEvent::AttackProgress {
                target_id,
                progress: next,
            });
        }
    }

    /// Cancel the attack if `player_id` is the active target (a mid-attack
    /// correct answer, or the target leaving the room). The attack is
    /// abandoned rather than completed; no countdown re-arm. Returns whether
    /// an attack was interrupted.
    pub fn interrupt_for(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        player_id: PlayerId,
        countdown: &CountdownSupervisor,
        sink: &mut EventSink,
    ) -> bool {
        if self.active_target() != Some(player_id) {
            return false;
        }
        self.finish(store, room, countdown, sink, false);
        true
    }

    fn begin(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        target_id: PlayerId,
        sink: &mut EventSink,
    ) {
        let Some(state) = store.get(target_id) else {
            return;
        };
        let new_health = state.health - 1;

        sink.push(PursuitEvent::AttackStarted { target_id });
        let patch = PlayerPatch {
            health: Some(new_health),
            is_being_attacked: Some(true),
            countdown: Some(None),
            is_alive: (new_health <= 0).then_some(false),
            ..PlayerPatch::default()
        };
        if let Err(e) = store.upsert(target_id, patch, WriteKind::Normal, sink) {
            tracing::warn!(room = %room.room_id, target_id, error = %e, "attack damage write rejected");
        }
        if new_health <= 0 {
            tracing::info!(room = %room.room_id, player_id = target_id, "player eliminated");
            sink.push(PursuitEvent::PlayerEliminated {
                player_id: target_id,
            });
        }

        room.remove_queued(target_id);
        room.attacker_busy = true;
        room.active_target_id = Some(target_id);
        room.mode = RoomMode::Panic;
        sink.room_changed(room);

        self.phase = AttackPhase::Attacking {
            target_id,
            progress: 0.0,
        };
    }

    fn finish(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        countdown: &CountdownSupervisor,
        sink: &mut EventSink,
        completed: bool,
    ) {
        let AttackPhase::Attacking { target_id, .. } = self.phase else {
            return;
        };
        self.phase = AttackPhase::Idle;

        // The flag may already be clear when a correct answer interrupted
        // the attack; only write when needed.
        if store.get(target_id).is_some_and(|p| p.is_being_attacked) {
            let patch = PlayerPatch {
                is_being_attacked: Some(false),
                ..PlayerPatch::default()
            };
            if let Err(e) = store.upsert(target_id, patch, WriteKind::Normal, sink) {
                tracing::warn!(room = %room.room_id, target_id, error = %e, "attack release write rejected");
            }
        }
        if completed {
            countdown.rearm(store, target_id, sink);
        }

        room.attacker_busy = false;
        room.active_target_id = None;
        room.mode = RoomMode::Normal;
        sink.push(PursuitEvent::AttackEnded { target_id });
        sink.room_changed(room);

        self.drain_queue(store, room, sink);
    }

    /// Pop queued targets until one is still eligible (attack it,
    /// countdown skipped) or the queue runs dry. Stale entries are dropped
    /// silently.
    fn drain_queue(
        &mut self,
        store: &mut PursuitStore,
        room: &mut RoomPursuitState,
        sink: &mut EventSink,
    ) {
        let mut dropped_any = false;
        while let Some(head) = room.attack_queue.pop_front() {
            if store.get(head).is_some_and(|p| p.is_eligible()) {
                self.begin(store, room, head, sink);
                return;
            }
            tracing::debug!(room = %room.room_id, player_id = head, "dropping stale attack queue entry");
            dropped_any = true;
        }
        if dropped_any {
            sink.room_changed(room);
        }
    }
}
