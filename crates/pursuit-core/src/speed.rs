use crate::events::EventSink;
use crate::player::{
    CORRECT_ANSWER_SPEED_GAIN, PlayerId, PlayerPatch, PlayerPursuitState, SPEED_MIN,
};
use crate::room::PursuitConfig;
use crate::store::{PursuitStore, StoreError, WriteKind};

/// Applies answer outcomes and inactivity decay to speed and answer
/// bookkeeping. Never touches attack state beyond clearing the
/// being-attacked flag on a correct answer; the attack coordinator owns the
/// room-side consequences.
#[derive(Debug)]
pub struct SpeedController {
    decay_idle_ms: u64,
    decay_step: i32,
}

impl SpeedController {
    pub fn new(config: &PursuitConfig) -> Self {
        Self {
            decay_idle_ms: config.decay_idle_ms,
            decay_step: config.decay_step,
        }
    }

    /// A correct answer: +5 speed (capped), clears the being-attacked flag
    /// and any countdown, stamps the answer time. Returns the new record;
    /// the caller decides whether an in-progress attack must be interrupted.
    pub fn apply_correct_answer(
        &self,
        store: &mut PursuitStore,
        player_id: PlayerId,
        now_ms: u64,
        sink: &mut EventSink,
    ) -> Result<PlayerPursuitState, StoreError> {
        let current = store.get(player_id).ok_or(StoreError::NotFound(player_id))?;
        let patch = PlayerPatch {
            speed: Some(current.speed + CORRECT_ANSWER_SPEED_GAIN),
            is_being_attacked: Some(false),
            countdown: Some(None),
            last_answer_time: Some(now_ms),
            ..PlayerPatch::default()
        };
        store
            .upsert(player_id, patch, WriteKind::Normal, sink)
            .cloned()
    }

    /// A wrong answer changes no stats by itself. It stamps the answer time;
    /// the caller hands the player to the attack coordinator, which decides
    /// whether damage is scheduled (attack now, enqueue, or nothing).
    pub fn apply_wrong_answer(
        &self,
        store: &mut PursuitStore,
        player_id: PlayerId,
        now_ms: u64,
        sink: &mut EventSink,
    ) -> Result<PlayerPursuitState, StoreError> {
        let patch = PlayerPatch {
            last_answer_time: Some(now_ms),
            ..PlayerPatch::default()
        };
        store
            .upsert(player_id, patch, WriteKind::Normal, sink)
            .cloned()
    }

    /// One 1 Hz decay pass over all living players. A player idle for the
    /// decay window loses one decay step of speed and has its idle clock
    /// reset, so a single idle period is penalized once. Players mid-attack
    /// are skipped.
    pub fn apply_inactivity_decay(
        &self,
        store: &mut PursuitStore,
        now_ms: u64,
        sink: &mut EventSink,
    ) {
        for player_id in store.ids() {
            let Some(state) = store.get(player_id) else {
                continue;
            };
            if !state.is_alive || state.is_being_attacked {
                continue;
            }
            if state.speed <= SPEED_MIN {
                continue;
            }
            if now_ms.saturating_sub(state.last_answer_time) < self.decay_idle_ms {
                continue;
            }
            let patch = PlayerPatch {
                speed: Some(state.speed - self.decay_step),
                last_answer_time: Some(now_ms),
                ..PlayerPatch::default()
            };
            if let Err(e) = store.upsert(player_id, patch, WriteKind::Normal, sink) {
                tracing::warn!(player_id, error = %e, "inactivity decay write rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{DEFAULT_MAX_HEALTH, SPEED_MAX};

    fn setup() -> (SpeedController, PursuitStore, EventSink) {
        let config = PursuitConfig::default();
        let mut store = PursuitStore::new("ROOM-0001".to_string(), DEFAULT_MAX_HEALTH);
        let mut sink = EventSink::default();
        store.insert_player(1, 0, &mut sink);
        sink.drain();
        (SpeedController::new(&config), store, sink)
    }

    fn set_speed(store: &mut PursuitStore, player_id: PlayerId, speed: i32) {
        let mut sink = EventSink::default();
        store
            .upsert(
                player_id,
                PlayerPatch {
                    speed: Some(speed),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .unwrap();
    }

    #[test]
    fn correct_answer_adds_speed_and_clears_countdown() {
        let (ctl, mut store, mut sink) = setup();
        store
            .upsert(
                1,
                PlayerPatch {
                    countdown: Some(Some(4)),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .unwrap();

        let state = ctl.apply_correct_answer(&mut store, 1, 5_000, &mut sink).unwrap();
        assert_eq!(state.speed, SPEED_MIN + CORRECT_ANSWER_SPEED_GAIN);
        assert_eq!(state.countdown, None);
        assert_eq!(state.last_answer_time, 5_000);
    }

    #[test]
    fn correct_answer_at_speed_cap_is_idempotent() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, SPEED_MAX);
        let state = ctl.apply_correct_answer(&mut store, 1, 5_000, &mut sink).unwrap();
        assert_eq!(state.speed, SPEED_MAX);
    }

    #[test]
    fn wrong_answer_changes_no_stats() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, 40);
        let state = ctl.apply_wrong_answer(&mut store, 1, 7_000, &mut sink).unwrap();
        assert_eq!(state.speed, 40);
        assert_eq!(state.health, DEFAULT_MAX_HEALTH);
        assert_eq!(state.last_answer_time, 7_000);
    }

    #[test]
    fn decay_fires_once_per_idle_period() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, 40);

        // 25s idle: one decay firing, clock reset.
        ctl.apply_inactivity_decay(&mut store, 25_000, &mut sink);
        let state = store.get(1).unwrap();
        assert_eq!(state.speed, 30);
        assert_eq!(state.last_answer_time, 25_000);

        // Still idle one tick later: window has not elapsed again.
        ctl.apply_inactivity_decay(&mut store, 26_000, &mut sink);
        assert_eq!(store.get(1).unwrap().speed, 30);
    }

    #[test]
    fn decay_respects_speed_floor() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, 25);
        ctl.apply_inactivity_decay(&mut store, 30_000, &mut sink);
        assert_eq!(store.get(1).unwrap().speed, SPEED_MIN);

        // At the floor, decay no longer fires at all.
        ctl.apply_inactivity_decay(&mut store, 60_000, &mut sink);
        assert_eq!(store.get(1).unwrap().speed, SPEED_MIN);
    }

    #[test]
    fn decay_skips_player_under_attack() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, 40);
        store
            .upsert(
                1,
                PlayerPatch {
                    is_being_attacked: Some(true),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .unwrap();

        ctl.apply_inactivity_decay(&mut store, 30_000, &mut sink);
        assert_eq!(store.get(1).unwrap().speed, 40);
    }

    #[test]
    fn decay_skips_eliminated_players() {
        let (ctl, mut store, mut sink) = setup();
        set_speed(&mut store, 1, 40);
        store
            .upsert(
                1,
                PlayerPatch {
                    health: Some(0),
                    is_alive: Some(false),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .unwrap();

        ctl.apply_inactivity_decay(&mut store, 30_000, &mut sink);
        assert_eq!(store.get(1).unwrap().speed, 40);
    }
}
