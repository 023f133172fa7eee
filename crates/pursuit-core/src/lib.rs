pub mod attack;
pub mod countdown;
pub mod engine;
pub mod events;
pub mod mirror;
pub mod player;
pub mod room;
pub mod speed;
pub mod store;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::engine::PursuitEngine;
    use crate::events::{EventEnvelope, EventSink};
    use crate::player::{PlayerId, PlayerPatch};
    use crate::room::PursuitConfig;
    use crate::store::WriteKind;

    /// A config with compressed windows so tests don't sit through real
    /// countdowns and decay periods.
    pub fn fast_config() -> PursuitConfig {
        PursuitConfig {
            countdown_secs: 2,
            decay_idle_ms: 2_000,
            warning_after_ms: 1_000,
            attack_progress_step: 0.5,
            ..PursuitConfig::default()
        }
    }

    /// Build an engine for `n` players with ids `1..=n`, creation events
    /// already drained.
    pub fn make_engine(n: usize, config: PursuitConfig) -> PursuitEngine {
        let players: Vec<PlayerId> = (1..=n as PlayerId).collect();
        let mut engine = PursuitEngine::new("TEST-0001".to_string(), config, &players, 0);
        engine.take_events();
        engine
    }

    /// Force a player's speed directly through the store, bypassing the
    /// controller (for arranging scenarios).
    pub fn force_speed(engine: &mut PursuitEngine, player_id: PlayerId, speed: i32) {
        let mut sink = EventSink::default();
        engine
            .store_mut()
            .upsert(
                player_id,
                PlayerPatch {
                    speed: Some(speed),
                    ..PlayerPatch::default()
                },
                WriteKind::Normal,
                &mut sink,
            )
            .expect("force_speed write must succeed");
    }

    /// Run status ticks at a 1 s cadence until an attack starts, returning
    /// the emitted events. Panics after `limit` ticks.
    pub fn tick_until_attack(engine: &mut PursuitEngine, limit: u32) -> Vec<EventEnvelope> {
        let mut all = Vec::new();
        for i in 0..limit {
            all.extend(engine.tick_status(u64::from(i) * 1_000));
            if engine.room_state().attacker_busy {
                return all;
            }
        }
        panic!("no attack started within {limit} ticks");
    }

    /// Drive attack-progress ticks until the room goes idle.
    pub fn run_attack_to_idle(engine: &mut PursuitEngine) -> Vec<EventEnvelope> {
        let mut all = Vec::new();
        for _ in 0..80 {
            all.extend(engine.tick_attack());
            if !engine.room_state().attacker_busy {
                return all;
            }
        }
        panic!("attack never completed");
    }
}
