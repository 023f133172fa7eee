use crate::events::EventSink;
use crate::player::{PlayerId, PlayerPatch};
use crate::room::{PursuitConfig, RoomPursuitState};
use crate::store::{PursuitStore, WriteKind};

/// Outcome of one countdown pass: the players whose countdown just expired,
/// in the order they reached zero. The caller routes each through the attack
/// coordinator.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CountdownTick {
    pub expired: Vec<PlayerId>,
}

/// Drives the per-player eligibility countdown. Eligible players are armed
/// at the configured start value and tick down once per second; players that
/// lose eligibility have their countdown cleared immediately. Expiry is
/// reported to the caller, which asks the attack coordinator for a decision.
#[derive(Debug)]
pub struct CountdownSupervisor {
    countdown_secs: u8,
}

impl CountdownSupervisor {
    pub fn new(config: &PursuitConfig) -> Self {
        Self {
            countdown_secs: config.countdown_secs,
        }
    }

    /// One 1 Hz pass over all players in join order. Players waiting in the
    /// attack queue are skipped: their countdown is held cleared until the
    /// queue drains.
    pub fn tick(
        &self,
        store: &mut PursuitStore,
        room: &RoomPursuitState,
        sink: &mut EventSink,
    ) -> CountdownTick {
        let mut out = CountdownTick::default();
        for player_id in store.ids() {
            let Some(state) = store.get(player_id) else {
                continue;
            };
            if room.attack_queue.contains(&player_id) {
                continue;
            }
            let patch = if state.is_eligible() {
                match state.countdown {
                    None => PlayerPatch {
                        countdown: Some(Some(self.countdown_secs)),
                        ..PlayerPatch::default()
                    },
                    Some(n) => {
                        let next = n.saturating_sub(1);
                        if next == 0 {
                            out.expired.push(player_id);
                        }
                        // Expired countdowns are cleared pending the
                        // coordinator's decision (attack, enqueue, or re-arm
                        // on the next pass).
                        PlayerPatch {
                            countdown: Some((next > 0).then_some(next)),
                            ..PlayerPatch::default()
                        }
                    },
                }
            } else if state.countdown.is_some() {
                PlayerPatch {
                    countdown: Some(None),
                    ..PlayerPatch::default()
                }
            } else {
                continue;
            };

            if let Err(e) = store.upsert(player_id, patch, WriteKind::Normal, sink) {
                tracing::warn!(player_id, error = %e, "countdown write rejected");
            }
        }
        out
    }

    /// Re-arm a player's countdown to the start value (used after a
    /// completed attack on a still-eligible target).
    pub fn rearm(&self, store: &mut PursuitStore, player_id: PlayerId, sink: &mut EventSink) {
        let eligible = store.get(player_id).is_some_and(|p| p.is_eligible());
        if !eligible {
            return;
        }
        let patch = PlayerPatch {
            countdown: Some(Some(self.countdown_secs)),
            ..PlayerPatch::default()
        };
        if let Err(e) = store.upsert(player_id, patch, WriteKind::Normal, sink) {
            tracing::warn!(player_id, error = %e, "countdown re-arm rejected");
        }
    }
}
