use serde::{Deserialize, Serialize};

use crate::player::{PlayerId, PlayerPursuitState, RoomId};
use crate::room::RoomPursuitState;

/// Typed change event emitted after every successful store or room
/// mutation. Topic strings are the wire names observers subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum PursuitEvent {
    #[serde(rename = "player.changed")]
    PlayerChanged { player: PlayerPursuitState },
    #[serde(rename = "attack.started")]
    AttackStarted { target_id: PlayerId },
    #[serde(rename = "attack.progress")]
    AttackProgress { target_id: PlayerId, progress: f32 },
    #[serde(rename = "attack.ended")]
    AttackEnded { target_id: PlayerId },
    #[serde(rename = "player.eliminated")]
    PlayerEliminated { player_id: PlayerId },
    #[serde(rename = "room.changed")]
    RoomChanged { room: RoomPursuitState },
}

impl PursuitEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::PlayerChanged { .. } => "player.changed",
            Self::AttackStarted { .. } => "attack.started",
            Self::AttackProgress { .. } => "attack.progress",
            Self::AttackEnded { .. } => "attack.ended",
            Self::PlayerEliminated { .. } => "player.eliminated",
            Self::RoomChanged { .. } => "room.changed",
        }
    }
}

/// A [`PursuitEvent`] stamped with per-room ordering metadata. `seq`
/// increases by one per event within a room; observers use it to drop
/// duplicates from at-least-once delivery and to spot gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub room_id: RoomId,
    pub seq: u64,
    #[serde(flatten)]
    pub event: PursuitEvent,
}

/// Buffer collecting the events produced during one engine operation. The
/// engine drains it and stamps envelopes once the operation commits.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<PursuitEvent>,
}

impl EventSink {
    pub fn push(&mut self, event: PursuitEvent) {
        self.events.push(event);
    }

    pub fn player_changed(&mut self, player: &PlayerPursuitState) {
        self.events.push(PursuitEvent::PlayerChanged {
            player: player.clone(),
        });
    }

    pub fn room_changed(&mut self, room: &RoomPursuitState) {
        self.events.push(PursuitEvent::RoomChanged { room: room.clone() });
    }

    pub fn drain(&mut self) -> Vec<PursuitEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
