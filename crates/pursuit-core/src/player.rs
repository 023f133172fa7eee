use serde::{Deserialize, Serialize};

/// Unique identifier for a player, assigned by the lobby collaborator.
pub type PlayerId = u64;

/// Identifier for a room. Supplied by the lobby, or generated via
/// [`crate::room::generate_room_code`] when it does not provide one.
pub type RoomId = String;

/// Lower and upper bound for the speed stat. A player spawns at the floor
/// and never leaves these bounds.
pub const SPEED_MIN: i32 = 20;
pub const SPEED_MAX: i32 = 100;

/// Speed at or below which a living, un-attacked player can be chased down.
pub const ELIGIBLE_SPEED: i32 = 30;

/// Speed gained per correct answer.
pub const CORRECT_ANSWER_SPEED_GAIN: i32 = 5;

/// Health a freshly joined player starts with unless the lobby overrides it.
pub const DEFAULT_MAX_HEALTH: i32 = 3;

/// Authoritative per-player pursuit record. One per player per room.
///
/// Mutated exclusively through [`crate::store::PursuitStore::upsert`]; the
/// speed controller and the attack coordinator are the only writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPursuitState {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub health: i32,
    pub speed: i32,
    pub is_being_attacked: bool,
    /// Becomes false permanently once health reaches 0. Only a reset write
    /// restores it.
    pub is_alive: bool,
    /// Milliseconds since the Unix epoch of the player's last submitted
    /// answer, correct or not.
    pub last_answer_time: u64,
    /// Seconds remaining until this player is attacked. Present only while
    /// the player is eligible.
    pub countdown: Option<u8>,
}

impl PlayerPursuitState {
    pub fn new(room_id: RoomId, player_id: PlayerId, max_health: i32, now_ms: u64) -> Self {
        Self {
            player_id,
            room_id,
            health: max_health,
            speed: SPEED_MIN,
            is_being_attacked: false,
            is_alive: true,
            last_answer_time: now_ms,
            countdown: None,
        }
    }

    /// Whether this player can be attacked: alive, has health left, slow
    /// enough, and not already the active target.
    pub fn is_eligible(&self) -> bool {
        self.is_alive && self.health > 0 && !self.is_being_attacked && self.speed <= ELIGIBLE_SPEED
    }
}

/// Partial write applied through the store. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PlayerPatch {
    pub health: Option<i32>,
    pub speed: Option<i32>,
    pub is_being_attacked: Option<bool>,
    pub is_alive: Option<bool>,
    pub last_answer_time: Option<u64>,
    /// `Some(None)` clears the countdown, `Some(Some(n))` sets it.
    pub countdown: Option<Option<u8>>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        self.health.is_none()
            && self.speed.is_none()
            && self.is_being_attacked.is_none()
            && self.is_alive.is_none()
            && self.last_answer_time.is_none()
            && self.countdown.is_none()
    }
}
