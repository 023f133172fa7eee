use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::{DEFAULT_MAX_HEALTH, PlayerId, RoomId};

/// Presentation hint mirroring the attacker-busy flag. Carries no state of
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Normal,
    Panic,
}

/// Room-wide pursuit coordination state. One per room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPursuitState {
    pub room_id: RoomId,
    /// True while any player is mid-attack. The room's mutual-exclusion flag.
    pub attacker_busy: bool,
    pub active_target_id: Option<PlayerId>,
    /// FIFO of players whose countdown expired while another attack was in
    /// progress. No duplicates.
    pub attack_queue: VecDeque<PlayerId>,
    pub mode: RoomMode,
}

impl RoomPursuitState {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            attacker_busy: false,
            active_target_id: None,
            attack_queue: VecDeque::new(),
            mode: RoomMode::Normal,
        }
    }

    /// Append a player to the attack queue. Returns false if already queued.
    pub fn enqueue(&mut self, player_id: PlayerId) -> bool {
        if self.attack_queue.contains(&player_id) {
            return false;
        }
        self.attack_queue.push_back(player_id);
        true
    }

    /// Remove a player from the queue wherever it sits. Returns true if it
    /// was present.
    pub fn remove_queued(&mut self, player_id: PlayerId) -> bool {
        let before = self.attack_queue.len();
        self.attack_queue.retain(|&id| id != player_id);
        self.attack_queue.len() != before
    }
}

/// Tuning for a room's pursuit engine. Values come from the lobby (health,
/// question count) and server config (cadences); tests compress them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PursuitConfig {
    pub max_health: i32,
    pub question_count: u32,
    /// Seconds on a freshly armed countdown.
    pub countdown_secs: u8,
    /// Idle window after which speed decays.
    pub decay_idle_ms: u64,
    /// Speed lost per decay firing.
    pub decay_step: i32,
    /// Idle window after which views show a slow warning. Display only,
    /// never a second decay source.
    pub warning_after_ms: u64,
    /// Progress gained per attack tick; 0.0333 per 30 ms tick is a ~1 s
    /// attack window.
    pub attack_progress_step: f32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            max_health: DEFAULT_MAX_HEALTH,
            question_count: 10,
            countdown_secs: 10,
            decay_idle_ms: 20_000,
            decay_step: 10,
            warning_after_ms: 10_000,
            attack_progress_step: 0.0333,
        }
    }
}

/// Alphabet for generated codes; drops I and O to keep codes readable.
/// Lobby-assigned codes may use any uppercase letter.
const CODE_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a room code of the form `XXXX-0000`.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    let letters: String = (0..4)
        .map(|_| CODE_LETTERS[rng.random_range(0..CODE_LETTERS.len())] as char)
        .collect();
    format!("{letters}-{:04}", rng.random_range(0..10_000u32))
}

/// Check the `XXXX-0000` room code shape.
pub fn is_valid_room_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
}
