use serde::Deserialize;

use pursuit_core::room::PursuitConfig;

/// Top-level server configuration, loaded from `pursuit.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub pursuit: PursuitTimingConfig,
    pub durability: DurabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            pursuit: PursuitTimingConfig::default(),
            durability: DurabilityConfig::default(),
        }
    }
}

/// Infrastructure limits (subscriber caps, channel sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_sse_subscribers: usize,
    pub broadcast_capacity: usize,
    /// Events retained per room for the status endpoint.
    pub event_buffer: usize,
    pub max_players_per_room: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sse_subscribers: 100,
            broadcast_capacity: 1024,
            event_buffer: 256,
            max_players_per_room: 16,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub idle_timeout_secs: u64,
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            idle_check_interval_secs: 60,
        }
    }
}

/// Pursuit cadence knobs. Production values match the reference timings;
/// tests compress them so scenarios run in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PursuitTimingConfig {
    /// Manage-status cadence (decay + countdown). Reference: 1 Hz.
    pub status_tick_ms: u64,
    /// Attack progress cadence. Reference: 30 ms.
    pub attack_tick_ms: u64,
    pub countdown_secs: u8,
    pub decay_idle_secs: u64,
    pub decay_step: i32,
    pub warning_after_secs: u64,
    pub attack_progress_step: f32,
}

impl Default for PursuitTimingConfig {
    fn default() -> Self {
        Self {
            status_tick_ms: 1_000,
            attack_tick_ms: 30,
            countdown_secs: 10,
            decay_idle_secs: 20,
            decay_step: 10,
            warning_after_secs: 10,
            attack_progress_step: 0.0333,
        }
    }
}

impl PursuitTimingConfig {
    /// Build a room's engine config from these timings plus the lobby's
    /// per-room values.
    pub fn to_pursuit_config(&self, max_health: i32, question_count: u32) -> PursuitConfig {
        PursuitConfig {
            max_health,
            question_count,
            countdown_secs: self.countdown_secs,
            decay_idle_ms: self.decay_idle_secs * 1_000,
            decay_step: self.decay_step,
            warning_after_ms: self.warning_after_secs * 1_000,
            attack_progress_step: self.attack_progress_step,
        }
    }
}

/// Bounded-retry settings for the durability collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 100,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, exiting on values the server cannot run with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.limits.max_sse_subscribers == 0 {
            tracing::error!("limits.max_sse_subscribers must be > 0");
            std::process::exit(1);
        }
        if self.limits.broadcast_capacity == 0 {
            tracing::error!("limits.broadcast_capacity must be > 0");
            std::process::exit(1);
        }
        if self.limits.max_players_per_room == 0 {
            tracing::error!("limits.max_players_per_room must be > 0");
            std::process::exit(1);
        }
        if self.rooms.idle_timeout_secs == 0 {
            tracing::error!("rooms.idle_timeout_secs must be > 0");
            std::process::exit(1);
        }
        if self.rooms.idle_check_interval_secs == 0 {
            tracing::error!("rooms.idle_check_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.pursuit.status_tick_ms == 0 || self.pursuit.attack_tick_ms == 0 {
            tracing::error!("pursuit tick intervals must be > 0");
            std::process::exit(1);
        }
        if self.pursuit.countdown_secs == 0 {
            tracing::error!("pursuit.countdown_secs must be > 0");
            std::process::exit(1);
        }
        if self.pursuit.attack_progress_step <= 0.0 {
            tracing::error!("pursuit.attack_progress_step must be > 0");
            std::process::exit(1);
        }
    }

    /// Load config from `pursuit.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("pursuit.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from pursuit.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse pursuit.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No pursuit.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("PURSUIT_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("PURSUIT_MAX_SSE_SUBSCRIBERS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_sse_subscribers = n;
        }
        if let Ok(val) = std::env::var("PURSUIT_BROADCAST_CAPACITY")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.broadcast_capacity = n;
        }
        if let Ok(val) = std::env::var("PURSUIT_IDLE_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rooms.idle_timeout_secs = n;
        }

        config
    }
}
