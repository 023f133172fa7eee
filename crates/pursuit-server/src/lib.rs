pub mod api;
pub mod bus;
pub mod config;
pub mod durability;
pub mod error;
pub mod health;
pub mod observer;
pub mod room_manager;
pub mod session;
pub mod sse;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use config::ServerConfig;
use durability::{DurabilitySink, NoopSink, spawn_durability_writer};
use state::AppState;

/// Build the Axum router and application state with the default (no-op)
/// durability sink.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    build_app_with_sink(config, Arc::new(NoopSink))
}

/// Build the Axum router and application state, wiring state mutations to
/// the given durability collaborator.
pub fn build_app_with_sink(
    config: ServerConfig,
    sink: Arc<dyn DurabilitySink>,
) -> (Router<()>, AppState) {
    let (durability_tx, durability_rx) = mpsc::unbounded_channel();
    let state = AppState::new(config, durability_tx);
    spawn_durability_writer(durability_rx, sink, state.config.durability.clone());

    // The SSE route lives outside the timeout layer; streams are long-lived.
    let api_routes = Router::new()
        .route("/rooms", post(api::create_room))
        .route("/rooms/{room_id}", delete(api::delete_room))
        .route("/rooms/{room_id}/answers", post(api::post_answer))
        .route("/rooms/{room_id}/reset", post(api::reset_room))
        .route(
            "/rooms/{room_id}/players",
            get(api::list_player_states).post(api::player_join),
        )
        .route(
            "/rooms/{room_id}/players/{player_id}",
            get(api::get_player_state).delete(api::player_leave),
        )
        .route("/rooms/{room_id}/state", get(api::get_room_state))
        .layer(TimeoutLayer::new(Duration::from_secs(10)));

    let stream_routes = Router::new().route(
        "/rooms/{room_id}/events/stream",
        get(sse::room_event_stream),
    );

    let app = Router::new()
        .route("/healthz", get(health::health_check))
        .route("/readyz", get(health::readiness_check))
        .nest("/api/v1", api_routes.merge(stream_routes))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Background task that periodically removes idle rooms, stopping their
/// session actors so no timers outlive a dead room.
pub fn spawn_room_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let check_interval = Duration::from_secs(state.config.rooms.idle_check_interval_secs);
        let max_idle = Duration::from_secs(state.config.rooms.idle_timeout_secs);
        let mut interval = tokio::time::interval(check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let removed = {
                let mut rooms = state.rooms.write().await;
                rooms.cleanup_idle_rooms(max_idle)
            };
            if removed > 0 {
                tracing::info!(removed, "idle room sweep");
            }
        }
    })
}
