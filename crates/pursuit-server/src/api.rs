use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use pursuit_core::attack::AttackPhase;
use pursuit_core::engine::{EngineError, RoomSnapshot};
use pursuit_core::player::{PlayerId, PlayerPursuitState};
use pursuit_core::room::RoomPursuitState;

use crate::error::AppError;
use crate::room_manager::CreateRoomParams;
use crate::state::AppState;

/// Request body for creating a room, supplied by the lobby collaborator.
#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub max_health: Option<i32>,
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Player ids in join order.
    pub players: Vec<PlayerId>,
}

/// Request body for an answer outcome from the quiz collaborator.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerBody {
    pub player_id: PlayerId,
    pub is_correct: bool,
    #[serde(default)]
    pub question_index: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub accepted: bool,
}

/// Request body for a mid-game join.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomBody {
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveRoomResponse {
    pub removed: bool,
    pub room_destroyed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPlayersResponse {
    pub seq: u64,
    pub players: Vec<PlayerPursuitState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayerStateResponse {
    pub seq: u64,
    pub player: PlayerPursuitState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomStateResponse {
    pub seq: u64,
    pub room: RoomPursuitState,
    pub attack: AttackPhase,
    pub slow_warnings: Vec<PlayerId>,
}

/// Fetch an authoritative snapshot through the room's actor, preserving the
/// room's serialization point. The manager lock is released before awaiting
/// the reply.
pub(crate) async fn fetch_snapshot(state: &AppState, room_id: &str) -> Result<RoomSnapshot, AppError> {
    let rx = {
        let rooms = state.rooms.read().await;
        rooms.request_snapshot(room_id)
    }
    .ok_or_else(|| AppError::NotFound(format!("Room {room_id} not found")))?;
    rx.await
        .map_err(|_| AppError::NotFound(format!("Room {room_id} is shutting down")))
}

/// POST /api/v1/rooms — lobby hands the engine a room.
pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<RoomSnapshot>), AppError> {
    let params = CreateRoomParams {
        room_id: body.room_id,
        max_health: body.max_health,
        question_count: body.question_count,
        players: body.players,
    };
    let room_id = {
        let mut rooms = state.rooms.write().await;
        rooms.create_room(params).map_err(AppError::BadRequest)?
    };
    let snapshot = fetch_snapshot(&state, &room_id).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// DELETE /api/v1/rooms/{room_id} — room teardown.
pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut rooms = state.rooms.write().await;
    if rooms.stop_room(&room_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Room {room_id} not found")))
    }
}

/// POST /api/v1/rooms/{room_id}/answers — `reportAnswer` from the quiz
/// collaborator.
pub async fn post_answer(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> Result<(StatusCode, Json<AnswerResponse>), AppError> {
    let rx = {
        let mut rooms = state.rooms.write().await;
        rooms.submit_answer(&room_id, body.player_id, body.is_correct, body.question_index)
    }
    .ok_or_else(|| AppError::NotFound(format!("Room {room_id} not found")))?;

    match rx.await {
        Ok(Ok(())) => Ok((StatusCode::ACCEPTED, Json(AnswerResponse { accepted: true }))),
        Ok(Err(EngineError::PlayerNotFound(id))) => Err(AppError::NotFound(format!(
            "Player {id} not found in room {room_id}"
        ))),
        Ok(Err(e)) => Err(AppError::Internal(e.to_string())),
        Err(_) => Err(AppError::NotFound(format!("Room {room_id} is shutting down"))),
    }
}

/// POST /api/v1/rooms/{room_id}/reset — explicit game restart; the only
/// write path allowed to raise health.
pub async fn reset_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let ok = {
        let mut rooms = state.rooms.write().await;
        rooms.reset_room(&room_id)
    };
    if !ok {
        return Err(AppError::NotFound(format!("Room {room_id} not found")));
    }
    // The actor processes Reset before this Query; the snapshot reflects it.
    let snapshot = fetch_snapshot(&state, &room_id).await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/rooms/{room_id}/players — mid-game join.
pub async fn player_join(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<JoinRoomBody>,
) -> Result<StatusCode, AppError> {
    let mut rooms = state.rooms.write().await;
    if !rooms.room_exists(&room_id) {
        return Err(AppError::NotFound(format!("Room {room_id} not found")));
    }
    rooms
        .player_joined(&room_id, body.player_id)
        .map_err(AppError::BadRequest)?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/rooms/{room_id}/players/{player_id} — permanent leave.
pub async fn player_leave(
    State(state): State<AppState>,
    Path((room_id, player_id)): Path<(String, PlayerId)>,
) -> Result<Json<LeaveRoomResponse>, AppError> {
    let mut rooms = state.rooms.write().await;
    let destroyed = rooms
        .player_left(&room_id, player_id)
        .ok_or_else(|| AppError::NotFound(format!("Room {room_id} not found")))?;
    Ok(Json(LeaveRoomResponse {
        removed: true,
        room_destroyed: destroyed,
    }))
}

/// GET /api/v1/rooms/{room_id}/players — `listPlayerStates`.
pub async fn list_player_states(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ListPlayersResponse>, AppError> {
    let snapshot = fetch_snapshot(&state, &room_id).await?;
    Ok(Json(ListPlayersResponse {
        seq: snapshot.seq,
        players: snapshot.players,
    }))
}

/// GET /api/v1/rooms/{room_id}/players/{player_id} — `getPlayerState`.
pub async fn get_player_state(
    State(state): State<AppState>,
    Path((room_id, player_id)): Path<(String, PlayerId)>,
) -> Result<Json<PlayerStateResponse>, AppError> {
    let snapshot = fetch_snapshot(&state, &room_id).await?;
    let player = snapshot
        .players
        .into_iter()
        .find(|p| p.player_id == player_id)
        .ok_or_else(|| {
            AppError::NotFound(format!("Player {player_id} not found in room {room_id}"))
        })?;
    Ok(Json(PlayerStateResponse {
        seq: snapshot.seq,
        player,
    }))
}

/// GET /api/v1/rooms/{room_id}/state — `getRoomState`.
pub async fn get_room_state(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStateResponse>, AppError> {
    let snapshot = fetch_snapshot(&state, &room_id).await?;
    Ok(Json(RoomStateResponse {
        seq: snapshot.seq,
        room: snapshot.room,
        attack: snapshot.attack,
        slow_warnings: snapshot.slow_warnings,
    }))
}
