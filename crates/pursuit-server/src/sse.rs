use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use pursuit_core::events::EventEnvelope;

use crate::state::{AppState, ConnectionGuard};

/// GET /api/v1/rooms/{room_id}/events/stream — per-room SSE push stream.
///
/// Delivery is best-effort: a slow subscriber lags and misses events, which
/// its anti-entropy pulls repair. Event ids carry the room sequence number
/// so clients can discard duplicates.
pub async fn room_event_stream(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let rx = {
        let rooms = state.rooms.read().await;
        rooms.subscribe(&room_id)
    }
    .ok_or(StatusCode::NOT_FOUND)?;

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));

    let stream = BroadcastStream::new(rx).filter_map(move |result: Result<EventEnvelope, _>| {
        let _guard = &guard;
        match result {
            Ok(envelope) => {
                let json = serde_json::to_string(&envelope).unwrap_or_default();
                Some(Ok(SseEvent::default()
                    .event(envelope.event.topic())
                    .data(json)
                    .id(format!("{}-{}", envelope.room_id, envelope.seq))))
            },
            Err(e) => {
                tracing::warn!(room = %room_id, "SSE broadcast receive error: {e}");
                None
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
