use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events — SSE stream that emits `update` after every committed
/// clock event. The payload names the actor so clients can refresh just
/// that actor's day view.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.coordinator.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        msg.ok().map(|event| {
            let data = serde_json::json!({
                "actor_id": event.actor_id,
                "seq": event.seq,
                "type": event.kind,
            });
            Ok::<Event, Infallible>(Event::default().event("update").data(data.to_string()))
        })
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
