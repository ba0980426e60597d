use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt as _;
use presence_core::coordinator::{
    ClockPhase, ClockRequest, ClockSignals, ClockStream, RejectCategory, RetainedPosition,
    SuppliedImage,
};
use presence_core::types::{ImageRef, Position};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClockBody {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Captured selfie as a data URI or storage reference.
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Validate the body and start the attempt. The HTTP caller has already
/// acquired position and photo, so both signals are replayed as-is.
fn start(app: &AppState, actor_id: &str, body: ClockBody) -> Result<ClockStream, AppError> {
    let actor = app.actor(actor_id)?;
    let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) else {
        return Err(AppError::bad_request("latitude and longitude are required"));
    };

    let request = ClockRequest {
        reference: actor.reference().cloned(),
        actor_id: actor.id,
        site_id: body.site_id,
        note: body.note.filter(|n| !n.trim().is_empty()),
    };
    let signals = ClockSignals {
        position: Arc::new(RetainedPosition(Position {
            latitude,
            longitude,
            accuracy: body.accuracy,
        })),
        camera: Arc::new(SuppliedImage(
            body.photo.filter(|p| !p.is_empty()).map(ImageRef::new),
        )),
        verify_timeout: None,
    };
    Ok(app.coordinator.request_clock(request, signals))
}

/// POST /api/actors/{actor}/clock — SSE stream of clock phases, one event per
/// transition, named after the phase. Disconnecting cancels the attempt.
pub async fn clock_stream(
    State(app): State<AppState>,
    Path(actor_id): Path<String>,
    Json(body): Json<ClockBody>,
) -> Result<impl IntoResponse, AppError> {
    let stream = start(&app, &actor_id, body)?;
    let events = stream.map(|phase| Event::default().event(phase.name()).json_data(&phase));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// HTTP status for a terminal phase.
pub fn phase_status(phase: &ClockPhase) -> StatusCode {
    match phase {
        ClockPhase::Committed { .. } => StatusCode::CREATED,
        ClockPhase::Rejected { reason } => match reason.category() {
            RejectCategory::Input => StatusCode::BAD_REQUEST,
            RejectCategory::Gate => StatusCode::UNPROCESSABLE_ENTITY,
            RejectCategory::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
            RejectCategory::Busy => StatusCode::CONFLICT,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/actors/{actor}/clock/sync — run the attempt to completion and
/// return only the terminal phase.
pub async fn clock_sync(
    State(app): State<AppState>,
    Path(actor_id): Path<String>,
    Json(body): Json<ClockBody>,
) -> Result<(StatusCode, Json<ClockPhase>), AppError> {
    let stream = start(&app, &actor_id, body)?;
    let phase = stream
        .final_phase()
        .await
        .ok_or_else(|| AppError(anyhow::anyhow!("clock attempt ended without a result")))?;
    Ok((phase_status(&phase), Json(phase)))
}
