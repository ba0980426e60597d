use axum::extract::{Path, Query, State};
use axum::Json;
use presence_core::derive::ActorDailyState;
use presence_core::types::ClockEvent;
use presence_core::window::parse_date;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    /// `YYYY-MM-DD` in the organization's offset; defaults to today.
    #[serde(default)]
    pub date: Option<String>,
}

impl DayQuery {
    pub(crate) fn window(&self, app: &AppState) -> Result<presence_core::window::DayWindow, AppError> {
        let date = self.date.as_deref().map(parse_date).transpose()?;
        Ok(app.window(date))
    }
}

/// GET /api/actors/{actor}/today — the actor's derived day view.
pub async fn get_today(
    State(app): State<AppState>,
    Path(actor_id): Path<String>,
    Query(query): Query<DayQuery>,
) -> Result<Json<ActorDailyState>, AppError> {
    app.actor(&actor_id)?;
    let window = query.window(&app)?;
    Ok(Json(app.daily_state(&actor_id, &window).await?))
}

/// GET /api/actors/{actor}/events — the actor's events for the day, in log order.
pub async fn list_events(
    State(app): State<AppState>,
    Path(actor_id): Path<String>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<ClockEvent>>, AppError> {
    app.actor(&actor_id)?;
    let window = query.window(&app)?;
    Ok(Json(app.day_events(&actor_id, &window).await?))
}
