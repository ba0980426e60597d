use axum::extract::{Query, State};
use axum::Json;
use presence_core::aggregate::OrgSummary;
use presence_core::directory::{Roster, SiteDirectory};

use crate::error::AppError;
use crate::routes::actors::DayQuery;
use crate::state::AppState;

/// GET /api/summary — org-wide attendance for the day, recomputed from the
/// log on every request.
pub async fn get_summary(
    State(app): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<OrgSummary>, AppError> {
    let window = query.window(&app)?;

    let roster = app.directory.actors();
    let mut states = Vec::with_capacity(roster.len());
    for actor in &roster {
        states.push(app.daily_state(&actor.id, &window).await?);
    }
    let sites = app.directory.list_active_sites().await?;
    Ok(Json(app.aggregator.summarize(&states, &sites, &roster)))
}
