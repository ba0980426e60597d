use axum::extract::State;
use axum::Json;
use presence_core::directory::SiteDirectory;
use presence_core::geofence;
use presence_core::types::{Position, Site};
use presence_core::PresenceError;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/sites — active sites.
pub async fn list_sites(State(app): State<AppState>) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(app.directory.list_active_sites().await?))
}

#[derive(Debug, Deserialize)]
pub struct GeofenceCheckBody {
    pub site_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct GeofenceCheck {
    pub site_id: String,
    pub distance_meters: u32,
    pub radius_meters: u32,
    pub within_radius: bool,
    pub distance_label: String,
}

/// POST /api/geofence/check — how far a position is from a site, without
/// starting a clock attempt.
pub async fn check_geofence(
    State(app): State<AppState>,
    Json(body): Json<GeofenceCheckBody>,
) -> Result<Json<GeofenceCheck>, AppError> {
    let sites = app.directory.list_active_sites().await?;
    let site = sites
        .into_iter()
        .find(|s| s.id == body.site_id)
        .ok_or_else(|| PresenceError::SiteNotFound(body.site_id.clone()))?;

    let outcome = geofence::evaluate(&Position::new(body.latitude, body.longitude), &site)?;
    Ok(Json(GeofenceCheck {
        site_id: site.id,
        distance_meters: outcome.distance_meters,
        radius_meters: outcome.radius_meters,
        within_radius: outcome.within_radius,
        distance_label: geofence::format_distance(outcome.distance_meters),
    }))
}
