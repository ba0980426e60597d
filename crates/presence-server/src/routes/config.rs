use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/config — the effective organization and policy settings.
///
/// Read-only. Sites and roster have their own routes; the verification
/// endpoint is reported only as configured or not.
pub async fn get_config(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "organization": app.config.organization,
        "policy": app.config.policy,
        "verification_configured": app.config.verification.is_some(),
    }))
}
