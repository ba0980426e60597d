use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use presence_core::store::StoreError;
use presence_core::PresenceError;

/// Sentinel carrying an explicit 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequest(String);

impl std::fmt::Display for BadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequest {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequest(msg.into()).into())
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequest>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<PresenceError>() {
            match e {
                PresenceError::SiteNotFound(_) | PresenceError::ActorNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PresenceError::InvalidCoordinates(_)
                | PresenceError::InvalidTimeOfDay(_)
                | PresenceError::InvalidDate(_)
                | PresenceError::InvalidOffset(_) => StatusCode::BAD_REQUEST,
                PresenceError::Store(e) => store_status(e),
                PresenceError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
                PresenceError::NotInitialized
                | PresenceError::Io(_)
                | PresenceError::Yaml(_)
                | PresenceError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(e) = self.0.downcast_ref::<StoreError>() {
            store_status(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
