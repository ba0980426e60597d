pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Sites
        .route("/api/sites", get(routes::sites::list_sites))
        .route("/api/geofence/check", post(routes::sites::check_geofence))
        // Clock attempts
        .route(
            "/api/actors/{actor}/clock",
            post(routes::clock::clock_stream),
        )
        .route(
            "/api/actors/{actor}/clock/sync",
            post(routes::clock::clock_sync),
        )
        // Derived views
        .route("/api/actors/{actor}/today", get(routes::actors::get_today))
        .route(
            "/api/actors/{actor}/events",
            get(routes::actors::list_events),
        )
        .route("/api/summary", get(routes::summary::get_summary))
        // Config
        .route("/api/config", get(routes::config::get_config))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the presence API server.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener, so the caller can read the
/// actual port first (useful with port 0).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("presence API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
