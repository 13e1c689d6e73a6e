use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all sluice endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/upload", post(handler::upload_default_handler))
        .route("/v1/upload/:bucket", post(handler::upload_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
