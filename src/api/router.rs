//! Router construction for the control-sync API.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{handlers, AppState};

/// Room for multipart boundaries and the `frameworkName` field on top of the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .uploads
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/frameworks", get(handlers::frameworks::list_frameworks))
        .route(
            "/frameworks/:framework_id/controls",
            get(handlers::frameworks::framework_controls),
        )
        .route(
            "/frameworks/custom",
            post(handlers::custom_upload::upload_custom_framework),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
