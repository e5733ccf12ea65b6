//! API routes.

pub mod analytics;
pub mod cleanup;
pub mod export;
pub mod health;
pub mod signup;

use analytics_core::limits::MAX_PAYLOAD_BYTES;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/analytics",
            post(analytics::track_handler)
                .get(analytics::snapshot_handler)
                .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES)),
        )
        .route("/analytics/daily", get(analytics::daily_handler))
        .route("/analytics/day/:date", get(analytics::day_handler))
        .route("/analytics/cities", get(analytics::cities_handler))
        .route("/signup", post(signup::signup_handler))
        .route("/export", get(export::export_handler))
        .route(
            "/cleanup",
            post(cleanup::run_cleanup_handler).get(cleanup::cleanup_info_handler),
        )
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/health/metrics", get(health::metrics_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
