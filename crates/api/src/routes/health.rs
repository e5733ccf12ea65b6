//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use telemetry::{health, metrics, MetricsSnapshot};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check. Pings the store.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_connected = state.store.ping().await;
    if store_connected {
        health().store.set_healthy();
    } else {
        health().store.set_unhealthy("store did not answer ping");
    }

    Json(HealthResponse {
        report: health().report(),
        store_connected,
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// GET /health/ready - Readiness check (can accept traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness check (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/metrics - Tally snapshot.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
