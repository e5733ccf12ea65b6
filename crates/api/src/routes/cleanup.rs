//! Retention cleanup endpoints.

use axum::{extract::State, Json};
use chrono::Utc;
use tracing::info;

use crate::extractors::CleanupAuth;
use crate::response::{CleanupInfo, CleanupResponse};
use crate::state::AppState;

/// POST /cleanup - Run the retention sweep now.
pub async fn run_cleanup_handler(
    State(state): State<AppState>,
    _auth: CleanupAuth,
) -> Json<CleanupResponse> {
    info!("Data cleanup triggered via API");
    let stats = state.retention.perform_cleanup(Utc::now()).await;

    let message = if stats.is_complete() {
        "Data cleanup completed successfully".to_string()
    } else {
        format!("Data cleanup completed with {} failed step(s)", stats.errors.len())
    };

    Json(CleanupResponse {
        success: true,
        message,
        stats,
    })
}

/// GET /cleanup - Describe the retention policy.
pub async fn cleanup_info_handler(State(state): State<AppState>) -> Json<CleanupInfo> {
    Json(CleanupInfo {
        message: "Use POST method to trigger cleanup".to_string(),
        retention_policy: state.retention.policy().describe(),
        usage: "Send POST request with Authorization: Bearer <CLEANUP_API_KEY>".to_string(),
    })
}
