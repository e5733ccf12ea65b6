//! Health, readiness and metrics endpoints.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["store_connected"], true);
    assert!(body["status"] == "healthy" || body["status"] == "degraded");
    assert_eq!(body["components"].as_array().unwrap().len(), 2);

    // /health just marked the store healthy.
    server.get("/health/ready").await.assert_status_ok();
    server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_metrics_snapshot_counts_rejections() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/analytics")
        .json(&fixtures::event("page_view", "m1"))
        .await
        .assert_status_ok();
    server
        .post("/analytics")
        .text("nope")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let snapshot: Value = server.get("/health/metrics").await.json();
    assert!(snapshot["events_received"].as_u64().unwrap() >= 1);
    assert!(snapshot["events_rejected"].as_u64().unwrap() >= 1);
    assert!(snapshot["timestamp"].is_string());
}
