//! ClickHouse-backed runs of the main flows.
//!
//! Requires Docker, or `ANALYTICS_TEST_CLICKHOUSE_URL` pointing at a
//! running server. Run with `cargo test -- --ignored`.

use analytics_store::{AnalyticsStore, QueryFilter};
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup::ClickHouseContext};
use serde_json::Value;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ingest_and_upsert_against_clickhouse() {
    let ctx = ClickHouseContext::new().await;
    let server = ctx.server();
    let session_id = format!("ch-{}", uuid::Uuid::new_v4());

    let earlier = Utc::now() - Duration::hours(2);
    let later = Utc::now() - Duration::hours(1);

    server
        .post("/analytics")
        .add_header("X-Forwarded-For", "8.8.8.8")
        .json(&fixtures::event_at("page_view", &session_id, later))
        .await
        .assert_status_ok();
    server
        .post("/analytics")
        .add_header("X-Forwarded-For", "8.8.8.8")
        .json(&fixtures::event_at("plan_selected", &session_id, earlier))
        .await
        .assert_status_ok();

    let sessions = ctx.store.query_sessions(&QueryFilter::all()).await.unwrap();
    let matching: Vec<_> = sessions
        .iter()
        .filter(|s| s.session_id == session_id)
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].last_seen.timestamp(), later.timestamp());
    assert_eq!(matching[0].ip_country.as_deref(), Some("United States"));
    assert_eq!(ctx.geo.calls(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_signup_links_session_in_clickhouse() {
    let ctx = ClickHouseContext::new().await;
    let server = ctx.server();
    let session_id = format!("ch-{}", uuid::Uuid::new_v4());

    server
        .post("/analytics")
        .json(&fixtures::event("page_view", &session_id))
        .await
        .assert_status_ok();

    let body: Value = server
        .post("/signup")
        .json(&fixtures::signup("Casey", "Eugene", "annual", Some(&session_id)))
        .await
        .json();
    assert_eq!(body["success"], true);

    let sessions = ctx.store.query_sessions(&QueryFilter::all()).await.unwrap();
    let session = sessions
        .iter()
        .find(|s| s.session_id == session_id)
        .expect("session stored");
    assert!(session.converted);
    assert_eq!(session.conversion_plan.as_deref(), Some("annual"));
    assert_eq!(session.city.as_deref(), Some("Eugene"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cleanup_against_clickhouse_keeps_users() {
    let ctx = ClickHouseContext::new().await;
    let server = ctx.server();

    server
        .post("/signup")
        .json(&fixtures::signup("Dana", "Yakima", "free", None))
        .await
        .assert_status(axum::http::StatusCode::CREATED);
    let users_before = ctx.store.totals().await.unwrap().users;

    let body: Value = server
        .post("/cleanup")
        .authorization_bearer(integration_tests::setup::CLEANUP_TOKEN)
        .await
        .json();
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["errors"].as_array().unwrap().len(), 0);

    assert_eq!(ctx.store.totals().await.unwrap().users, users_before);
}
