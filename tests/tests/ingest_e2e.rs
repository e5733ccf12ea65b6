//! End-to-end tests for `POST /analytics`.
//!
//! Drives the real router over the in-memory store with a counting
//! geolocation mock.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

/// Signup event from a public IP: session geolocated, snapshot and export updated.
#[tokio::test]
async fn test_signup_event_flows_to_session_snapshot_and_export() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let before: Value = server.get("/analytics").await.json();
    let visitors_before = before["unique_visitors"].as_u64().unwrap();

    let response = server
        .post("/analytics")
        .add_header("X-Forwarded-For", "8.8.8.8")
        .json(&fixtures::signup_completed("s1", "monthly"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);

    let session = ctx.store.session("s1").expect("session s1 stored");
    assert_eq!(session.ip_country.as_deref(), Some("United States"));
    assert_eq!(session.ip_city.as_deref(), Some("Mountain View"));
    assert_eq!(session.ip_address.as_deref(), Some("8.8.8.8"));
    assert!(session.converted);
    assert_eq!(session.conversion_plan.as_deref(), Some("monthly"));

    let after: Value = server.get("/analytics").await.json();
    assert!(after["unique_visitors"].as_u64().unwrap() >= visitors_before + 1);
    assert_eq!(after["status"], "live");

    let export: Value = server
        .get("/export")
        .add_query_param("table", "events")
        .await
        .json();
    let events = export["data"]["events"].as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e["event_type"] == "signup_completed" && e["session_id"] == "s1"));
}

/// Two events on one session keep one row with the later activity time.
#[tokio::test]
async fn test_repeat_session_keeps_single_row_with_latest_activity() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let earlier = Utc::now() - Duration::hours(2);
    let later = Utc::now() - Duration::hours(1);

    server
        .post("/analytics")
        .json(&fixtures::event_at("page_view", "s2", later))
        .await
        .assert_status_ok();
    server
        .post("/analytics")
        .json(&fixtures::event_at("section_view", "s2", earlier))
        .await
        .assert_status_ok();

    assert_eq!(ctx.store.session_count(), 1);
    let session = ctx.store.session("s2").unwrap();
    assert_eq!(session.last_seen.timestamp(), later.timestamp());
    assert_eq!(ctx.store.event_count(), 2);
}

/// The geolocation cache answers repeat IPs without another provider call.
#[tokio::test]
async fn test_repeat_ip_is_served_from_cache() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for session in ["a", "b", "c"] {
        server
            .post("/analytics")
            .add_header("X-Forwarded-For", "8.8.8.8, 10.0.0.1")
            .json(&fixtures::event("page_view", session))
            .await
            .assert_status_ok();
    }

    assert_eq!(ctx.geo.calls(), 1);
}

/// Private addresses never reach the provider.
#[tokio::test]
async fn test_local_ip_skips_lookup() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/analytics")
        .add_header("X-Real-IP", "192.168.1.20")
        .json(&fixtures::event("page_view", "local"))
        .await
        .assert_status_ok();

    assert_eq!(ctx.geo.calls(), 0);
    let session = ctx.store.session("local").unwrap();
    assert_eq!(session.ip_location_source.as_deref(), Some("localhost"));
}

/// Provider failure still stores the session with a fallback profile.
#[tokio::test]
async fn test_geolocation_failure_falls_back() {
    let ctx = TestContext::new();
    ctx.geo.set_should_fail(true);
    let server = ctx.server();

    server
        .post("/analytics")
        .add_header("X-Forwarded-For", "8.8.8.8")
        .add_header("X-Geo-Country", "US")
        .json(&fixtures::event("page_view", "s3"))
        .await
        .assert_status_ok();

    let session = ctx.store.session("s3").unwrap();
    assert_eq!(session.ip_location_source.as_deref(), Some("fallback"));
}

/// Storage failures stay invisible to the page.
#[tokio::test]
async fn test_store_failures_still_return_success() {
    let ctx = TestContext::new();
    let server = ctx.server();

    ctx.store.set_events_failing(true);
    let response = server
        .post("/analytics")
        .json(&fixtures::event("page_view", "s4"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);
    assert_eq!(ctx.store.session_count(), 1, "session write is independent");

    ctx.store.set_events_failing(false);
    ctx.store.set_sessions_failing(true);
    server
        .post("/analytics")
        .json(&fixtures::event("page_view", "s5"))
        .await
        .assert_status_ok();
    assert_eq!(ctx.store.event_count(), 1, "event write is independent");
}

/// Events without a session are stored without creating a session.
#[tokio::test]
async fn test_event_without_session() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let mut body = fixtures::event("video_load", "ignored");
    body.as_object_mut().unwrap().remove("sessionId");

    server.post("/analytics").json(&body).await.assert_status_ok();
    assert_eq!(ctx.store.event_count(), 1);
    assert_eq!(ctx.store.session_count(), 0);
}

#[tokio::test]
async fn test_malformed_and_oversized_bodies() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/analytics")
        .content_type("application/json")
        .text("{\"event\": ")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert!(body["details"].is_array());

    let mut missing_url = fixtures::event("page_view", "s6");
    missing_url.as_object_mut().unwrap().remove("url");
    let response = server.post("/analytics").json(&missing_url).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALID_001");

    let response = server
        .post("/analytics")
        .json(&fixtures::oversized_event())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALID_002");

    assert_eq!(ctx.store.event_count(), 0);
}
