//! `POST /cleanup` and `GET /cleanup`.

use analytics_core::{
    EventData, EventRecord, EventType, NewUser, SelectedPlan, Session, SessionUpsert,
};
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use integration_tests::setup::{TestContext, CLEANUP_TOKEN};
use serde_json::Value;

fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

fn event(session_id: &str, at: DateTime<Utc>) -> EventRecord {
    EventRecord {
        session_id: session_id.to_string(),
        visitor_id: None,
        event_type: EventType::PageView,
        event_data: EventData::new(),
        timestamp: at,
        server_timestamp: at,
        user_agent: "Mozilla/5.0".to_string(),
        url: "https://example.com/".to_string(),
        referrer: None,
        ip_address: Some("203.0.113.1".to_string()),
        deployment_id: "local".to_string(),
        git_commit: "unknown".to_string(),
    }
}

fn session(id: &str, at: DateTime<Utc>) -> Session {
    Session::from_upsert(SessionUpsert {
        session_id: id.to_string(),
        seen_at: at,
        ip_address: Some("203.0.113.1".to_string()),
        country: None,
        city: None,
        location: None,
        user_agent: None,
        referrer: None,
        conversion: None,
    })
}

fn seed(ctx: &TestContext) {
    // Events: one past deletion, one past anonymization, one fresh.
    ctx.store.put_event(event("old", days_ago(200)));
    ctx.store.put_event(event("mid", days_ago(100)));
    ctx.store.put_event(event("new", days_ago(10)));

    // Sessions: one past deletion, one past anonymization, one fresh.
    ctx.store.put_session(session("old", days_ago(400)));
    ctx.store.put_session(session("mid", days_ago(100)));
    ctx.store.put_session(session("new", days_ago(10)));

    ctx.store.put_user(
        NewUser {
            name: "Old Timer".into(),
            email: "old@example.com".into(),
            city: "Bend".into(),
            selected_plan: SelectedPlan::Annual,
            signup_source: None,
        }
        .into_user(days_ago(1000)),
    );
}

#[tokio::test]
async fn test_cleanup_rejects_bad_tokens() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.post("/cleanup").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Unauthorized - Invalid cleanup API key");
    assert_eq!(body["code"], "AUTH_001");

    server
        .post("/cleanup")
        .authorization_bearer("guess")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/cleanup")
        .add_header("Authorization", CLEANUP_TOKEN)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cleanup_ages_out_and_anonymizes() {
    let ctx = TestContext::new();
    seed(&ctx);
    let server = ctx.server();

    let response = server
        .post("/cleanup")
        .authorization_bearer(CLEANUP_TOKEN)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Data cleanup completed successfully");
    let stats = &body["stats"];
    assert_eq!(stats["events_deleted"], 1);
    assert_eq!(stats["sessions_deleted"], 1);
    assert_eq!(stats["ip_addresses_anonymized"], 2);
    assert_eq!(stats["errors"].as_array().unwrap().len(), 0);
    assert!(stats["oldest_remaining"]["users"].is_string());
    assert!(stats["cleanup_date"].is_string());

    assert_eq!(ctx.store.event_count(), 2);
    assert_eq!(ctx.store.session_count(), 2);
    assert!(ctx.store.session("mid").unwrap().ip_address.is_none());
    assert!(ctx.store.session("new").unwrap().ip_address.is_some());
    assert_eq!(ctx.store.user_count(), 1, "users are never deleted");

    // Nothing new aged: a second run changes nothing.
    let again: Value = server
        .post("/cleanup")
        .authorization_bearer(CLEANUP_TOKEN)
        .await
        .json();
    assert_eq!(again["stats"]["events_deleted"], 0);
    assert_eq!(again["stats"]["sessions_deleted"], 0);
    assert_eq!(again["stats"]["ip_addresses_anonymized"], 0);
}

#[tokio::test]
async fn test_cleanup_reports_failed_steps() {
    let ctx = TestContext::new();
    seed(&ctx);
    ctx.store.set_events_failing(true);

    let body: Value = ctx
        .server()
        .post("/cleanup")
        .authorization_bearer(CLEANUP_TOKEN)
        .await
        .json();

    let stats = &body["stats"];
    assert_eq!(stats["events_deleted"], 0);
    assert_eq!(stats["sessions_deleted"], 1, "later steps still run");
    assert!(!stats["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_info() {
    let ctx = TestContext::new();
    let body: Value = ctx.server().get("/cleanup").await.json();

    assert_eq!(body["message"], "Use POST method to trigger cleanup");
    assert_eq!(body["retention_policy"]["users"], "Kept forever (business records)");
    assert_eq!(body["retention_policy"]["sessions"], "Deleted after 1 year");
    assert!(body["usage"].as_str().unwrap().contains("Bearer"));
}
