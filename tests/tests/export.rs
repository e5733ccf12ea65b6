//! `GET /export` in JSON and CSV.

use axum::http::{header, StatusCode};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

#[tokio::test]
async fn test_empty_users_csv_is_empty_body() {
    let ctx = TestContext::new();

    let response = ctx
        .server()
        .get("/export")
        .add_query_param("table", "users")
        .add_query_param("format", "csv")
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "");
    assert_eq!(response.header(header::CONTENT_TYPE), "text/csv");
    let disposition = response.header(header::CONTENT_DISPOSITION);
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"users_export_"));
    assert!(disposition.ends_with(".csv\""));
}

#[tokio::test]
async fn test_csv_all_returns_guidance() {
    let ctx = TestContext::new();

    let body: Value = ctx
        .server()
        .get("/export")
        .add_query_param("format", "csv")
        .await
        .json();

    assert_eq!(
        body["message"],
        "For multi-table CSV export, please use individual table exports"
    );
    assert_eq!(body["available_tables"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_users_csv_quotes_fields() {
    let ctx = TestContext::new();
    let server = ctx.server();
    server
        .post("/signup")
        .json(&fixtures::signup("Ray", "Washington, D.C.", "monthly", None))
        .await
        .assert_status(StatusCode::CREATED);

    let csv = server
        .get("/export")
        .add_query_param("table", "users")
        .add_query_param("format", "csv")
        .await
        .text();

    let mut lines = csv.lines();
    let header_row = lines.next().unwrap();
    assert!(header_row.contains("email"));
    assert!(header_row.contains("selected_plan"));
    let row = lines.next().unwrap();
    assert!(row.contains("\"Washington, D.C.\""));
    assert!(row.contains("ray@example.com"));
}

#[tokio::test]
async fn test_json_export_document() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/analytics")
        .json(&fixtures::event("page_view", "j1"))
        .await
        .assert_status_ok();
    server
        .post("/signup")
        .json(&fixtures::signup("Jo", "Salem", "free", Some("j1")))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/export").await;
    response.assert_status_ok();
    let doc: Value = response.json();

    assert_eq!(doc["date_range"]["start"], "all_time");
    assert_eq!(doc["date_range"]["end"], "all_time");
    assert_eq!(doc["record_counts"]["users"], 1);
    assert_eq!(doc["record_counts"]["sessions"], 1);
    assert_eq!(doc["record_counts"]["events"], 1);
    assert_eq!(doc["record_counts"]["journey"], 1);
    assert_eq!(doc["data"]["journey"][0]["name"], "Jo");
    assert_eq!(doc["data"]["journey"][0]["sessions"][0]["session_id"], "j1");
    assert!(doc["exported_at"].is_string());
}

#[tokio::test]
async fn test_single_table_json_and_window() {
    let ctx = TestContext::new();
    let server = ctx.server();
    server
        .post("/analytics")
        .json(&fixtures::event("page_view", "w1"))
        .await
        .assert_status_ok();

    let doc: Value = server
        .get("/export")
        .add_query_param("table", "sessions")
        .await
        .json();
    assert!(doc["data"].get("users").is_none());
    assert_eq!(doc["record_counts"]["sessions"], 1);

    let doc: Value = server
        .get("/export")
        .add_query_param("table", "sessions")
        .add_query_param("start_date", "2001-01-01")
        .add_query_param("end_date", "2001-01-31")
        .await
        .json();
    assert_eq!(doc["record_counts"]["sessions"], 0);
    assert_eq!(doc["date_range"]["start"], "2001-01-01");
}

#[tokio::test]
async fn test_bad_export_parameters() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for (key, value) in [("format", "xml"), ("table", "orders"), ("start_date", "01/02/2026")] {
        let response = server.get("/export").add_query_param(key, value).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "VALID_001");
    }
}
