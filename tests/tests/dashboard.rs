//! Dashboard reads: snapshot, daily rollup, day details and cities.

use analytics_core::{
    GeoHints, LocationProfile, NewUser, SelectedPlan, Session, SessionConversion, SessionUpsert,
};
use axum::http::StatusCode;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
}

fn session_at(id: &str, hour: u32, city: Option<&str>) -> Session {
    let at = Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap();
    let location = city.map(|city| {
        let mut profile = LocationProfile::lookup_failed(&GeoHints::default());
        profile.city = city.to_string();
        profile
    });
    Session::from_upsert(SessionUpsert {
        session_id: id.to_string(),
        seen_at: at,
        ip_address: Some("203.0.113.5".to_string()),
        country: None,
        city: None,
        location,
        user_agent: Some(fixtures::CHROME_UA.to_string()),
        referrer: None,
        conversion: None,
    })
}

#[tokio::test]
async fn test_snapshot_counts_funnel_and_plans() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server.post("/analytics").json(&fixtures::event("page_view", "v1")).await.assert_status_ok();
    server.post("/analytics").json(&fixtures::event("page_view", "v2")).await.assert_status_ok();
    server
        .post("/analytics")
        .json(&fixtures::event("plan_selected", "v2"))
        .await
        .assert_status_ok();
    server
        .post("/signup")
        .json(&fixtures::signup("Lin", "Denver", "annual", Some("v2")))
        .await
        .assert_status(StatusCode::CREATED);

    let snapshot: Value = server.get("/analytics").await.json();
    assert_eq!(snapshot["total_users"], 1);
    assert_eq!(snapshot["unique_visitors"], 2);
    assert_eq!(snapshot["funnel"][0]["event"], "page_view");
    assert_eq!(snapshot["funnel"][0]["count"], 2);
    assert_eq!(snapshot["funnel"][2]["event"], "plan_selected");
    assert_eq!(snapshot["funnel"][2]["count"], 1);
    assert_eq!(snapshot["plan_distribution"]["annual"], 1);
    assert_eq!(snapshot["plan_distribution"]["free"], 0);
    assert_eq!(snapshot["recent_users"][0]["name"], "Lin");
}

#[tokio::test]
async fn test_snapshot_placeholder_on_store_error() {
    let ctx = TestContext::new();
    ctx.store.set_users_failing(true);

    let response = ctx.server().get("/analytics").await;
    response.assert_status_ok();
    let snapshot: Value = response.json();
    assert_eq!(snapshot["status"], "unavailable");
    assert_eq!(snapshot["total_users"], 0);
    assert_eq!(snapshot["recent_users"].as_array().unwrap().len(), 0);
}

/// A day with no sessions and one signup converts at 100%.
#[tokio::test]
async fn test_daily_signup_only_day_converts_fully() {
    let ctx = TestContext::new();
    let created = Utc.with_ymd_and_hms(2026, 5, 4, 15, 0, 0).unwrap();
    ctx.store.put_user(
        NewUser {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            city: "Reno".into(),
            selected_plan: SelectedPlan::Free,
            signup_source: None,
        }
        .into_user(created),
    );

    let daily: Value = ctx
        .server()
        .get("/analytics/daily")
        .add_query_param("start_date", "2026-05-01")
        .add_query_param("end_date", "2026-05-07")
        .await
        .json();

    let rows = daily.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2026-05-04");
    assert_eq!(rows[0]["total_sessions"], 0);
    assert_eq!(rows[0]["signups"], 1);
    assert_eq!(rows[0]["conversions"], 1);
    assert_eq!(rows[0]["conversion_rate"], 100.0);
}

#[tokio::test]
async fn test_daily_is_idempotent_and_filters_city() {
    let ctx = TestContext::new();
    ctx.store.put_session(session_at("a", 9, Some("Austin")));
    ctx.store.put_session(session_at("b", 10, Some("Dallas")));
    ctx.store.put_session(session_at("c", 11, Some("austin")));
    let server = ctx.server();

    let first: Value = server.get("/analytics/daily").await.json();
    let second: Value = server.get("/analytics/daily").await.json();
    assert_eq!(first, second);
    assert_eq!(first[0]["total_sessions"], 3);

    let austin: Value = server
        .get("/analytics/daily")
        .add_query_param("city", "Austin")
        .await
        .json();
    assert_eq!(austin[0]["total_sessions"], 2);

    let all: Value = server
        .get("/analytics/daily")
        .add_query_param("city", "all")
        .await
        .json();
    assert_eq!(all[0]["total_sessions"], 3);
}

#[tokio::test]
async fn test_day_details_merge_signup_with_session() {
    let ctx = TestContext::new();
    let user = NewUser {
        name: "Kim".into(),
        email: "kim@example.com".into(),
        city: "Tacoma".into(),
        selected_plan: SelectedPlan::Monthly,
        signup_source: None,
    }
    .into_user(Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap());

    let mut linked = session_at("s1", 9, Some("Seattle"));
    linked.last_seen = linked.first_seen + Duration::minutes(45);
    linked.convert(&SessionConversion {
        user_id: user.id,
        plan: "monthly".into(),
        city: user.city.clone(),
    });

    ctx.store.put_session(linked);
    ctx.store.put_session(session_at("s2", 12, None));
    ctx.store.put_user(user);

    let details: Value = ctx
        .server()
        .get(&format!("/analytics/day/{}", day()))
        .await
        .json();
    let rows = details.as_array().unwrap();

    assert_eq!(rows.len(), 2, "converted session is listed once");
    assert_eq!(rows[0]["session_id"], "s2");
    assert_eq!(rows[0]["origin"], "session");
    assert_eq!(rows[1]["session_id"], "s1");
    assert_eq!(rows[1]["origin"], "signup");
    assert_eq!(rows[1]["city"], "Tacoma");
    assert_eq!(rows[1]["conversion_plan"], "monthly");
    assert_eq!(rows[1]["device_info"]["browser"], "Chrome");
}

#[tokio::test]
async fn test_cities_lists_sessions_and_signups() {
    let ctx = TestContext::new();
    ctx.store.put_session(session_at("a", 9, Some("Austin")));
    ctx.store.put_session(session_at("b", 9, None));
    let server = ctx.server();
    server
        .post("/signup")
        .json(&fixtures::signup("Bo", "Boise", "free", None))
        .await
        .assert_status(StatusCode::CREATED);

    let cities: Value = server.get("/analytics/cities").await.json();
    assert_eq!(cities, serde_json::json!(["Austin", "Boise"]));
}
