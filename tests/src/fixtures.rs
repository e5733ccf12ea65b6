//! Request bodies for the integration tests.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Tracking event for a session, stamped now.
pub fn event(event: &str, session_id: &str) -> Value {
    event_at(event, session_id, Utc::now())
}

/// Tracking event with an explicit client timestamp.
pub fn event_at(event: &str, session_id: &str, timestamp: DateTime<Utc>) -> Value {
    json!({
        "event": event,
        "properties": {},
        "sessionId": session_id,
        "visitorId": format!("visitor_{}", session_id),
        "url": "https://example.com/pricing",
        "userAgent": CHROME_UA,
        "timestamp": timestamp.to_rfc3339(),
    })
}

/// `signup_completed` carrying the chosen plan.
pub fn signup_completed(session_id: &str, plan: &str) -> Value {
    let mut body = event("signup_completed", session_id);
    body["properties"] = json!({ "plan": plan });
    body
}

/// Signup form submission.
pub fn signup(name: &str, city: &str, plan: &str, session_id: Option<&str>) -> Value {
    json!({
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "city": city,
        "selectedPlan": plan,
        "sessionId": session_id,
    })
}

/// Event whose body exceeds the 64KB limit.
pub fn oversized_event() -> Value {
    let mut body = event("page_view", "s-big");
    body["properties"] = json!({ "blob": "x".repeat(70_000) });
    body
}
