//! Per-day session listing that merges anonymous sessions with signups.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceSummary;
use crate::location::{is_placeholder, NOT_AVAILABLE_LOCATION};
use crate::session::Session;
use crate::user::{User, UserSummary};

/// Which record a detail row was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailOrigin {
    Session,
    Signup,
}

/// One row of the day view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    /// Absent for a signup with no originating session.
    pub session_id: Option<String>,
    /// Session start, or signup time for signup rows.
    pub display_time: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Reported city; the user's own answer for signup rows.
    pub city: Option<String>,
    pub country: Option<String>,
    pub location: String,
    pub ip_address: Option<String>,
    pub ip_connection_type: Option<String>,
    pub ip_location_source: Option<String>,
    pub user_agent: Option<String>,
    pub converted: bool,
    pub conversion_plan: Option<String>,
    pub user: Option<UserSummary>,
    pub device_info: DeviceSummary,
    pub origin: DetailOrigin,
}

impl SessionDetail {
    /// Row for a raw session, with its user if it converted.
    pub fn from_session(session: &Session, user: Option<&User>) -> Self {
        Self {
            session_id: Some(session.session_id.clone()),
            display_time: session.first_seen,
            last_seen: Some(session.last_seen),
            city: session.effective_city().map(str::to_string),
            country: session.country.clone().or_else(|| session.ip_country.clone()),
            location: session_location(session),
            ip_address: session.ip_address.clone(),
            ip_connection_type: session.ip_connection_type.clone(),
            ip_location_source: session.ip_location_source.clone(),
            user_agent: session.user_agent.clone(),
            converted: session.converted || user.is_some(),
            conversion_plan: session.conversion_plan.clone(),
            user: user.map(UserSummary::from),
            device_info: DeviceSummary::parse(session.user_agent.as_deref().unwrap_or_default()),
            origin: DetailOrigin::Session,
        }
    }

    /// Row for a signup, borrowing device and IP context from its session.
    pub fn from_signup(user: &User, session: Option<&Session>) -> Self {
        let user_agent = session.and_then(|s| s.user_agent.clone());

        Self {
            session_id: session.map(|s| s.session_id.clone()),
            display_time: user.created_at,
            last_seen: session.map(|s| s.last_seen),
            city: Some(user.city.clone()),
            country: session.and_then(|s| s.country.clone().or_else(|| s.ip_country.clone())),
            location: session
                .map(session_location)
                .unwrap_or_else(|| user.city.clone()),
            ip_address: session.and_then(|s| s.ip_address.clone()),
            ip_connection_type: session.and_then(|s| s.ip_connection_type.clone()),
            ip_location_source: session.and_then(|s| s.ip_location_source.clone()),
            device_info: DeviceSummary::parse(user_agent.as_deref().unwrap_or_default()),
            user_agent,
            converted: true,
            conversion_plan: Some(user.selected_plan.as_str().to_string()),
            user: Some(UserSummary::from(user)),
            origin: DetailOrigin::Signup,
        }
    }
}

fn session_location(session: &Session) -> String {
    let parts: Vec<&str> = [
        session.ip_city.as_deref(),
        session.ip_region_name.as_deref(),
        session.ip_country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty() && !is_placeholder(s))
    .collect();

    if parts.is_empty() {
        NOT_AVAILABLE_LOCATION.to_string()
    } else {
        parts.join(", ")
    }
}

/// Find the session a signup came from.
///
/// A session linked by `user_id` wins. Otherwise the latest unlinked
/// candidate whose activity window covers the signup time is used.
pub fn originating_session<'a>(user: &User, candidates: &'a [Session]) -> Option<&'a Session> {
    candidates
        .iter()
        .find(|s| s.user_id == Some(user.id))
        .or_else(|| {
            candidates
                .iter()
                .filter(|s| s.user_id.is_none() && s.covers(user.created_at))
                .max_by_key(|s| s.last_seen)
        })
}

/// Merge the day's sessions and signups into one list.
///
/// `day_sessions` are sessions that started on the day. `day_users` are
/// signups created on the day. `linked_users` resolves `Session::user_id`
/// for the day's sessions, and `signup_sessions` holds candidate sessions
/// for the signups (linked ones and nearby unlinked ones).
///
/// When a session shows up both raw and as a signup's origin, the signup
/// row is kept. Rows are ordered newest first.
pub fn reconcile_day(
    day_sessions: &[Session],
    day_users: &[User],
    linked_users: &[User],
    signup_sessions: &[Session],
) -> Vec<SessionDetail> {
    let users_by_id: HashMap<Uuid, &User> = linked_users
        .iter()
        .chain(day_users.iter())
        .map(|u| (u.id, u))
        .collect();

    let mut by_session: HashMap<String, SessionDetail> = HashMap::new();
    let mut unattached: Vec<SessionDetail> = Vec::new();

    for session in day_sessions {
        let user = session.user_id.and_then(|id| users_by_id.get(&id).copied());
        by_session
            .entry(session.session_id.clone())
            .or_insert_with(|| SessionDetail::from_session(session, user));
    }

    for user in day_users {
        let origin = originating_session(user, signup_sessions)
            .or_else(|| originating_session(user, day_sessions));
        let detail = SessionDetail::from_signup(user, origin);

        match detail.session_id.clone() {
            Some(id) => {
                by_session.insert(id, detail);
            }
            None => unattached.push(detail),
        }
    }

    let mut details: Vec<SessionDetail> = by_session.into_values().chain(unattached).collect();
    details.sort_by(|a, b| b.display_time.cmp(&a.display_time));
    details
}
