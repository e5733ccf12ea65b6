//! ClickHouse row shapes and their conversions to domain types.
//!
//! Timestamps travel as milliseconds since the epoch (DateTime64(3)).

use analytics_core::{Error, EventData, EventRecord, EventType, Result, SelectedPlan, Session, User};
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::storage(format!("timestamp out of range: {}", ms)))
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub session_id: String,
    pub visitor_id: Option<String>,
    pub event_type: String,
    pub event_data: String,
    pub timestamp: i64,
    pub server_timestamp: i64,
    pub user_agent: String,
    pub url: String,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
    pub deployment_id: String,
    pub git_commit: String,
}

impl TryFrom<&EventRecord> for EventRow {
    type Error = Error;

    fn try_from(event: &EventRecord) -> Result<Self> {
        Ok(Self {
            session_id: event.session_id.clone(),
            visitor_id: event.visitor_id.clone(),
            event_type: event.event_type.as_str().to_string(),
            event_data: serde_json::to_string(&event.event_data)?,
            timestamp: event.timestamp.timestamp_millis(),
            server_timestamp: event.server_timestamp.timestamp_millis(),
            user_agent: event.user_agent.clone(),
            url: event.url.clone(),
            referrer: event.referrer.clone(),
            ip_address: event.ip_address.clone(),
            deployment_id: event.deployment_id.clone(),
            git_commit: event.git_commit.clone(),
        })
    }
}

impl TryFrom<EventRow> for EventRecord {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let event_data: EventData = if row.event_data.is_empty() {
            EventData::new()
        } else {
            serde_json::from_str(&row.event_data)?
        };

        Ok(Self {
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            event_type: EventType::from(row.event_type),
            event_data,
            timestamp: from_millis(row.timestamp)?,
            server_timestamp: from_millis(row.server_timestamp)?,
            user_agent: row.user_agent,
            url: row.url,
            referrer: row.referrer,
            ip_address: row.ip_address,
            deployment_id: row.deployment_id,
            git_commit: row.git_commit,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub ip_country: Option<String>,
    pub ip_country_code: Option<String>,
    pub ip_region: Option<String>,
    pub ip_region_name: Option<String>,
    pub ip_city: Option<String>,
    pub ip_postal_code: Option<String>,
    pub ip_latitude: Option<f64>,
    pub ip_longitude: Option<f64>,
    pub ip_timezone: Option<String>,
    pub ip_isp: Option<String>,
    pub ip_organization: Option<String>,
    pub ip_as_number: Option<String>,
    pub ip_connection_type: Option<String>,
    pub ip_is_mobile: Option<bool>,
    pub ip_is_proxy: Option<bool>,
    pub ip_is_hosting: Option<bool>,
    pub ip_accuracy_radius: Option<u32>,
    pub ip_location_source: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub converted: bool,
    pub conversion_plan: Option<String>,
    pub user_id: Option<String>,
    pub version: u64,
}

impl SessionRow {
    pub fn from_session(session: &Session, version: u64) -> Self {
        Self {
            session_id: session.session_id.clone(),
            first_seen: session.first_seen.timestamp_millis(),
            last_seen: session.last_seen.timestamp_millis(),
            ip_address: session.ip_address.clone(),
            country: session.country.clone(),
            city: session.city.clone(),
            ip_country: session.ip_country.clone(),
            ip_country_code: session.ip_country_code.clone(),
            ip_region: session.ip_region.clone(),
            ip_region_name: session.ip_region_name.clone(),
            ip_city: session.ip_city.clone(),
            ip_postal_code: session.ip_postal_code.clone(),
            ip_latitude: session.ip_latitude,
            ip_longitude: session.ip_longitude,
            ip_timezone: session.ip_timezone.clone(),
            ip_isp: session.ip_isp.clone(),
            ip_organization: session.ip_organization.clone(),
            ip_as_number: session.ip_as_number.clone(),
            ip_connection_type: session.ip_connection_type.clone(),
            ip_is_mobile: session.ip_is_mobile,
            ip_is_proxy: session.ip_is_proxy,
            ip_is_hosting: session.ip_is_hosting,
            ip_accuracy_radius: session.ip_accuracy_radius,
            ip_location_source: session.ip_location_source.clone(),
            user_agent: session.user_agent.clone(),
            referrer: session.referrer.clone(),
            converted: session.converted,
            conversion_plan: session.conversion_plan.clone(),
            user_id: session.user_id.map(|id| id.to_string()),
            version,
        }
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let user_id = row
            .user_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| Error::storage(format!("bad user_id on session {}: {}", row.session_id, e)))?;

        Ok(Self {
            first_seen: from_millis(row.first_seen)?,
            last_seen: from_millis(row.last_seen)?,
            session_id: row.session_id,
            ip_address: row.ip_address,
            country: row.country,
            city: row.city,
            ip_country: row.ip_country,
            ip_country_code: row.ip_country_code,
            ip_region: row.ip_region,
            ip_region_name: row.ip_region_name,
            ip_city: row.ip_city,
            ip_postal_code: row.ip_postal_code,
            ip_latitude: row.ip_latitude,
            ip_longitude: row.ip_longitude,
            ip_timezone: row.ip_timezone,
            ip_isp: row.ip_isp,
            ip_organization: row.ip_organization,
            ip_as_number: row.ip_as_number,
            ip_connection_type: row.ip_connection_type,
            ip_is_mobile: row.ip_is_mobile,
            ip_is_proxy: row.ip_is_proxy,
            ip_is_hosting: row.ip_is_hosting,
            ip_accuracy_radius: row.ip_accuracy_radius,
            ip_location_source: row.ip_location_source,
            user_agent: row.user_agent,
            referrer: row.referrer,
            converted: row.converted,
            conversion_plan: row.conversion_plan,
            user_id,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub city: String,
    pub selected_plan: String,
    pub signup_source: Option<String>,
    pub created_at: i64,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            city: user.city.clone(),
            selected_plan: user.selected_plan.as_str().to_string(),
            signup_source: user.signup_source.clone(),
            created_at: user.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| Error::storage(format!("bad user id {}: {}", row.id, e)))?,
            selected_plan: row.selected_plan.parse::<SelectedPlan>()?,
            created_at: from_millis(row.created_at)?,
            name: row.name,
            email: row.email,
            city: row.city,
            signup_source: row.signup_source,
        })
    }
}

/// `SELECT event_type, count() AS count ... GROUP BY event_type`
#[derive(Debug, Clone, Row, Deserialize)]
pub struct TypeCountRow {
    pub event_type: String,
    pub count: u64,
}

/// `SELECT minOrNull(...) AS ts`
#[derive(Debug, Clone, Row, Deserialize)]
pub struct OldestRow {
    pub ts: Option<i64>,
}
