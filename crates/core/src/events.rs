//! Event types: the raw client payload, the enriched form and the stored
//! record.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::{Error, Result, ValidationErrorCode};
use crate::limits::{
    MAX_EVENT_AGE_HOURS, MAX_EVENT_DATA_BYTES, MAX_EVENT_NAME_LEN, MAX_FUTURE_SKEW_SECS,
    MAX_IDENTIFIER_LEN, MAX_URL_LEN, MAX_USER_AGENT_LEN,
};
use crate::location::{GeoHints, LocationProfile};
use crate::session::SessionUpsert;

/// Free-form event payload. Shapes vary by event type.
pub type EventData = Map<String, Value>;

/// Session id recorded for events that arrive without one.
pub const ANONYMOUS_SESSION_ID: &str = "anonymous";

/// Known event types. Unknown names are kept verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PageView,
    ScrollDepth,
    SectionView,
    SectionExit,
    ButtonClick,
    LinkClick,
    FormStarted,
    FormCompleted,
    SignupCompleted,
    DemoRequested,
    PlanSelected,
    VideoLoad,
    SessionEnd,
    Custom(String),
}

impl EventType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PageView => "page_view",
            Self::ScrollDepth => "scroll_depth",
            Self::SectionView => "section_view",
            Self::SectionExit => "section_exit",
            Self::ButtonClick => "button_click",
            Self::LinkClick => "link_click",
            Self::FormStarted => "form_started",
            Self::FormCompleted => "form_completed",
            Self::SignupCompleted => "signup_completed",
            Self::DemoRequested => "demo_requested",
            Self::PlanSelected => "plan_selected",
            Self::VideoLoad => "video_load",
            Self::SessionEnd => "session_end",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "page_view" => Self::PageView,
            "scroll_depth" => Self::ScrollDepth,
            "section_view" => Self::SectionView,
            "section_exit" => Self::SectionExit,
            "button_click" => Self::ButtonClick,
            "link_click" => Self::LinkClick,
            "form_started" => Self::FormStarted,
            "form_completed" => Self::FormCompleted,
            "signup_completed" => Self::SignupCompleted,
            "demo_requested" => Self::DemoRequested,
            "plan_selected" => Self::PlanSelected,
            "video_load" => Self::VideoLoad,
            "session_end" => Self::SessionEnd,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as posted by the browser client (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Event name
    #[validate(length(min = 1))]
    pub event: String,

    /// Event-specific properties
    #[serde(default)]
    pub properties: Option<EventData>,

    /// Tab-scoped session identifier
    #[validate(length(min = 1))]
    pub session_id: Option<String>,

    /// Browser-scoped visitor identifier
    #[validate(length(min = 1))]
    #[serde(default)]
    pub visitor_id: Option<String>,

    /// Full page URL
    pub url: String,

    /// Browser user agent
    pub user_agent: String,

    /// Client clock, ISO-8601
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    /// Parse and validate a request body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let event: RawEvent = serde_json::from_slice(body).map_err(|e| {
            Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                format!("Invalid event payload: {}", e),
            )
        })?;
        event.check()?;
        Ok(event)
    }

    /// Run field validations, then the length and properties size bounds.
    ///
    /// Missing or empty fields are VALID_001; oversized ones VALID_002.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|e| {
            Error::validation_code(ValidationErrorCode::InvalidFormat, e.to_string())
        })?;

        let fields = [
            ("event", Some(self.event.as_str()), MAX_EVENT_NAME_LEN),
            ("sessionId", self.session_id.as_deref(), MAX_IDENTIFIER_LEN),
            ("visitorId", self.visitor_id.as_deref(), MAX_IDENTIFIER_LEN),
            ("url", Some(self.url.as_str()), MAX_URL_LEN),
            ("userAgent", Some(self.user_agent.as_str()), MAX_USER_AGENT_LEN),
        ];
        for (name, value, max) in fields {
            let len = value.map_or(0, |v| v.chars().count());
            if len > max {
                return Err(Error::validation_code(
                    ValidationErrorCode::PayloadTooLarge,
                    format!("{} is {} chars, limit {}", name, len, max),
                ));
            }
        }

        if let Some(ref properties) = self.properties {
            let size = serde_json::to_vec(properties)?.len();
            if size > MAX_EVENT_DATA_BYTES {
                return Err(Error::validation_code(
                    ValidationErrorCode::PayloadTooLarge,
                    format!(
                        "properties size {}KB exceeds {}KB limit",
                        size / 1024,
                        MAX_EVENT_DATA_BYTES / 1024
                    ),
                ));
            }
        }

        Ok(())
    }

    pub fn event_type(&self) -> EventType {
        EventType::from(self.event.as_str())
    }
}

/// Facts about the request that only the server can observe.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub geo_hints: GeoHints,
    pub referrer: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Build metadata stamped on every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    #[serde(default = "default_deployment_id")]
    pub deployment_id: String,
    #[serde(default = "default_git_commit")]
    pub git_commit: String,
}

fn default_deployment_id() -> String {
    "local".to_string()
}

fn default_git_commit() -> String {
    "unknown".to_string()
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self {
            deployment_id: default_deployment_id(),
            git_commit: default_git_commit(),
        }
    }
}

/// A raw event plus server-observed facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_type: EventType,
    pub event_data: EventData,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub url: String,
    pub user_agent: String,
    pub client_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
    pub geo_hints: GeoHints,
    pub location: LocationProfile,
    pub deployment: DeploymentInfo,
}

impl EnrichedEvent {
    /// Timestamp used for session activity.
    ///
    /// The client clock is used unless it is outside the accepted skew
    /// window around the server clock.
    pub fn activity_timestamp(&self) -> DateTime<Utc> {
        let earliest = self.server_timestamp - Duration::hours(MAX_EVENT_AGE_HOURS);
        let latest = self.server_timestamp + Duration::seconds(MAX_FUTURE_SKEW_SECS);

        if self.client_timestamp < earliest || self.client_timestamp > latest {
            self.server_timestamp
        } else {
            self.client_timestamp
        }
    }

    /// Row appended to the event store.
    pub fn to_record(&self) -> EventRecord {
        let mut event_data = self.event_data.clone();
        event_data.insert(
            "location_source".to_string(),
            Value::String(self.location.location_source.as_str().to_string()),
        );

        EventRecord {
            session_id: self
                .session_id
                .clone()
                .unwrap_or_else(|| ANONYMOUS_SESSION_ID.to_string()),
            visitor_id: self.visitor_id.clone(),
            event_type: self.event_type.clone(),
            event_data,
            timestamp: self.client_timestamp,
            server_timestamp: self.server_timestamp,
            user_agent: self.user_agent.clone(),
            url: self.url.clone(),
            referrer: self.referrer.clone(),
            ip_address: self.ip_address.clone(),
            deployment_id: self.deployment.deployment_id.clone(),
            git_commit: self.deployment.git_commit.clone(),
        }
    }

    /// Session write for this event, if it belongs to a session.
    pub fn to_session_upsert(&self) -> Option<SessionUpsert> {
        let session_id = self.session_id.clone()?;

        let conversion_plan = if self.event_type == EventType::SignupCompleted {
            Some(
                self.event_data
                    .get("plan")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            )
        } else {
            None
        };

        Some(SessionUpsert {
            session_id,
            seen_at: self.activity_timestamp(),
            ip_address: self.ip_address.clone(),
            country: self.geo_hints.country.clone(),
            city: self.geo_hints.city.clone(),
            location: Some(self.location.clone()),
            user_agent: Some(self.user_agent.clone()).filter(|ua| !ua.is_empty()),
            referrer: self.referrer.clone(),
            conversion: conversion_plan,
        })
    }
}

/// Stored, append-only event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: String,
    pub visitor_id: Option<String>,
    pub event_type: EventType,
    pub event_data: EventData,
    pub timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub url: String,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
    pub deployment_id: String,
    pub git_commit: String,
}
