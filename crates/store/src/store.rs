//! Persistence interface used by the pipeline.

use analytics_core::{
    EventRecord, EventType, NewUser, OldestRecords, Result, Session, SessionConversion,
    SessionUpsert, TimeRange, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for table reads.
///
/// The time range applies to each table's own time column: server
/// timestamp for events, `first_seen` for sessions, `created_at` for users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub range: TimeRange,
    /// Case-insensitive exact city match.
    pub city: Option<String>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_range(range: TimeRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    /// Set the city filter. Blank and `"all"` mean no filter.
    pub fn with_city(mut self, city: Option<&str>) -> Self {
        self.city = city
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
            .map(str::to_string);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row's city passes the filter.
    pub fn matches_city(&self, city: Option<&str>) -> bool {
        match (&self.city, city) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual.trim()),
            (Some(_), None) => false,
        }
    }
}

/// Row counts for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreTotals {
    pub users: u64,
    pub sessions: u64,
}

/// Keyed table service for events, sessions and users.
///
/// Reads return rows newest first.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Append an event. Events are never deduplicated.
    async fn append_event(&self, event: EventRecord) -> Result<()>;

    /// Insert or update a session by `session_id`.
    async fn upsert_session(&self, upsert: SessionUpsert) -> Result<()>;

    /// Store a new signup.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    /// Mark a session converted by a user. Returns false if the session
    /// does not exist.
    async fn link_user_to_session(
        &self,
        session_id: &str,
        conversion: SessionConversion,
    ) -> Result<bool>;

    async fn query_events(&self, filter: &QueryFilter) -> Result<Vec<EventRecord>>;

    async fn query_sessions(&self, filter: &QueryFilter) -> Result<Vec<Session>>;

    async fn query_users(&self, filter: &QueryFilter) -> Result<Vec<User>>;

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>>;

    async fn sessions_by_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Session>>;

    async fn totals(&self) -> Result<StoreTotals>;

    /// Event counts for the given types, in the same order.
    async fn count_events_by_type(&self, types: &[EventType]) -> Result<Vec<u64>>;

    /// Delete events whose server timestamp is before `cutoff`.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete sessions whose `first_seen` is before `cutoff`.
    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Null the IP of events older than `cutoff` that still have one.
    async fn anonymize_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Null the IP of sessions older than `cutoff` that still have one.
    async fn anonymize_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn oldest_records(&self) -> Result<OldestRecords>;

    /// Whether the backing store answers.
    async fn ping(&self) -> bool;
}
