//! In-process store.
//!
//! Backs development runs (`storage.backend = "memory"`) and tests. Each
//! table can be switched into a failing mode to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use analytics_core::{
    Error, EventRecord, EventType, NewUser, OldestRecords, Result, Session, SessionConversion,
    SessionUpsert, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::store::{AnalyticsStore, QueryFilter, StoreTotals};

#[derive(Default)]
struct Tables {
    events: Vec<EventRecord>,
    sessions: HashMap<String, Session>,
    users: Vec<User>,
}

/// Store that keeps every table in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_events: AtomicBool,
    fail_sessions: AtomicBool,
    fail_users: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make event reads and writes fail.
    pub fn set_events_failing(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::Relaxed);
    }

    /// Make session reads and writes fail.
    pub fn set_sessions_failing(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::Relaxed);
    }

    /// Make user reads and writes fail.
    pub fn set_users_failing(&self, fail: bool) {
        self.fail_users.store(fail, Ordering::Relaxed);
    }

    /// Insert a fully formed session, replacing any with the same id.
    pub fn put_session(&self, session: Session) {
        self.tables
            .write()
            .sessions
            .insert(session.session_id.clone(), session);
    }

    /// Insert a fully formed user.
    pub fn put_user(&self, user: User) {
        self.tables.write().users.push(user);
    }

    /// Insert a fully formed event.
    pub fn put_event(&self, event: EventRecord) {
        self.tables.write().events.push(event);
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.tables.read().sessions.get(session_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.tables.read().events.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.read().sessions.len()
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }

    fn check(flag: &AtomicBool, table: &str) -> Result<()> {
        if flag.load(Ordering::Relaxed) {
            Err(Error::storage(format!("{} table unavailable", table)))
        } else {
            Ok(())
        }
    }
}

fn take<T>(mut rows: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn append_event(&self, event: EventRecord) -> Result<()> {
        Self::check(&self.fail_events, "events")?;
        self.tables.write().events.push(event);
        Ok(())
    }

    async fn upsert_session(&self, upsert: SessionUpsert) -> Result<()> {
        Self::check(&self.fail_sessions, "sessions")?;
        let mut tables = self.tables.write();
        match tables.sessions.get_mut(&upsert.session_id) {
            Some(existing) => existing.apply(upsert),
            None => {
                debug!(session_id = %upsert.session_id, "Creating session");
                tables
                    .sessions
                    .insert(upsert.session_id.clone(), Session::from_upsert(upsert));
            }
        }
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        Self::check(&self.fail_users, "users")?;
        let user = user.into_user(Utc::now());
        self.tables.write().users.push(user.clone());
        Ok(user)
    }

    async fn link_user_to_session(
        &self,
        session_id: &str,
        conversion: SessionConversion,
    ) -> Result<bool> {
        Self::check(&self.fail_sessions, "sessions")?;
        match self.tables.write().sessions.get_mut(session_id) {
            Some(session) => {
                session.convert(&conversion);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_events(&self, filter: &QueryFilter) -> Result<Vec<EventRecord>> {
        Self::check(&self.fail_events, "events")?;
        let tables = self.tables.read();
        let mut rows: Vec<EventRecord> = tables
            .events
            .iter()
            .filter(|e| filter.range.contains(e.server_timestamp))
            .filter(|e| {
                filter.city.is_none()
                    || filter.matches_city(
                        tables
                            .sessions
                            .get(&e.session_id)
                            .and_then(|s| s.effective_city()),
                    )
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.server_timestamp.cmp(&a.server_timestamp));
        Ok(take(rows, filter.limit))
    }

    async fn query_sessions(&self, filter: &QueryFilter) -> Result<Vec<Session>> {
        Self::check(&self.fail_sessions, "sessions")?;
        let mut rows: Vec<Session> = self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| filter.range.contains(s.first_seen))
            .filter(|s| filter.matches_city(s.effective_city()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
        Ok(take(rows, filter.limit))
    }

    async fn query_users(&self, filter: &QueryFilter) -> Result<Vec<User>> {
        Self::check(&self.fail_users, "users")?;
        let mut rows: Vec<User> = self
            .tables
            .read()
            .users
            .iter()
            .filter(|u| filter.range.contains(u.created_at))
            .filter(|u| filter.matches_city(Some(&u.city)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(take(rows, filter.limit))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        Self::check(&self.fail_users, "users")?;
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn sessions_by_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Session>> {
        Self::check(&self.fail_sessions, "sessions")?;
        let mut rows: Vec<Session> = self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| s.user_id.is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
        Ok(rows)
    }

    async fn totals(&self) -> Result<StoreTotals> {
        Self::check(&self.fail_users, "users")?;
        Self::check(&self.fail_sessions, "sessions")?;
        let tables = self.tables.read();
        Ok(StoreTotals {
            users: tables.users.len() as u64,
            sessions: tables.sessions.len() as u64,
        })
    }

    async fn count_events_by_type(&self, types: &[EventType]) -> Result<Vec<u64>> {
        Self::check(&self.fail_events, "events")?;
        let tables = self.tables.read();
        Ok(types
            .iter()
            .map(|t| tables.events.iter().filter(|e| &e.event_type == t).count() as u64)
            .collect())
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Self::check(&self.fail_events, "events")?;
        let mut tables = self.tables.write();
        let before = tables.events.len();
        tables.events.retain(|e| e.server_timestamp >= cutoff);
        Ok((before - tables.events.len()) as u64)
    }

    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Self::check(&self.fail_sessions, "sessions")?;
        let mut tables = self.tables.write();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.first_seen >= cutoff);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn anonymize_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Self::check(&self.fail_events, "events")?;
        let mut count = 0;
        for event in self.tables.write().events.iter_mut() {
            if event.server_timestamp < cutoff && event.ip_address.is_some() {
                event.ip_address = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn anonymize_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Self::check(&self.fail_sessions, "sessions")?;
        let mut count = 0;
        for session in self.tables.write().sessions.values_mut() {
            if session.first_seen < cutoff && session.ip_address.is_some() {
                session.ip_address = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn oldest_records(&self) -> Result<OldestRecords> {
        Self::check(&self.fail_users, "users")?;
        Self::check(&self.fail_sessions, "sessions")?;
        Self::check(&self.fail_events, "events")?;
        let tables = self.tables.read();
        Ok(OldestRecords {
            users: tables.users.iter().map(|u| u.created_at).min(),
            sessions: tables.sessions.values().map(|s| s.first_seen).min(),
            events: tables.events.iter().map(|e| e.server_timestamp).min(),
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}
