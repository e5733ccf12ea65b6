//! ClickHouse-backed [`AnalyticsStore`].

use std::time::Instant;

use analytics_core::{
    Error, EventRecord, EventType, NewUser, OldestRecords, Result, Session, SessionConversion,
    SessionUpsert, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::query::Query;
use telemetry::metrics;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::ClickHouseClient;
use crate::health::check_connection;
use crate::rows::{EventRow, OldestRow, SessionRow, TypeCountRow, UserRow};
use crate::schema::tables;
use crate::store::{AnalyticsStore, QueryFilter, StoreTotals};

/// Session city as used by the city filter: reported city, else IP city.
const SESSION_CITY: &str = "lower(coalesce(city, ip_city, ''))";

fn db_error(context: &'static str) -> impl Fn(clickhouse::error::Error) -> Error {
    move |e| Error::storage(format!("{}: {}", context, e))
}

enum Bind {
    Millis(i64),
    Text(String),
    Count(u64),
}

/// A SELECT assembled from a [`QueryFilter`].
struct FilteredSelect {
    sql: String,
    binds: Vec<Bind>,
}

impl FilteredSelect {
    /// `time_column` carries the range; `city_clause` is a predicate with one
    /// `?` that receives the lowercased city.
    fn new(from: &str, time_column: &str, city_clause: &str, filter: &QueryFilter) -> Self {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        if let Some(start) = filter.range.from {
            conditions.push(format!("{} >= fromUnixTimestamp64Milli(?)", time_column));
            binds.push(Bind::Millis(start.timestamp_millis()));
        }
        if let Some(end) = filter.range.to {
            conditions.push(format!("{} < fromUnixTimestamp64Milli(?)", time_column));
            binds.push(Bind::Millis(end.timestamp_millis()));
        }
        if let Some(ref city) = filter.city {
            conditions.push(city_clause.to_string());
            binds.push(Bind::Text(city.to_lowercase()));
        }

        let mut sql = format!("SELECT ?fields FROM {}", from);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {} DESC", time_column));
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Bind::Count(limit as u64));
        }

        Self { sql, binds }
    }

    fn build(self, client: &ClickHouseClient) -> Query {
        self.binds
            .into_iter()
            .fold(client.inner().query(&self.sql), |query, bind| match bind {
                Bind::Millis(ms) => query.bind(ms),
                Bind::Text(text) => query.bind(text),
                Bind::Count(n) => query.bind(n),
            })
    }
}

/// Store over the `events`, `sessions` and `users` tables.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<(Session, u64)>> {
        let row = self
            .client
            .inner()
            .query("SELECT ?fields FROM sessions FINAL WHERE session_id = ? LIMIT 1")
            .bind(session_id)
            .fetch_optional::<SessionRow>()
            .await
            .map_err(db_error("Session read failed"))?;

        match row {
            Some(row) => {
                let version = row.version;
                Ok(Some((Session::try_from(row)?, version)))
            }
            None => Ok(None),
        }
    }

    /// Write a full session row with a version above the previous one.
    async fn write_session(&self, session: &Session, previous: Option<u64>) -> Result<()> {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let version = previous.map_or(now, |v| now.max(v + 1));
        let row = SessionRow::from_session(session, version);

        let mut insert = self
            .client
            .inner()
            .insert(tables::SESSIONS)
            .map_err(db_error("Insert error"))?;
        insert.write(&row).await.map_err(db_error("Write error"))?;
        insert.end().await.map_err(db_error("End error"))?;
        Ok(())
    }

    async fn count(&self, sql: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.client
            .inner()
            .query(sql)
            .bind(cutoff.timestamp_millis())
            .fetch_one::<u64>()
            .await
            .map_err(db_error("Count failed"))
    }

    /// Count matching rows, then run the mutation if any match.
    async fn mutate(&self, count_sql: &str, mutation_sql: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let affected = self.count(count_sql, cutoff).await?;
        if affected == 0 {
            return Ok(0);
        }

        self.client
            .inner()
            .query(mutation_sql)
            .bind(cutoff.timestamp_millis())
            .execute()
            .await
            .map_err(db_error("Mutation failed"))?;

        info!(rows = affected, mutation = mutation_sql, "ClickHouse mutation applied");
        Ok(affected)
    }

    async fn min_millis(&self, sql: &str) -> Result<Option<DateTime<Utc>>> {
        let row = self
            .client
            .inner()
            .query(sql)
            .fetch_one::<OldestRow>()
            .await
            .map_err(db_error("Query error"))?;
        Ok(row.ts.and_then(DateTime::from_timestamp_millis))
    }
}

#[async_trait]
impl AnalyticsStore for ClickHouseStore {
    async fn append_event(&self, event: EventRecord) -> Result<()> {
        let start = Instant::now();
        let row = EventRow::try_from(&event)?;

        let mut insert = self
            .client
            .inner()
            .insert(tables::EVENTS)
            .map_err(db_error("Insert error"))?;
        insert.write(&row).await.map_err(db_error("Write error"))?;
        insert.end().await.map_err(db_error("End error"))?;

        let elapsed = start.elapsed();
        metrics().store_latency.record(elapsed);
        debug!(
            session_id = %event.session_id,
            event_type = %event.event_type,
            latency_ms = %elapsed.as_millis(),
            "Inserted event to ClickHouse"
        );
        Ok(())
    }

    async fn upsert_session(&self, upsert: SessionUpsert) -> Result<()> {
        let start = Instant::now();
        let (session, previous) = match self.load_session(&upsert.session_id).await? {
            Some((mut existing, version)) => {
                existing.apply(upsert);
                (existing, Some(version))
            }
            None => (Session::from_upsert(upsert), None),
        };

        self.write_session(&session, previous).await?;
        metrics().store_latency.record(start.elapsed());
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let user = user.into_user(Utc::now());
        let row = UserRow::from(&user);

        let mut insert = self
            .client
            .inner()
            .insert(tables::USERS)
            .map_err(db_error("Insert error"))?;
        insert.write(&row).await.map_err(db_error("Write error"))?;
        insert.end().await.map_err(db_error("End error"))?;

        debug!(user_id = %user.id, "Inserted user to ClickHouse");
        Ok(user)
    }

    async fn link_user_to_session(
        &self,
        session_id: &str,
        conversion: SessionConversion,
    ) -> Result<bool> {
        let Some((mut session, version)) = self.load_session(session_id).await? else {
            return Ok(false);
        };

        session.convert(&conversion);
        self.write_session(&session, Some(version)).await?;
        Ok(true)
    }

    async fn query_events(&self, filter: &QueryFilter) -> Result<Vec<EventRecord>> {
        let city_clause = format!(
            "session_id IN (SELECT session_id FROM sessions FINAL WHERE {} = ?)",
            SESSION_CITY
        );
        let rows = FilteredSelect::new(tables::EVENTS, "server_timestamp", &city_clause, filter)
            .build(&self.client)
            .fetch_all::<EventRow>()
            .await
            .map_err(db_error("Query error"))?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn query_sessions(&self, filter: &QueryFilter) -> Result<Vec<Session>> {
        let city_clause = format!("{} = ?", SESSION_CITY);
        let rows = FilteredSelect::new("sessions FINAL", "first_seen", &city_clause, filter)
            .build(&self.client)
            .fetch_all::<SessionRow>()
            .await
            .map_err(db_error("Query error"))?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn query_users(&self, filter: &QueryFilter) -> Result<Vec<User>> {
        let rows = FilteredSelect::new(tables::USERS, "created_at", "lower(city) = ?", filter)
            .build(&self.client)
            .fetch_all::<UserRow>()
            .await
            .map_err(db_error("Query error"))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let rows = self
            .client
            .inner()
            .query("SELECT ?fields FROM users WHERE has(?, id)")
            .bind(ids)
            .fetch_all::<UserRow>()
            .await
            .map_err(db_error("Query error"))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn sessions_by_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Session>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let rows = self
            .client
            .inner()
            .query(
                "SELECT ?fields FROM sessions FINAL \
                 WHERE user_id IS NOT NULL AND has(?, assumeNotNull(user_id)) \
                 ORDER BY first_seen DESC",
            )
            .bind(ids)
            .fetch_all::<SessionRow>()
            .await
            .map_err(db_error("Query error"))?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn totals(&self) -> Result<StoreTotals> {
        let users = self
            .client
            .inner()
            .query("SELECT count() FROM users")
            .fetch_one::<u64>()
            .await
            .map_err(db_error("Query error"))?;
        let sessions = self
            .client
            .inner()
            .query("SELECT count() FROM sessions FINAL")
            .fetch_one::<u64>()
            .await
            .map_err(db_error("Query error"))?;

        Ok(StoreTotals { users, sessions })
    }

    async fn count_events_by_type(&self, types: &[EventType]) -> Result<Vec<u64>> {
        let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();

        let rows = self
            .client
            .inner()
            .query(
                "SELECT event_type, count() AS count FROM events \
                 WHERE has(?, event_type) GROUP BY event_type",
            )
            .bind(names.clone())
            .fetch_all::<TypeCountRow>()
            .await
            .map_err(db_error("Query error"))?;

        Ok(names
            .iter()
            .map(|name| {
                rows.iter()
                    .find(|r| &r.event_type == name)
                    .map_or(0, |r| r.count)
            })
            .collect())
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.mutate(
            "SELECT count() FROM events WHERE server_timestamp < fromUnixTimestamp64Milli(?)",
            "ALTER TABLE events DELETE WHERE server_timestamp < fromUnixTimestamp64Milli(?)",
            cutoff,
        )
        .await
    }

    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.mutate(
            "SELECT count() FROM sessions FINAL WHERE first_seen < fromUnixTimestamp64Milli(?)",
            "ALTER TABLE sessions DELETE WHERE first_seen < fromUnixTimestamp64Milli(?)",
            cutoff,
        )
        .await
    }

    async fn anonymize_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.mutate(
            "SELECT count() FROM events \
             WHERE server_timestamp < fromUnixTimestamp64Milli(?) AND ip_address IS NOT NULL",
            "ALTER TABLE events UPDATE ip_address = NULL \
             WHERE server_timestamp < fromUnixTimestamp64Milli(?) AND ip_address IS NOT NULL",
            cutoff,
        )
        .await
    }

    async fn anonymize_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.mutate(
            "SELECT count() FROM sessions FINAL \
             WHERE first_seen < fromUnixTimestamp64Milli(?) AND ip_address IS NOT NULL",
            "ALTER TABLE sessions UPDATE ip_address = NULL \
             WHERE first_seen < fromUnixTimestamp64Milli(?) AND ip_address IS NOT NULL",
            cutoff,
        )
        .await
    }

    async fn oldest_records(&self) -> Result<OldestRecords> {
        Ok(OldestRecords {
            users: self
                .min_millis("SELECT minOrNull(toUnixTimestamp64Milli(created_at)) AS ts FROM users")
                .await?,
            sessions: self
                .min_millis("SELECT minOrNull(toUnixTimestamp64Milli(first_seen)) AS ts FROM sessions FINAL")
                .await?,
            events: self
                .min_millis("SELECT minOrNull(toUnixTimestamp64Milli(server_timestamp)) AS ts FROM events")
                .await?,
        })
    }

    async fn ping(&self) -> bool {
        check_connection(&self.client).await
    }
}
