//! Data export as JSON or single-table CSV.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use analytics_core::limits::MAX_EXPORT_EVENTS;
use analytics_core::{DailyMetric, DateWindow, Error, EventRecord, Result, Session, User};
use analytics_store::{AnalyticsStore, QueryFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::reporting::ReportingService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::validation(format!(
                "unknown format {:?}, expected json or csv",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportTable {
    Users,
    Sessions,
    Events,
    Summary,
    Journey,
    #[default]
    All,
}

impl ExportTable {
    /// Tables that can be exported one at a time.
    pub const SINGLE: [ExportTable; 5] = [
        Self::Users,
        Self::Sessions,
        Self::Events,
        Self::Summary,
        Self::Journey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Sessions => "sessions",
            Self::Events => "events",
            Self::Summary => "summary",
            Self::Journey => "journey",
            Self::All => "all",
        }
    }

    fn includes(&self, table: ExportTable) -> bool {
        *self == Self::All || *self == table
    }
}

impl fmt::Display for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "users" => Ok(Self::Users),
            "sessions" => Ok(Self::Sessions),
            "events" => Ok(Self::Events),
            "summary" => Ok(Self::Summary),
            "journey" => Ok(Self::Journey),
            "all" => Ok(Self::All),
            other => Err(Error::validation(format!("unknown table {:?}", other))),
        }
    }
}

/// A user with the sessions linked to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJourney {
    #[serde(flatten)]
    pub user: User,
    pub sessions: Vec<Session>,
}

/// Exported tables. Only requested tables are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<Session>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Vec<DailyMetric>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey: Option<Vec<UserJourney>>,
}

impl ExportData {
    pub fn record_counts(&self) -> RecordCounts {
        fn len<T>(rows: &Option<Vec<T>>) -> usize {
            rows.as_ref().map_or(0, Vec::len)
        }

        RecordCounts {
            users: len(&self.users),
            sessions: len(&self.sessions),
            events: len(&self.events),
            summary: len(&self.summary),
            journey: len(&self.journey),
        }
    }

    /// Rows of one table as JSON objects, for CSV output.
    pub fn rows(&self, table: ExportTable) -> Result<Vec<Value>> {
        fn to_rows<T: Serialize>(rows: &Option<Vec<T>>) -> Result<Vec<Value>> {
            rows.iter()
                .flatten()
                .map(|row| serde_json::to_value(row).map_err(Error::from))
                .collect()
        }

        match table {
            ExportTable::Users => to_rows(&self.users),
            ExportTable::Sessions => to_rows(&self.sessions),
            ExportTable::Events => to_rows(&self.events),
            ExportTable::Summary => to_rows(&self.summary),
            ExportTable::Journey => to_rows(&self.journey),
            ExportTable::All => Err(Error::validation("CSV export needs a single table")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub users: usize,
    pub sessions: usize,
    pub events: usize,
    pub summary: usize,
    pub journey: usize,
}

/// `{start, end}` with open bounds shown as `"all_time"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeLabel {
    pub start: String,
    pub end: String,
}

impl From<&DateWindow> for DateRangeLabel {
    fn from(window: &DateWindow) -> Self {
        let label = |d: Option<chrono::NaiveDate>| {
            d.map_or_else(|| "all_time".to_string(), |d| d.to_string())
        };
        Self {
            start: label(window.start),
            end: label(window.end),
        }
    }
}

/// JSON export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub date_range: DateRangeLabel,
    pub record_counts: RecordCounts,
    pub data: ExportData,
}

/// Reads tables for export.
#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn AnalyticsStore>,
    reporting: ReportingService,
}

impl ExportService {
    pub fn new(store: Arc<dyn AnalyticsStore>, reporting: ReportingService) -> Self {
        Self { store, reporting }
    }

    /// Fetch the requested tables. The window applies to each table by its
    /// own time column.
    pub async fn collect(&self, table: ExportTable, window: &DateWindow) -> Result<ExportData> {
        let filter = QueryFilter::in_range(window.to_range(self.reporting.timezone()));
        let mut data = ExportData::default();

        if table.includes(ExportTable::Users) || table.includes(ExportTable::Journey) {
            let users = self.store.query_users(&filter).await?;

            if table.includes(ExportTable::Journey) {
                data.journey = Some(self.journeys(&users).await?);
            }
            if table.includes(ExportTable::Users) {
                data.users = Some(users);
            }
        }

        if table.includes(ExportTable::Sessions) {
            data.sessions = Some(self.store.query_sessions(&filter).await?);
        }

        if table.includes(ExportTable::Events) {
            let events = filter.clone().with_limit(MAX_EXPORT_EVENTS);
            data.events = Some(self.store.query_events(&events).await?);
        }

        if table.includes(ExportTable::Summary) {
            data.summary = Some(self.reporting.daily_metrics(window, None).await?);
        }

        info!(table = %table, counts = ?data.record_counts(), "Export collected");
        Ok(data)
    }

    /// JSON export document.
    pub async fn document(&self, table: ExportTable, window: &DateWindow) -> Result<ExportDocument> {
        let data = self.collect(table, window).await?;
        Ok(ExportDocument {
            exported_at: Utc::now(),
            date_range: DateRangeLabel::from(window),
            record_counts: data.record_counts(),
            data,
        })
    }

    /// CSV for a single table.
    pub async fn csv(&self, table: ExportTable, window: &DateWindow) -> Result<String> {
        let data = self.collect(table, window).await?;
        Ok(to_csv(&data.rows(table)?))
    }

    async fn journeys(&self, users: &[User]) -> Result<Vec<UserJourney>> {
        let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
        let sessions = self.store.sessions_by_user_ids(&ids).await?;

        Ok(users
            .iter()
            .map(|user| UserJourney {
                user: user.clone(),
                sessions: sessions
                    .iter()
                    .filter(|s| s.user_id == Some(user.id))
                    .cloned()
                    .collect(),
            })
            .collect())
    }
}

/// Render JSON objects as CSV.
///
/// The header comes from the first row's keys. Empty input renders as an
/// empty string.
pub fn to_csv(rows: &[Value]) -> String {
    let Some(Value::Object(first)) = rows.first() else {
        return String::new();
    };
    let headers: Vec<&String> = first.keys().collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_csv(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in rows {
        let line = headers
            .iter()
            .map(|h| csv_field(row.get(h.as_str())))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }

    lines.join("\n")
}

fn csv_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => escape_csv(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => escape_csv(&nested.to_string()),
    }
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_core::{ReportingTimezone, SelectedPlan, SessionConversion, SessionUpsert};
    use analytics_store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_csv_quotes_and_nulls() {
        let rows = vec![
            json!({"n": 3, "name": "Smith, Jo", "note": "say \"hi\"", "plan": null}),
            json!({"n": 1, "name": "Lee", "note": "line\nbreak", "plan": "free"}),
        ];
        let csv = to_csv(&rows);
        let lines: Vec<&str> = csv.splitn(2, '\n').collect();

        assert_eq!(lines[0], "n,name,note,plan");
        assert_eq!(
            lines[1],
            "3,\"Smith, Jo\",\"say \"\"hi\"\"\",\n1,Lee,\"line\nbreak\",free"
        );
    }

    #[test]
    fn test_csv_nested_values_are_compact_json() {
        let rows = vec![json!({"data": {"plan": "annual"}})];
        assert_eq!(to_csv(&rows), "data\n\"{\"\"plan\"\":\"\"annual\"\"}\"");
    }

    #[test]
    fn test_empty_csv() {
        assert_eq!(to_csv(&[]), "");
    }

    #[test]
    fn test_parse_format_and_table() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!("journey".parse::<ExportTable>().unwrap(), ExportTable::Journey);
        assert!("orders".parse::<ExportTable>().is_err());
    }

    #[tokio::test]
    async fn test_window_applies_to_every_table() {
        let store = Arc::new(MemoryStore::new());
        let inside = Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        for (id, at) in [("in", inside), ("out", outside)] {
            store
                .upsert_session(SessionUpsert {
                    session_id: id.into(),
                    seen_at: at,
                    ip_address: None,
                    country: None,
                    city: None,
                    location: None,
                    user_agent: None,
                    referrer: None,
                    conversion: None,
                })
                .await
                .unwrap();
            store.put_user(User {
                id: Uuid::new_v4(),
                name: id.into(),
                email: format!("{}@example.com", id),
                city: "Miami".into(),
                selected_plan: SelectedPlan::Free,
                signup_source: None,
                created_at: at,
            });
        }

        let reporting = ReportingService::new(store.clone(), ReportingTimezone::Local);
        let export = ExportService::new(store, reporting);
        let window = DateWindow::parse(Some("2026-06-01"), Some("2026-06-30")).unwrap();

        let data = export.collect(ExportTable::All, &window).await.unwrap();
        let counts = data.record_counts();
        assert_eq!(counts.users, 1);
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.journey, 1);
        assert_eq!(counts.summary, 1);
    }

    #[tokio::test]
    async fn test_journey_lists_linked_sessions() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(analytics_core::NewUser {
                name: "Ana".into(),
                email: "ana@example.com".into(),
                city: "Quito".into(),
                selected_plan: SelectedPlan::Annual,
                signup_source: None,
            })
            .await
            .unwrap();
        store
            .upsert_session(SessionUpsert {
                session_id: "s1".into(),
                seen_at: Utc::now(),
                ip_address: None,
                country: None,
                city: None,
                location: None,
                user_agent: None,
                referrer: None,
                conversion: None,
            })
            .await
            .unwrap();
        store
            .link_user_to_session(
                "s1",
                SessionConversion {
                    user_id: user.id,
                    plan: "annual".into(),
                    city: "Quito".into(),
                },
            )
            .await
            .unwrap();

        let reporting = ReportingService::new(store.clone(), ReportingTimezone::Local);
        let export = ExportService::new(store, reporting);
        let data = export
            .collect(ExportTable::Journey, &DateWindow::default())
            .await
            .unwrap();

        let journey = data.journey.unwrap();
        assert_eq!(journey.len(), 1);
        assert_eq!(journey[0].sessions[0].session_id, "s1");
        assert!(data.users.is_none());

        let json = serde_json::to_value(&journey[0]).unwrap();
        assert_eq!(json["name"], "Ana");
        assert_eq!(json["sessions"][0]["session_id"], "s1");
    }
}
