//! ClickHouse table schemas.
//!
//! - DateTime64(3) for millisecond precision
//! - `event_data` kept as a JSON string
//! - sessions are a ReplacingMergeTree keyed by `session_id`; reads use FINAL

/// SQL for creating the analytics database.
pub const CREATE_DATABASE: &str = "CREATE DATABASE IF NOT EXISTS {db}";

/// Append-only event log.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    session_id String,
    visitor_id Nullable(String),
    event_type LowCardinality(String),
    event_data String,
    timestamp DateTime64(3),
    server_timestamp DateTime64(3),
    user_agent String,
    url String,
    referrer Nullable(String),
    ip_address Nullable(String),
    deployment_id LowCardinality(String),
    git_commit LowCardinality(String)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(server_timestamp)
ORDER BY (server_timestamp, session_id)
SETTINGS index_granularity = 8192
"#;

/// One row per session; the highest `version` wins on merge.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id String,
    first_seen DateTime64(3),
    last_seen DateTime64(3),
    ip_address Nullable(String),
    country Nullable(String),
    city Nullable(String),

    ip_country Nullable(String),
    ip_country_code Nullable(String),
    ip_region Nullable(String),
    ip_region_name Nullable(String),
    ip_city Nullable(String),
    ip_postal_code Nullable(String),
    ip_latitude Nullable(Float64),
    ip_longitude Nullable(Float64),
    ip_timezone Nullable(String),
    ip_isp Nullable(String),
    ip_organization Nullable(String),
    ip_as_number Nullable(String),
    ip_connection_type Nullable(String),
    ip_is_mobile Nullable(Bool),
    ip_is_proxy Nullable(Bool),
    ip_is_hosting Nullable(Bool),
    ip_accuracy_radius Nullable(UInt32),
    ip_location_source Nullable(String),

    user_agent Nullable(String),
    referrer Nullable(String),
    converted Bool,
    conversion_plan Nullable(String),
    user_id Nullable(String),

    version UInt64
)
ENGINE = ReplacingMergeTree(version)
ORDER BY session_id
SETTINGS index_granularity = 8192
"#;

/// Signups. Never touched by retention.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id String,
    name String,
    email String,
    city String,
    selected_plan LowCardinality(String),
    signup_source Nullable(String),
    created_at DateTime64(3)
)
ENGINE = MergeTree()
ORDER BY (created_at, id)
SETTINGS index_granularity = 8192
"#;

/// Table DDL keyed by table name, in creation order.
pub fn all_tables() -> [(&'static str, &'static str); 3] {
    [
        (tables::EVENTS, CREATE_EVENTS_TABLE),
        (tables::SESSIONS, CREATE_SESSIONS_TABLE),
        (tables::USERS, CREATE_USERS_TABLE),
    ]
}

/// Table names (for queries).
pub mod tables {
    pub const EVENTS: &str = "events";
    pub const SESSIONS: &str = "sessions";
    pub const USERS: &str = "users";
}
