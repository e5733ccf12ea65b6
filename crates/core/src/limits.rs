//! Size, time and volume limits for the analytics pipeline.
//!
//! Field lengths are checked by `RawEvent::check` so an oversized field
//! reports VALID_002 rather than a generic validation failure.

// === Payload Limits ===

/// Maximum ingestion request body in bytes (64KB).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Maximum serialized `properties` size in bytes (16KB).
pub const MAX_EVENT_DATA_BYTES: usize = 16 * 1024;

// === String Field Limits (chars) ===

/// Event name max length.
pub const MAX_EVENT_NAME_LEN: usize = 64;

/// Session and visitor identifier max length.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Page URL max length.
pub const MAX_URL_LEN: usize = 2048;

/// User agent string max length.
/// Browser UAs: 100-300 typical, 500+ with extensions.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Referrer URL max length.
/// Matches HTTP Referer header limit.
pub const MAX_REFERRER_LEN: usize = 2048;

/// IP address max length (IPv6 = 45 chars).
pub const MAX_IP_LEN: usize = 45;

// === Timestamp Bounds ===

/// Client timestamps further in the future than this are not trusted for
/// session activity (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;

/// Client timestamps older than this are not trusted for session
/// activity (hours).
pub const MAX_EVENT_AGE_HOURS: i64 = 24;

// === Query Limits ===

/// Maximum events returned by a single export.
pub const MAX_EXPORT_EVENTS: usize = 10_000;

/// Number of days kept in a daily rollup.
pub const MAX_DAILY_METRICS: usize = 30;

/// Number of users listed in the dashboard snapshot.
pub const RECENT_USERS_LIMIT: usize = 10;
