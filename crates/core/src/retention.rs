//! Retention policy definitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default event retention (6 months of 30 days).
pub const DEFAULT_EVENT_RETENTION_DAYS: u32 = 6 * 30;

/// Default session retention (1 year).
pub const DEFAULT_SESSION_RETENTION_DAYS: u32 = 365;

/// Default age at which IP addresses are nulled (3 months of 30 days).
pub const DEFAULT_IP_ANONYMIZATION_DAYS: u32 = 3 * 30;

/// Longest configurable threshold (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Age thresholds for the cleanup sweep. Users are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: u32,
    #[serde(default = "default_session_retention_days")]
    pub session_retention_days: u32,
    #[serde(default = "default_ip_anonymization_days")]
    pub ip_anonymization_days: u32,
}

fn default_event_retention_days() -> u32 {
    DEFAULT_EVENT_RETENTION_DAYS
}

fn default_session_retention_days() -> u32 {
    DEFAULT_SESSION_RETENTION_DAYS
}

fn default_ip_anonymization_days() -> u32 {
    DEFAULT_IP_ANONYMIZATION_DAYS
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            event_retention_days: DEFAULT_EVENT_RETENTION_DAYS,
            session_retention_days: DEFAULT_SESSION_RETENTION_DAYS,
            ip_anonymization_days: DEFAULT_IP_ANONYMIZATION_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Check that IPs are stripped before any row becomes deletable.
    pub fn validate(&self) -> Result<()> {
        if self.ip_anonymization_days == 0 {
            return Err(Error::config("ip_anonymization_days must be positive"));
        }
        let longest = self.event_retention_days.max(self.session_retention_days);
        if longest > MAX_RETENTION_DAYS {
            return Err(Error::config(format!(
                "retention of {} days exceeds the {} day limit",
                longest, MAX_RETENTION_DAYS
            )));
        }
        if self.ip_anonymization_days >= self.event_retention_days
            || self.ip_anonymization_days >= self.session_retention_days
        {
            return Err(Error::config(format!(
                "ip_anonymization_days ({}) must be shorter than event ({}) and session ({}) retention",
                self.ip_anonymization_days, self.event_retention_days, self.session_retention_days
            )));
        }
        Ok(())
    }

    /// Cutoff instants relative to `now`, clamped to the earliest
    /// representable instant.
    pub fn cutoffs(&self, now: DateTime<Utc>) -> RetentionCutoffs {
        let before = |days: u32| {
            now.checked_sub_signed(Duration::days(i64::from(days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        RetentionCutoffs {
            events_before: before(self.event_retention_days),
            sessions_before: before(self.session_retention_days),
            anonymize_before: before(self.ip_anonymization_days),
        }
    }

    /// Human readable policy for the cleanup endpoint.
    pub fn describe(&self) -> PolicyDescription {
        PolicyDescription {
            users: "Kept forever (business records)".to_string(),
            sessions: format!("Deleted after {}", describe_days(self.session_retention_days)),
            events: format!("Deleted after {}", describe_days(self.event_retention_days)),
            ip_addresses: format!("Anonymized after {}", describe_days(self.ip_anonymization_days)),
        }
    }
}

fn describe_days(days: u32) -> String {
    match days {
        365 => "1 year".to_string(),
        d if d % 365 == 0 => format!("{} years", d / 365),
        30 => "1 month".to_string(),
        d if d % 30 == 0 => format!("{} months", d / 30),
        d => format!("{} days", d),
    }
}

/// Rows strictly older than these instants are affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoffs {
    pub events_before: DateTime<Utc>,
    pub sessions_before: DateTime<Utc>,
    pub anonymize_before: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescription {
    pub users: String,
    pub sessions: String,
    pub events: String,
    pub ip_addresses: String,
}

/// Oldest record still stored per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldestRecords {
    pub users: Option<DateTime<Utc>>,
    pub sessions: Option<DateTime<Utc>>,
    pub events: Option<DateTime<Utc>>,
}

/// Outcome of one cleanup sweep.
///
/// A failed step counts 0 and leaves a message in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub events_deleted: u64,
    pub sessions_deleted: u64,
    pub ip_addresses_anonymized: u64,
    pub oldest_remaining: OldestRecords,
    pub errors: Vec<String>,
    pub cleanup_date: DateTime<Utc>,
}

impl CleanupStats {
    pub fn new(cleanup_date: DateTime<Utc>) -> Self {
        Self {
            events_deleted: 0,
            sessions_deleted: 0,
            ip_addresses_anonymized: 0,
            oldest_remaining: OldestRecords::default(),
            errors: Vec::new(),
            cleanup_date,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid_and_ordered() {
        let policy = RetentionPolicy::default();
        assert!(policy.validate().is_ok());

        let now = Utc::now();
        let cutoffs = policy.cutoffs(now);
        assert!(cutoffs.anonymize_before > cutoffs.events_before);
        assert!(cutoffs.events_before > cutoffs.sessions_before);
        assert_eq!(now - cutoffs.events_before, Duration::days(180));
    }

    #[test]
    fn test_policy_rejects_late_anonymization() {
        let policy = RetentionPolicy {
            event_retention_days: 60,
            session_retention_days: 365,
            ip_anonymization_days: 90,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_unbounded_retention() {
        let policy = RetentionPolicy {
            event_retention_days: u32::MAX,
            session_retention_days: 365,
            ip_anonymization_days: 90,
        };
        assert!(policy.validate().is_err());

        // Unvalidated values still produce cutoffs instead of panicking.
        let cutoffs = policy.cutoffs(Utc::now());
        assert!(cutoffs.events_before < cutoffs.sessions_before);
    }

    #[test]
    fn test_policy_description() {
        let text = RetentionPolicy::default().describe();
        assert_eq!(text.users, "Kept forever (business records)");
        assert_eq!(text.sessions, "Deleted after 1 year");
        assert_eq!(text.events, "Deleted after 6 months");
        assert_eq!(text.ip_addresses, "Anonymized after 3 months");
    }
}
