//! Session records and the upsert merge rule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::LocationProfile;

/// Session timeout duration (30 minutes of inactivity).
pub const SESSION_TIMEOUT_MINUTES: i64 = 30;

/// One browsing visit, unique per `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,

    // IP-derived location
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
    pub user_id: Option<Uuid>,
}

/// Insert-or-update write for a session, keyed by `session_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpsert {
    pub session_id: String,
    pub seen_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub location: Option<LocationProfile>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    /// `Some(plan)` marks the session converted.
    pub conversion: Option<Option<String>>,
}

/// Link written when a signup completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConversion {
    pub user_id: Uuid,
    pub plan: String,
    pub city: String,
}

impl Session {
    /// A new session from its first write.
    pub fn from_upsert(upsert: SessionUpsert) -> Self {
        let mut session = Self {
            session_id: upsert.session_id.clone(),
            first_seen: upsert.seen_at,
            last_seen: upsert.seen_at,
            ip_address: None,
            country: None,
            city: None,
            ip_country: None,
            ip_country_code: None,
            ip_region: None,
            ip_region_name: None,
            ip_city: None,
            ip_postal_code: None,
            ip_latitude: None,
            ip_longitude: None,
            ip_timezone: None,
            ip_isp: None,
            ip_organization: None,
            ip_as_number: None,
            ip_connection_type: None,
            ip_is_mobile: None,
            ip_is_proxy: None,
            ip_is_hosting: None,
            ip_accuracy_radius: None,
            ip_location_source: None,
            user_agent: None,
            referrer: None,
            converted: false,
            conversion_plan: None,
            user_id: None,
        };
        session.apply(upsert);
        session
    }

    /// Merge a later write into this session.
    ///
    /// `last_seen` only moves forward; `first_seen` is fixed at creation.
    /// Present enrichment fields replace stored ones, absent ones keep
    /// what was stored. A conversion is never undone.
    pub fn apply(&mut self, upsert: SessionUpsert) {
        if upsert.seen_at > self.last_seen {
            self.last_seen = upsert.seen_at;
        }

        if upsert.ip_address.is_some() {
            self.ip_address = upsert.ip_address;
        }
        if upsert.country.is_some() {
            self.country = upsert.country;
        }
        if upsert.city.is_some() {
            self.city = upsert.city;
        }
        if let Some(ref location) = upsert.location {
            self.apply_location(location);
        }
        if upsert.user_agent.is_some() {
            self.user_agent = upsert.user_agent;
        }
        if upsert.referrer.is_some() {
            self.referrer = upsert.referrer;
        }
        if let Some(plan) = upsert.conversion {
            self.converted = true;
            if plan.is_some() {
                self.conversion_plan = plan;
            }
        }
    }

    /// Copy a location profile into the `ip_*` fields.
    pub fn apply_location(&mut self, location: &LocationProfile) {
        self.ip_country = Some(location.country.clone());
        self.ip_country_code = Some(location.country_code.clone());
        self.ip_region = Some(location.region.clone());
        self.ip_region_name = Some(location.region_name.clone());
        self.ip_city = Some(location.city.clone());
        self.ip_postal_code = Some(location.postal_code.clone());
        self.ip_latitude = location.latitude;
        self.ip_longitude = location.longitude;
        self.ip_timezone = Some(location.timezone.clone());
        self.ip_isp = Some(location.isp.clone());
        self.ip_organization = Some(location.organization.clone());
        self.ip_as_number = Some(location.as_number.clone());
        self.ip_connection_type = Some(location.connection_type.as_str().to_string());
        self.ip_is_mobile = Some(location.is_mobile);
        self.ip_is_proxy = Some(location.is_proxy);
        self.ip_is_hosting = Some(location.is_hosting);
        self.ip_accuracy_radius = Some(location.accuracy_radius);
        self.ip_location_source = Some(location.location_source.as_str().to_string());
    }

    /// Record the signup that converted this session.
    pub fn convert(&mut self, conversion: &SessionConversion) {
        self.user_id = Some(conversion.user_id);
        self.converted = true;
        self.conversion_plan = Some(conversion.plan.clone());
        self.city = Some(conversion.city.clone());
    }

    /// City used for filtering: the reported city, else the IP city.
    pub fn effective_city(&self) -> Option<&str> {
        self.city.as_deref().or(self.ip_city.as_deref())
    }

    /// Whether `at` falls inside this session's activity window, extended
    /// by the inactivity timeout.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        let timeout = Duration::minutes(SESSION_TIMEOUT_MINUTES);
        at >= self.first_seen && at <= self.last_seen + timeout
    }

    /// Returns the session duration.
    pub fn duration(&self) -> Duration {
        self.last_seen - self.first_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{GeoHints, LocationProfile};

    fn upsert(session_id: &str, seen_at: DateTime<Utc>) -> SessionUpsert {
        SessionUpsert {
            session_id: session_id.into(),
            seen_at,
            ip_address: Some("8.8.8.8".into()),
            country: None,
            city: None,
            location: None,
            user_agent: Some("Mozilla/5.0".into()),
            referrer: None,
            conversion: None,
        }
    }

    #[test]
    fn test_last_seen_only_moves_forward() {
        let t0 = Utc::now();
        let mut session = Session::from_upsert(upsert("s1", t0));

        session.apply(upsert("s1", t0 + Duration::minutes(5)));
        assert_eq!(session.first_seen, t0);
        assert_eq!(session.last_seen, t0 + Duration::minutes(5));

        session.apply(upsert("s1", t0 + Duration::minutes(1)));
        assert_eq!(session.last_seen, t0 + Duration::minutes(5));
        assert_eq!(session.duration(), Duration::minutes(5));
    }

    #[test]
    fn test_absent_fields_keep_stored_values() {
        let t0 = Utc::now();
        let mut session = Session::from_upsert(upsert("s1", t0));

        let mut later = upsert("s1", t0);
        later.ip_address = None;
        later.user_agent = None;
        session.apply(later);

        assert_eq!(session.ip_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(session.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_conversion_is_sticky() {
        let t0 = Utc::now();
        let mut first = upsert("s1", t0);
        first.conversion = Some(Some("annual".into()));
        let mut session = Session::from_upsert(first);
        assert!(session.converted);

        session.apply(upsert("s1", t0 + Duration::minutes(1)));
        assert!(session.converted);
        assert_eq!(session.conversion_plan.as_deref(), Some("annual"));
    }

    #[test]
    fn test_location_fills_ip_fields() {
        let mut write = upsert("s1", Utc::now());
        write.location = Some(LocationProfile::lookup_failed(&GeoHints::default()));
        let session = Session::from_upsert(write);

        assert_eq!(session.ip_country.as_deref(), Some("Geo Detection Failed"));
        assert_eq!(session.ip_location_source.as_deref(), Some("fallback"));
        assert_eq!(session.effective_city(), Some("City Detection Failed"));
    }

    #[test]
    fn test_covers_includes_timeout_window() {
        let t0 = Utc::now();
        let mut session = Session::from_upsert(upsert("s1", t0));
        session.apply(upsert("s1", t0 + Duration::minutes(10)));

        assert!(session.covers(t0 + Duration::minutes(5)));
        assert!(session.covers(t0 + Duration::minutes(39)));
        assert!(!session.covers(t0 + Duration::minutes(41)));
        assert!(!session.covers(t0 - Duration::minutes(1)));
    }
}
