//! IP-derived location profiles.
//!
//! A [`LocationProfile`] is always produced for an ingested event. When the
//! external lookup is skipped or fails, one of two placeholder profiles is
//! used so dashboards can tell local development traffic apart from failed
//! lookups.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Organization names that indicate a business connection.
static BUSINESS_ORG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)business").expect("valid regex"));

pub const NOT_AVAILABLE_LOCATION: &str = "Location Not Available";

/// Values that mean "we don't know" and are skipped in display strings.
const PLACEHOLDER_VALUES: &[&str] = &[
    "Country Not Available",
    "Region Not Available",
    "Region Name Not Available",
    "City Not Available",
    "Geo Detection Failed",
    "Region Detection Failed",
    "City Detection Failed",
    "Unknown",
];

/// How the client reaches the internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Mobile,
    Proxy,
    Hosting,
    Business,
    Residential,
    Development,
    Unknown,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Proxy => "proxy",
            Self::Hosting => "hosting",
            Self::Business => "business",
            Self::Residential => "residential",
            Self::Development => "development",
            Self::Unknown => "unknown",
        }
    }

    /// Classify by priority: mobile, proxy, hosting, business org, residential.
    pub fn classify(mobile: bool, proxy: bool, hosting: bool, organization: &str) -> Self {
        if mobile {
            Self::Mobile
        } else if proxy {
            Self::Proxy
        } else if hosting {
            Self::Hosting
        } else if BUSINESS_ORG.is_match(organization) {
            Self::Business
        } else {
            Self::Residential
        }
    }
}

/// Where a profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationSource {
    #[serde(rename = "ip-api")]
    IpApi,
    #[serde(rename = "fallback")]
    Fallback,
    #[serde(rename = "localhost")]
    Localhost,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpApi => "ip-api",
            Self::Fallback => "fallback",
            Self::Localhost => "localhost",
        }
    }
}

/// Coarse location supplied by the hosting platform, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoHints {
    pub country: Option<String>,
    pub city: Option<String>,
}

impl GeoHints {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.city.is_none()
    }
}

/// Canonical location and connection profile for an IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationProfile {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub postal_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: String,
    pub isp: String,
    pub organization: String,
    pub as_number: String,
    pub connection_type: ConnectionType,
    pub is_mobile: bool,
    pub is_proxy: bool,
    pub is_hosting: bool,
    /// Relative confidence radius; smaller is more precise.
    pub accuracy_radius: u32,
    pub location_source: LocationSource,
}

impl LocationProfile {
    /// Profile for loopback and private-range addresses.
    pub fn local_development(hints: &GeoHints, timezone: &str) -> Self {
        Self {
            country: hints
                .country
                .clone()
                .unwrap_or_else(|| "Local Development".to_string()),
            country_code: "DEV".to_string(),
            region: "Local Network".to_string(),
            region_name: "Development Environment".to_string(),
            city: hints.city.clone().unwrap_or_else(|| "localhost".to_string()),
            postal_code: String::new(),
            latitude: None,
            longitude: None,
            timezone: timezone.to_string(),
            isp: "Local Network".to_string(),
            organization: "Development Machine".to_string(),
            as_number: "Local AS".to_string(),
            connection_type: ConnectionType::Development,
            is_mobile: false,
            is_proxy: false,
            is_hosting: true,
            accuracy_radius: 0,
            location_source: LocationSource::Localhost,
        }
    }

    /// Profile for public addresses whose lookup failed.
    pub fn lookup_failed(hints: &GeoHints) -> Self {
        Self {
            country: hints
                .country
                .clone()
                .unwrap_or_else(|| "Geo Detection Failed".to_string()),
            country_code: "XX".to_string(),
            region: "Region Detection Failed".to_string(),
            region_name: "Region Detection Failed".to_string(),
            city: hints
                .city
                .clone()
                .unwrap_or_else(|| "City Detection Failed".to_string()),
            postal_code: "Postal Code Unknown".to_string(),
            latitude: None,
            longitude: None,
            timezone: "UTC".to_string(),
            isp: "ISP Detection Failed".to_string(),
            organization: "Organization Unknown".to_string(),
            as_number: "AS Detection Failed".to_string(),
            connection_type: ConnectionType::Unknown,
            is_mobile: false,
            is_proxy: false,
            is_hosting: false,
            accuracy_radius: 1000,
            location_source: LocationSource::Fallback,
        }
    }

    /// Human readable "City, Region, Country", skipping unknown parts.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region_name, &self.country]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && !is_placeholder(s))
            .collect();

        if parts.is_empty() {
            NOT_AVAILABLE_LOCATION.to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Dashboard-ready summary of this profile.
    pub fn summary(&self) -> LocationSummary {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => format!("{:.4}, {:.4}", lat, lon),
            _ => "Coordinates unavailable".to_string(),
        };

        LocationSummary {
            display: self.display_name(),
            details: format!("{} • {}", self.timezone, self.isp),
            coordinates,
            connection: self.connection_type.as_str().to_string(),
        }
    }
}

/// Display strings derived from a [`LocationProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub display: String,
    pub details: String,
    pub coordinates: String,
    pub connection: String,
}

/// Whether a location value is one of the "unknown" placeholders.
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_VALUES.contains(&value.trim())
}

/// Accuracy heuristic: city+postal 5, city 25, region 100, otherwise 1000.
pub fn estimate_accuracy(city: Option<&str>, postal_code: Option<&str>, region: Option<&str>) -> u32 {
    let known = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());

    match (known(city), known(postal_code), known(region)) {
        (true, true, _) => 5,
        (true, false, _) => 25,
        (false, _, true) => 100,
        _ => 1000,
    }
}

/// Whether an address is loopback, private, link-local or unique-local.
///
/// Unparseable input is not considered local.
pub fn is_local_address(ip: &str) -> bool {
    let Ok(addr) = ip.trim().parse::<IpAddr>() else {
        return false;
    };

    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return mapped.is_loopback() || mapped.is_private() || mapped.is_link_local();
            }
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
