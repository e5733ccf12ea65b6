//! IP geolocation with an in-memory cache.
//!
//! Lookups never fail from the caller's point of view: local addresses get
//! the development profile and every lookup problem yields the fallback
//! profile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use analytics_core::location::estimate_accuracy;
use analytics_core::{
    is_local_address, ConnectionType, Error, GeoHints, LocationProfile, LocationSource, Result,
};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use telemetry::{health, metrics};
use tracing::{debug, warn};

/// Fields requested from ip-api.
const IP_API_FIELDS: &str =
    "status,message,country,countryCode,region,regionName,city,zip,lat,lon,timezone,isp,org,as,mobile,proxy,hosting";

const USER_AGENT: &str = "funnel-analytics geolocation";

/// Geolocation settings, the `geolocation` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_base_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Source of IP location data.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Look up a public IP. Errors cover transport failures and
    /// non-success answers alike.
    async fn lookup(&self, ip: &str) -> Result<LocationProfile>;
}

/// ip-api.com JSON answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpApiResponse {
    pub status: String,
    pub message: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    #[serde(rename = "as")]
    pub as_number: Option<String>,
    #[serde(default)]
    pub mobile: bool,
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub hosting: bool,
}

fn text_or(value: &Option<String>, missing: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(missing)
        .to_string()
}

impl IpApiResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Map a successful answer into a profile.
    pub fn into_profile(self) -> LocationProfile {
        let organization = text_or(&self.org, "Organization Not Available");

        LocationProfile {
            country: text_or(&self.country, "Country Not Available"),
            country_code: text_or(&self.country_code, "XX"),
            region: text_or(&self.region, "Region Not Available"),
            region_name: text_or(&self.region_name, "Region Name Not Available"),
            city: text_or(&self.city, "City Not Available"),
            postal_code: text_or(&self.zip, ""),
            latitude: self.lat,
            longitude: self.lon,
            timezone: text_or(&self.timezone, "UTC"),
            isp: text_or(&self.isp, "ISP Not Available"),
            as_number: text_or(&self.as_number, "AS Not Available"),
            connection_type: ConnectionType::classify(
                self.mobile,
                self.proxy,
                self.hosting,
                &organization,
            ),
            organization,
            is_mobile: self.mobile,
            is_proxy: self.proxy,
            is_hosting: self.hosting,
            accuracy_radius: estimate_accuracy(
                self.city.as_deref(),
                self.zip.as_deref(),
                self.region_name.as_deref(),
            ),
            location_source: LocationSource::IpApi,
        }
    }
}

/// ip-api.com client.
#[derive(Clone)]
pub struct IpApiProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl IpApiProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn lookup(&self, ip: &str) -> Result<LocationProfile> {
        let url = format!("{}/{}", self.base_url, ip);
        debug!(url = %url, "Calling ip-api");

        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", IP_API_FIELDS)])
            .send()
            .await
            .map_err(|e| Error::geolocation(format!("ip-api request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::geolocation(format!(
                "ip-api returned {}",
                response.status()
            )));
        }

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| Error::geolocation(format!("Invalid ip-api response: {}", e)))?;

        if !body.is_success() {
            return Err(Error::geolocation(format!(
                "ip-api status {}: {}",
                body.status,
                body.message.as_deref().unwrap_or("no message")
            )));
        }

        Ok(body.into_profile())
    }
}

/// Resolves IPs to location profiles, caching answers per IP.
#[derive(Clone)]
pub struct GeolocationService {
    provider: Arc<dyn GeoProvider>,
    cache: Cache<String, LocationProfile>,
    local_timezone: String,
}

impl GeolocationService {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        config: &GeolocationConfig,
        local_timezone: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build(),
            local_timezone: local_timezone.into(),
        }
    }

    /// Service backed by ip-api with the configured timeout.
    pub fn from_config(config: &GeolocationConfig, local_timezone: impl Into<String>) -> Result<Self> {
        let provider = IpApiProvider::new(
            config.base_url.clone(),
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(Self::new(Arc::new(provider), config, local_timezone))
    }

    /// Resolve an IP to a profile.
    ///
    /// Hints replace country and city on the development and fallback
    /// profiles only.
    pub async fn resolve(&self, ip: Option<&str>, hints: &GeoHints) -> LocationProfile {
        let Some(ip) = ip.map(str::trim).filter(|ip| is_valid_ip(ip)) else {
            return LocationProfile::lookup_failed(hints);
        };

        if is_local_address(ip) {
            return LocationProfile::local_development(hints, &self.local_timezone);
        }

        if let Some(cached) = self.cache.get(ip).await {
            metrics().geo_cache_hits.inc();
            return with_hints(cached, hints);
        }

        metrics().geo_lookups.inc();
        let start = Instant::now();
        let profile = match self.provider.lookup(ip).await {
            Ok(profile) => {
                health().geolocation.set_healthy();
                profile
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "Geolocation lookup failed, using fallback");
                metrics().geo_lookup_failures.inc();
                health().geolocation.set_unhealthy(e.to_string());
                LocationProfile::lookup_failed(&GeoHints::default())
            }
        };
        metrics().geo_latency.record(start.elapsed());

        self.cache.insert(ip.to_string(), profile.clone()).await;
        metrics().set_geo_cache_entries(self.cache.entry_count());

        with_hints(profile, hints)
    }

    /// Drop all cached profiles.
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<std::net::IpAddr>().is_ok()
}

fn with_hints(profile: LocationProfile, hints: &GeoHints) -> LocationProfile {
    if profile.location_source != LocationSource::Fallback {
        return profile;
    }
    LocationProfile {
        country: hints.country.clone().unwrap_or(profile.country),
        city: hints.city.clone().unwrap_or(profile.city),
        ..profile
    }
}
