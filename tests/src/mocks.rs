//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use analytics_core::{ConnectionType, Error, LocationProfile, LocationSource, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline::GeoProvider;

/// Geolocation provider that answers from a fixed table and counts calls.
#[derive(Default)]
pub struct CountingGeoProvider {
    profiles: Mutex<HashMap<String, LocationProfile>>,
    calls: AtomicUsize,
    should_fail: AtomicBool,
}

impl CountingGeoProvider {
    /// Provider that knows `8.8.8.8` as Mountain View, US.
    pub fn new() -> Self {
        let provider = Self::default();
        provider.insert("8.8.8.8", profile("Mountain View", "California", "United States", "US"));
        provider
    }

    pub fn insert(&self, ip: &str, profile: LocationProfile) {
        self.profiles.lock().insert(ip.to_string(), profile);
    }

    /// Number of lookups that reached the provider.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeoProvider for CountingGeoProvider {
    async fn lookup(&self, ip: &str) -> Result<LocationProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::geolocation("mock provider failure"));
        }

        self.profiles
            .lock()
            .get(ip)
            .cloned()
            .ok_or_else(|| Error::geolocation(format!("no mock profile for {}", ip)))
    }
}

/// API-sourced profile for a city.
pub fn profile(city: &str, region: &str, country: &str, country_code: &str) -> LocationProfile {
    LocationProfile {
        country: country.to_string(),
        country_code: country_code.to_string(),
        region: region.chars().take(2).collect::<String>().to_uppercase(),
        region_name: region.to_string(),
        city: city.to_string(),
        postal_code: "94043".to_string(),
        latitude: Some(37.4),
        longitude: Some(-122.1),
        timezone: "America/Los_Angeles".to_string(),
        isp: "Example ISP".to_string(),
        organization: "Example Org".to_string(),
        as_number: "AS15169".to_string(),
        connection_type: ConnectionType::Residential,
        is_mobile: false,
        is_proxy: false,
        is_hosting: false,
        accuracy_radius: 10,
        location_source: LocationSource::IpApi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_provider() {
        let provider = CountingGeoProvider::new();

        let found = provider.lookup("8.8.8.8").await.unwrap();
        assert_eq!(found.city, "Mountain View");
        assert!(provider.lookup("1.1.1.1").await.is_err());

        provider.set_should_fail(true);
        assert!(provider.lookup("8.8.8.8").await.is_err());
        assert_eq!(provider.calls(), 3);
    }
}
