//! Common test setup functions.

use std::sync::Arc;

use analytics_core::{DeploymentInfo, ReportingTimezone};
use analytics_store::{init_schema, AnalyticsStore, ClickHouseClient, ClickHouseStore, MemoryStore};
use api::{router, AppState, StateSettings};
use axum::Router;
use axum_test::TestServer;
use pipeline::{EventEnricher, GeolocationConfig, GeolocationService};

use crate::containers::TestContainers;
use crate::mocks::CountingGeoProvider;

pub const CLEANUP_TOKEN: &str = "test-cleanup-token";

/// Real router over an in-memory store and a counting geolocation mock.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub geo: Arc<CountingGeoProvider>,
    pub router: Router,
}

fn build_router(store: Arc<dyn AnalyticsStore>, geo: Arc<CountingGeoProvider>) -> Router {
    let geolocation = GeolocationService::new(geo, &GeolocationConfig::default(), "UTC");
    let enricher = EventEnricher::new(geolocation, DeploymentInfo::default());
    let state = AppState::new(
        store,
        enricher,
        StateSettings {
            reporting_timezone: utc(),
            cleanup_token: Some(CLEANUP_TOKEN.to_string()),
            ..Default::default()
        },
    )
    .expect("Failed to build app state");
    router(state)
}

/// Rollups bucket by UTC days so assertions do not depend on the host zone.
fn utc() -> ReportingTimezone {
    "UTC".parse().expect("UTC is a valid zone")
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let geo = Arc::new(CountingGeoProvider::new());
        let router = build_router(store.clone(), geo.clone());
        Self { store, geo, router }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Real router over ClickHouse in a container.
pub struct ClickHouseContext {
    pub containers: TestContainers,
    pub store: Arc<ClickHouseStore>,
    pub geo: Arc<CountingGeoProvider>,
    pub router: Router,
}

impl ClickHouseContext {
    pub async fn new() -> Self {
        let containers = TestContainers::start().await;

        let client = ClickHouseClient::new(containers.clickhouse.clone())
            .expect("Failed to create ClickHouse client");
        init_schema(&client).await.expect("Failed to initialize schema");

        let store = Arc::new(ClickHouseStore::new(client));
        let geo = Arc::new(CountingGeoProvider::new());
        let router = build_router(store.clone(), geo.clone());

        Self {
            containers,
            store,
            geo,
            router,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }
}
