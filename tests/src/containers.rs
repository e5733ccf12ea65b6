//! ClickHouse for the store-backed suites.

use std::time::{Duration, Instant};

use analytics_store::ClickHouseConfig;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const IMAGE: &str = "clickhouse/clickhouse-server";
const TAG: &str = "24.3";
const HTTP_PORT: u16 = 8123;
const TEST_DATABASE: &str = "analytics_test";

/// A ClickHouse server for one test, either a container we own or an
/// external server named by `ANALYTICS_TEST_CLICKHOUSE_URL`.
pub struct TestContainers {
    // Dropping the handle stops the container.
    _container: Option<ContainerAsync<GenericImage>>,
    pub clickhouse: ClickHouseConfig,
}

impl TestContainers {
    pub async fn start() -> Self {
        if let Some(clickhouse) = external_clickhouse() {
            return Self {
                _container: None,
                clickhouse,
            };
        }

        let container = GenericImage::new(IMAGE, TAG)
            .with_wait_for(WaitFor::seconds(5))
            .with_exposed_port(HTTP_PORT.tcp())
            .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
            .with_env_var("CLICKHOUSE_USER", "default")
            .with_env_var("CLICKHOUSE_PASSWORD", "")
            .start()
            .await
            .expect("ClickHouse container failed to start");

        let port = container
            .get_host_port_ipv4(HTTP_PORT)
            .await
            .expect("ClickHouse HTTP port not mapped");
        let url = format!("http://127.0.0.1:{port}");
        wait_until_ping(&url, Duration::from_secs(30)).await;

        Self {
            _container: Some(container),
            clickhouse: ClickHouseConfig {
                url,
                database: TEST_DATABASE.to_string(),
                username: Some("default".to_string()),
                password: None,
            },
        }
    }
}

fn external_clickhouse() -> Option<ClickHouseConfig> {
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    Some(ClickHouseConfig {
        url: env("ANALYTICS_TEST_CLICKHOUSE_URL")?,
        database: env("ANALYTICS_TEST_CLICKHOUSE_DB").unwrap_or_else(|| TEST_DATABASE.to_string()),
        username: env("ANALYTICS_TEST_CLICKHOUSE_USER"),
        password: env("ANALYTICS_TEST_CLICKHOUSE_PASSWORD"),
    })
}

/// Poll the `/ping` endpoint until the server answers `Ok.`.
async fn wait_until_ping(url: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let ping = format!("{url}/ping");
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        let response = client.get(&ping).send().await;
        if matches!(response, Ok(ref r) if r.status().is_success()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("ClickHouse at {url} not ready within {timeout:?}");
}
