//! Funnel Analytics
//!
//! Event ingestion and daily rollup service for a marketing site:
//! - Tracking events enriched with geolocation and device context
//! - Session upserts and signup attribution
//! - Daily funnel rollups, day details and data export
//! - On-demand retention cleanup with IP anonymization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info, warn};

use analytics_core::{DeploymentInfo, ReportingTimezone, RetentionPolicy};
use analytics_store::{AnalyticsStore, ClickHouseClient, ClickHouseConfig, ClickHouseStore, MemoryStore};
use api::{router, AppState, StateSettings};
use pipeline::{EventEnricher, GeolocationConfig, GeolocationService};
use telemetry::{health, init_tracing, TracingConfig};

/// Where events, sessions and users live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageBackend {
    Memory,
    #[default]
    Clickhouse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StorageConfig {
    #[serde(default)]
    backend: StorageBackend,
    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Timezone whose calendar days bucket the rollups
    #[serde(default)]
    reporting_timezone: ReportingTimezone,

    /// Bearer token for `POST /cleanup`
    #[serde(default)]
    cleanup_token: Option<String>,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    geolocation: GeolocationConfig,

    #[serde(default)]
    retention: RetentionPolicy,

    #[serde(default)]
    deployment: DeploymentInfo,

    #[serde(default)]
    log: TracingConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reporting_timezone: ReportingTimezone::default(),
            cleanup_token: None,
            storage: StorageConfig::default(),
            geolocation: GeolocationConfig::default(),
            retention: RetentionPolicy::default(),
            deployment: DeploymentInfo::default(),
            log: TracingConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;

    init_tracing(&config.log);

    info!("Starting Funnel Analytics v{}", env!("CARGO_PKG_VERSION"));
    info!(
        backend = ?config.storage.backend,
        reporting_timezone = %config.reporting_timezone,
        deployment_id = %config.deployment.deployment_id,
        cleanup_enabled = config.cleanup_token.is_some(),
        "Loaded configuration"
    );
    if config.cleanup_token.is_none() {
        warn!("No cleanup token configured, POST /cleanup will reject every request");
    }

    let store = build_store(&config.storage).await?;
    check_health(store.as_ref()).await;

    let geolocation =
        GeolocationService::from_config(&config.geolocation, config.reporting_timezone.name())
            .context("Failed to create geolocation service")?;
    // Lookups fall back on failure; assume healthy until one fails.
    health().geolocation.set_healthy();

    let enricher = EventEnricher::new(geolocation, config.deployment.clone());

    let state = AppState::new(
        store,
        enricher,
        StateSettings {
            reporting_timezone: config.reporting_timezone,
            retention: config.retention,
            cleanup_token: config.cleanup_token.clone(),
        },
    )
    .context("Invalid service configuration")?;

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from defaults, `config/default.toml` and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat names for the settings operators set most often
    if let Ok(token) = std::env::var("ANALYTICS_CLEANUP_TOKEN") {
        config.cleanup_token = Some(token);
    }
    if let Ok(tz) = std::env::var("ANALYTICS_REPORTING_TIMEZONE") {
        config.reporting_timezone = tz.parse().context("Invalid ANALYTICS_REPORTING_TIMEZONE")?;
    }
    config.storage.clickhouse.apply_env();

    // Platform build metadata
    if let Ok(id) = std::env::var("DEPLOYMENT_ID") {
        config.deployment.deployment_id = id;
    }
    if let Ok(sha) = std::env::var("GIT_COMMIT_SHA") {
        config.deployment.git_commit = sha;
    }

    config.cleanup_token = config
        .cleanup_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(config)
}

async fn build_store(storage: &StorageConfig) -> Result<Arc<dyn AnalyticsStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory store, data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Clickhouse => {
            let client = ClickHouseClient::new(storage.clickhouse.clone())
                .context("Failed to create ClickHouse client")?;

            if let Err(e) = analytics_store::init_schema(&client).await {
                error!("Failed to initialize ClickHouse schema: {}", e);
                // Continue anyway - schema might already exist
            }

            Ok(Arc::new(ClickHouseStore::new(client)))
        }
    }
}

/// Check store health on startup.
async fn check_health(store: &dyn AnalyticsStore) {
    if store.ping().await {
        health().store.set_healthy();
        info!("Store connection: healthy");
    } else {
        health().store.set_unhealthy("Connection failed");
        error!("Store connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
