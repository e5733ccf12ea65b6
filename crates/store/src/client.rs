//! Shared ClickHouse handle for the store.

use analytics_core::{Error, Result};
use clickhouse::Client;
use tracing::info;

use crate::config::ClickHouseConfig;

/// ClickHouse client bound to the analytics database.
///
/// Mutations run with `mutations_sync = 1`, so the counts the retention
/// sweep reports describe finished work.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        if !config.is_http() {
            return Err(Error::config(format!(
                "ClickHouse url must be http(s), got {}",
                config.url
            )));
        }

        let mut inner = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_option("mutations_sync", "1");
        if let Some(user) = &config.username {
            inner = inner.with_user(user);
        }
        if let Some(password) = &config.password {
            inner = inner.with_password(password);
        }

        info!(
            url = %config.url,
            database = %config.database,
            authenticated = config.username.is_some(),
            "ClickHouse client ready"
        );

        Ok(Self { inner, config })
    }

    /// Client scoped to the analytics database.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Client for statements that run before the analytics database exists.
    pub fn server(&self) -> Client {
        self.inner.clone().with_database("default")
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }
}
