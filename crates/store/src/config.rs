//! Connection settings for the ClickHouse backend.

use serde::{Deserialize, Serialize};

/// `[storage.clickhouse]` section of the service config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP interface, e.g. `http://localhost:8123`
    #[serde(default = "default_url")]
    pub url: String,
    /// Database holding the events, sessions and users tables
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "analytics".to_string()
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
        }
    }
}

impl ClickHouseConfig {
    /// Apply `ANALYTICS_CLICKHOUSE_{URL,DATABASE,USERNAME,PASSWORD}`.
    ///
    /// Blank values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("ANALYTICS_CLICKHOUSE_URL") {
            self.url = url;
        }
        if let Some(database) = var("ANALYTICS_CLICKHOUSE_DATABASE") {
            self.database = database;
        }
        if let Some(username) = var("ANALYTICS_CLICKHOUSE_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = var("ANALYTICS_CLICKHOUSE_PASSWORD") {
            self.password = Some(password);
        }
    }

    /// Whether the URL names an HTTP endpoint.
    pub fn is_http(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}
