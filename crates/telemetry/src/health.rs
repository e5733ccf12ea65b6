//! Dependency health for the `/health` endpoints.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Store reachable, geolocation falling back.
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Whether tracking and reporting still work.
    pub fn is_serving(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

#[derive(Debug)]
struct CheckState {
    healthy: bool,
    message: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

/// Last known state of one dependency. Starts unhealthy until first checked.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    state: RwLock<CheckState>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(CheckState {
                healthy: false,
                message: None,
                checked_at: None,
            }),
        }
    }

    pub fn set_healthy(&self) {
        self.record(true, None);
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.record(false, Some(msg.into()));
    }

    fn record(&self, healthy: bool, message: Option<String>) {
        *self.state.write() = CheckState {
            healthy,
            message,
            checked_at: Some(Utc::now()),
        };
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.state.read().message.clone()
    }

    fn report(&self) -> ComponentHealthReport {
        let state = self.state.read();
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: state.healthy,
            message: state.message.clone(),
            checked_at: state.checked_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// The store and the geolocation provider.
pub struct HealthRegistry {
    pub store: ComponentHealth,
    pub geolocation: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            store: ComponentHealth::new("store"),
            geolocation: ComponentHealth::new("geolocation"),
        }
    }

    /// Geolocation failures only degrade the service since lookups fall
    /// back to a placeholder profile. The store decides unhealthy.
    pub fn report(&self) -> HealthReport {
        let status = match (self.store.is_healthy(), self.geolocation.is_healthy()) {
            (true, true) => HealthStatus::Healthy,
            (true, false) => HealthStatus::Degraded,
            (false, _) => HealthStatus::Unhealthy,
        };

        HealthReport {
            status,
            components: vec![self.store.report(), self.geolocation.report()],
        }
    }

    /// Readiness follows the store.
    pub fn is_ready(&self) -> bool {
        self.store.is_healthy()
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static HEALTH: LazyLock<HealthRegistry> = LazyLock::new(HealthRegistry::new);

/// Process-wide health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
