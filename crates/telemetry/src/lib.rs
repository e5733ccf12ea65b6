//! Process-wide observability for the analytics service: log setup,
//! ingest and reporting counters, and dependency health.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::{health, ComponentHealth, ComponentHealthReport, HealthRegistry, HealthReport, HealthStatus};
pub use metrics::*;
pub use tracing_setup::{init_tracing, TracingConfig};
