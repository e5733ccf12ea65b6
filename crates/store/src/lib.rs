//! Persistence for events, sessions and users.
//!
//! [`AnalyticsStore`] is the seam the pipeline writes through. Two
//! implementations: [`MemoryStore`] and [`ClickHouseStore`].

pub mod client;
pub mod clickhouse_store;
pub mod config;
pub mod health;
pub mod memory;
pub mod rows;
pub mod schema;
pub mod store;

pub use client::ClickHouseClient;
pub use clickhouse_store::ClickHouseStore;
pub use config::ClickHouseConfig;
pub use health::{check_connection, init_schema};
pub use memory::MemoryStore;
pub use store::{AnalyticsStore, QueryFilter, StoreTotals};
