//! Schema bootstrap and liveness check for ClickHouse.

use analytics_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::client::ClickHouseClient;
use crate::schema::{all_tables, CREATE_DATABASE};

/// Whether ClickHouse answers a trivial query.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    let reply = client.inner().query("SELECT 1").fetch_one::<u8>().await;
    if let Err(e) = &reply {
        warn!(error = %e, database = client.database(), "ClickHouse ping failed");
    }
    reply.is_ok()
}

/// Create the analytics database and the events, sessions and users
/// tables when they are missing. Existing tables are left untouched.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    client
        .server()
        .query(&CREATE_DATABASE.replace("{db}", client.database()))
        .execute()
        .await
        .map_err(|e| Error::storage(format!("create database {}: {}", client.database(), e)))?;

    for (table, ddl) in all_tables() {
        client
            .inner()
            .query(ddl)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("create table {}: {}", table, e)))?;
        debug!(table, "Table ready");
    }

    info!(database = client.database(), "Analytics schema initialized");
    Ok(())
}
