//! Retention sweep: age out events and sessions, strip old IP addresses.
//!
//! Users are business records and are never touched.

use std::sync::Arc;
use std::time::Instant;

use analytics_core::{CleanupStats, Result, RetentionPolicy};
use analytics_store::AnalyticsStore;
use chrono::{DateTime, Utc};
use telemetry::metrics;
use tracing::{error, info};

/// Runs the cleanup sweep on demand.
#[derive(Clone)]
pub struct RetentionWorker {
    store: Arc<dyn AnalyticsStore>,
    policy: RetentionPolicy,
}

impl RetentionWorker {
    /// Rejects a policy that would delete rows before their IPs are stripped.
    pub fn new(store: Arc<dyn AnalyticsStore>, policy: RetentionPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { store, policy })
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run every step in order. A failing step records its error and
    /// counts 0; later steps still run.
    pub async fn perform_cleanup(&self, now: DateTime<Utc>) -> CleanupStats {
        let start = Instant::now();
        let cutoffs = self.policy.cutoffs(now);
        let mut stats = CleanupStats::new(now);

        info!(
            events_before = %cutoffs.events_before,
            sessions_before = %cutoffs.sessions_before,
            anonymize_before = %cutoffs.anonymize_before,
            "Running retention cleanup"
        );

        stats.events_deleted = step(
            &mut stats.errors,
            "delete events",
            self.store.delete_events_before(cutoffs.events_before).await,
        );

        stats.sessions_deleted = step(
            &mut stats.errors,
            "delete sessions",
            self.store.delete_sessions_before(cutoffs.sessions_before).await,
        );

        let sessions_anonymized = step(
            &mut stats.errors,
            "anonymize sessions",
            self.store
                .anonymize_sessions_before(cutoffs.anonymize_before)
                .await,
        );
        let events_anonymized = step(
            &mut stats.errors,
            "anonymize events",
            self.store
                .anonymize_events_before(cutoffs.anonymize_before)
                .await,
        );
        stats.ip_addresses_anonymized = sessions_anonymized + events_anonymized;

        match self.store.oldest_records().await {
            Ok(oldest) => stats.oldest_remaining = oldest,
            Err(e) => {
                error!(error = %e, "Failed to read oldest records");
                stats.errors.push(format!("oldest records: {}", e));
            }
        }

        metrics().cleanup_runs.inc();
        metrics().cleanup_step_errors.add(stats.errors.len() as u64);
        metrics()
            .rows_deleted
            .add(stats.events_deleted + stats.sessions_deleted);
        metrics().ips_anonymized.add(stats.ip_addresses_anonymized);
        metrics().cleanup_latency.record(start.elapsed());

        info!(
            events_deleted = stats.events_deleted,
            sessions_deleted = stats.sessions_deleted,
            ip_addresses_anonymized = stats.ip_addresses_anonymized,
            errors = stats.errors.len(),
            "Retention cleanup complete"
        );

        stats
    }
}

fn step(errors: &mut Vec<String>, name: &str, result: Result<u64>) -> u64 {
    match result {
        Ok(count) => count,
        Err(e) => {
            error!(step = name, error = %e, "Retention step failed");
            errors.push(format!("{}: {}", name, e));
            0
        }
    }
}
