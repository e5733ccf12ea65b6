//! Process-wide tallies for the ingest, signup, geolocation and retention paths.
//!
//! Everything here is monotonic except the geolocation cache size. Values are
//! read back through `GET /health/metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

/// Monotonic count of occurrences.
#[derive(Debug, Default)]
pub struct Tally(AtomicU64);

impl Tally {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running mean of operation durations, in milliseconds.
#[derive(Debug, Default)]
pub struct Timing {
    total_ms: AtomicU64,
    samples: AtomicU64,
}

impl Timing {
    pub fn record(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.total_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub events_received: Tally,
    pub events_rejected: Tally,
    pub events_stored: Tally,
    pub event_store_errors: Tally,
    pub sessions_upserted: Tally,
    pub session_store_errors: Tally,

    pub signups_recorded: Tally,
    pub signup_errors: Tally,

    pub geo_lookups: Tally,
    pub geo_cache_hits: Tally,
    pub geo_lookup_failures: Tally,
    geo_cache_entries: AtomicU64,

    pub cleanup_runs: Tally,
    pub cleanup_step_errors: Tally,
    pub rows_deleted: Tally,
    pub ips_anonymized: Tally,

    pub ingest_latency: Timing,
    pub geo_latency: Timing,
    pub store_latency: Timing,
    pub cleanup_latency: Timing,
}

/// Point-in-time copy served by the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_received: u64,
    pub events_rejected: u64,
    pub events_stored: u64,
    pub event_store_errors: u64,
    pub sessions_upserted: u64,
    pub session_store_errors: u64,
    pub signups_recorded: u64,
    pub signup_errors: u64,
    pub geo_lookups: u64,
    pub geo_cache_hits: u64,
    pub geo_lookup_failures: u64,
    pub geo_cache_entries: u64,
    pub cleanup_runs: u64,
    pub cleanup_step_errors: u64,
    pub rows_deleted: u64,
    pub ips_anonymized: u64,
    pub ingest_latency_mean_ms: f64,
    pub geo_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub cleanup_latency_mean_ms: f64,
}

impl Metrics {
    /// Cache size is a level, not a tally; the latest report wins.
    pub fn set_geo_cache_entries(&self, entries: u64) {
        self.geo_cache_entries.store(entries, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_received: self.events_received.get(),
            events_rejected: self.events_rejected.get(),
            events_stored: self.events_stored.get(),
            event_store_errors: self.event_store_errors.get(),
            sessions_upserted: self.sessions_upserted.get(),
            session_store_errors: self.session_store_errors.get(),
            signups_recorded: self.signups_recorded.get(),
            signup_errors: self.signup_errors.get(),
            geo_lookups: self.geo_lookups.get(),
            geo_cache_hits: self.geo_cache_hits.get(),
            geo_lookup_failures: self.geo_lookup_failures.get(),
            geo_cache_entries: self.geo_cache_entries.load(Ordering::Relaxed),
            cleanup_runs: self.cleanup_runs.get(),
            cleanup_step_errors: self.cleanup_step_errors.get(),
            rows_deleted: self.rows_deleted.get(),
            ips_anonymized: self.ips_anonymized.get(),
            ingest_latency_mean_ms: self.ingest_latency.mean_ms(),
            geo_latency_mean_ms: self.geo_latency.mean_ms(),
            store_latency_mean_ms: self.store_latency.mean_ms(),
            cleanup_latency_mean_ms: self.cleanup_latency.mean_ms(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

pub fn metrics() -> &'static Metrics {
    &METRICS
}
