//! Event ingestion: enrich, then append the event and upsert its session.

use std::sync::Arc;
use std::time::Instant;

use analytics_core::{RawEvent, RequestContext};
use analytics_store::AnalyticsStore;
use telemetry::metrics;
use tracing::{debug, error};

use crate::enrichment::EventEnricher;

/// What happened to one ingested event. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub event_stored: bool,
    /// `None` when the event had no session id.
    pub session_updated: Option<bool>,
    pub errors: Vec<String>,
}

impl IngestOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Event path for `POST /analytics`.
#[derive(Clone)]
pub struct IngestService {
    enricher: EventEnricher,
    store: Arc<dyn AnalyticsStore>,
}

impl IngestService {
    pub fn new(enricher: EventEnricher, store: Arc<dyn AnalyticsStore>) -> Self {
        Self { enricher, store }
    }

    /// Enrich and persist an event.
    ///
    /// The event append and the session upsert run concurrently; either
    /// failing is logged and counted without affecting the other.
    pub async fn ingest(&self, raw: RawEvent, ctx: RequestContext) -> IngestOutcome {
        let start = Instant::now();
        metrics().events_received.inc();

        let event = self.enricher.enrich(raw, ctx).await;
        let record = event.to_record();
        let upsert = event.to_session_upsert();

        let append = self.store.append_event(record);
        let session = async {
            match upsert {
                Some(upsert) => Some(self.store.upsert_session(upsert).await),
                None => None,
            }
        };
        let (appended, upserted) = tokio::join!(append, session);

        let mut errors = Vec::new();

        let event_stored = match appended {
            Ok(()) => {
                metrics().events_stored.inc();
                true
            }
            Err(e) => {
                error!(
                    event_type = %event.event_type,
                    session_id = ?event.session_id,
                    error = %e,
                    "Failed to store event"
                );
                metrics().event_store_errors.inc();
                errors.push(format!("event: {}", e));
                false
            }
        };

        let session_updated = upserted.map(|result| match result {
            Ok(()) => {
                metrics().sessions_upserted.inc();
                true
            }
            Err(e) => {
                error!(
                    session_id = ?event.session_id,
                    error = %e,
                    "Failed to upsert session"
                );
                metrics().session_store_errors.inc();
                errors.push(format!("session: {}", e));
                false
            }
        });

        let elapsed = start.elapsed();
        metrics().ingest_latency.record(elapsed);
        debug!(
            event_type = %event.event_type,
            location_source = event.location.location_source.as_str(),
            latency_ms = %elapsed.as_millis(),
            "Event ingested"
        );

        IngestOutcome {
            event_stored,
            session_updated,
            errors,
        }
    }
}
