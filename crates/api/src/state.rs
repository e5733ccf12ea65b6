//! Application state shared across handlers.

use std::sync::Arc;

use analytics_core::{ReportingTimezone, Result, RetentionPolicy};
use analytics_store::AnalyticsStore;
use pipeline::{EventEnricher, ExportService, IngestService, ReportingService, RetentionWorker};

/// Settings that shape the services behind the router.
#[derive(Debug, Clone, Default)]
pub struct StateSettings {
    pub reporting_timezone: ReportingTimezone,
    pub retention: RetentionPolicy,
    /// Bearer token for `POST /cleanup`. `None` rejects every request.
    pub cleanup_token: Option<String>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnalyticsStore>,
    pub ingest: IngestService,
    pub reporting: ReportingService,
    pub export: ExportService,
    pub retention: RetentionWorker,
    pub cleanup_token: Option<Arc<str>>,
}

impl AppState {
    /// Wire the services over one store. Fails on an invalid retention
    /// policy.
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        enricher: EventEnricher,
        settings: StateSettings,
    ) -> Result<Self> {
        let reporting = ReportingService::new(store.clone(), settings.reporting_timezone);

        Ok(Self {
            ingest: IngestService::new(enricher, store.clone()),
            export: ExportService::new(store.clone(), reporting.clone()),
            retention: RetentionWorker::new(store.clone(), settings.retention)?,
            reporting,
            cleanup_token: settings
                .cleanup_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Arc::from),
            store,
        })
    }
}
