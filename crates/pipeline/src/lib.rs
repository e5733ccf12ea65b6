//! Ingestion, reporting, export and retention services.
//!
//! - Geolocation (ip-api with a moka cache)
//! - Enrichment and ingestion (`POST /analytics`)
//! - Signup recording
//! - Reporting (daily rollup, day details, dashboard snapshot)
//! - Export (JSON and CSV)
//! - Retention (on-demand cleanup)

pub mod enrichment;
pub mod export;
pub mod geolocation;
pub mod ingest;
pub mod reporting;
pub mod retention;
pub mod signup;

pub use enrichment::EventEnricher;
pub use export::{ExportDocument, ExportFormat, ExportService, ExportTable};
pub use geolocation::{GeoProvider, GeolocationConfig, GeolocationService, IpApiProvider};
pub use ingest::{IngestOutcome, IngestService};
pub use reporting::ReportingService;
pub use retention::RetentionWorker;
pub use signup::record_signup;
