//! Event ingestion and dashboard reads.
//!
//! `POST /analytics` answers success whenever the body parses; storage
//! failures are logged and counted, never returned to the page.

use analytics_core::{
    error::ValidationErrorCode, limits::MAX_PAYLOAD_BYTES, parse_date, DailyMetric,
    DashboardSnapshot, DateWindow, Error, RawEvent, RequestContext, SessionDetail,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::extractors::{ClientIp, PlatformGeo, Referrer};
use crate::response::{AckResponse, ApiError};
use crate::state::AppState;

fn too_large(len: Option<usize>) -> ApiError {
    let detail = match len {
        Some(len) => format!(
            "Payload size {}KB exceeds {}KB limit",
            len / 1024,
            MAX_PAYLOAD_BYTES / 1024
        ),
        None => format!("Payload exceeds {}KB limit", MAX_PAYLOAD_BYTES / 1024),
    };
    Error::validation_code(ValidationErrorCode::PayloadTooLarge, detail).into()
}

/// POST /analytics - Record one tracking event.
pub async fn track_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    PlatformGeo(geo_hints): PlatformGeo,
    Referrer(referrer): Referrer,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let body = body.map_err(|rejection| {
        metrics().events_rejected.inc();
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large(None)
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    if body.len() > MAX_PAYLOAD_BYTES {
        metrics().events_rejected.inc();
        return Err(too_large(Some(body.len())));
    }

    let raw = RawEvent::parse(&body).inspect_err(|e| {
        metrics().events_rejected.inc();
        warn!(error = %e, payload_size = body.len(), "Rejected analytics payload");
    })?;

    let ctx = RequestContext {
        ip,
        geo_hints,
        referrer,
        received_at: Some(Utc::now()),
    };

    let outcome = state.ingest.ingest(raw, ctx).await;
    if !outcome.is_complete() {
        debug!(errors = ?outcome.errors, "Event accepted with storage errors");
    }

    Ok(Json(AckResponse::ok()))
}

/// GET /analytics - Dashboard snapshot.
pub async fn snapshot_handler(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.reporting.snapshot().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub city: Option<String>,
}

/// GET /analytics/daily - Per-day funnel metrics.
pub async fn daily_handler(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<Vec<DailyMetric>>, ApiError> {
    let window = DateWindow::parse(query.start_date.as_deref(), query.end_date.as_deref())?;
    let daily = state
        .reporting
        .daily_metrics(&window, query.city.as_deref())
        .await?;
    Ok(Json(daily))
}

/// GET /analytics/day/{date} - Sessions and signups of one day.
pub async fn day_handler(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<SessionDetail>>, ApiError> {
    let date = parse_date(&date)?;
    Ok(Json(state.reporting.day_details(date).await?))
}

/// GET /analytics/cities - Cities seen in sessions and signups.
pub async fn cities_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.reporting.cities().await?))
}
