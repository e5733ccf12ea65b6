//! Event enrichment: server clock, deployment stamp and IP location.

use analytics_core::{DeploymentInfo, EnrichedEvent, RawEvent, RequestContext};
use chrono::Utc;

use crate::geolocation::GeolocationService;

/// Adds the facts only the server can observe to a client event.
#[derive(Clone)]
pub struct EventEnricher {
    geolocation: GeolocationService,
    deployment: DeploymentInfo,
}

impl EventEnricher {
    pub fn new(geolocation: GeolocationService, deployment: DeploymentInfo) -> Self {
        Self {
            geolocation,
            deployment,
        }
    }

    pub fn geolocation(&self) -> &GeolocationService {
        &self.geolocation
    }

    pub fn deployment(&self) -> &DeploymentInfo {
        &self.deployment
    }

    /// Enrich a validated event. Never fails; the geolocation lookup falls
    /// back to a placeholder profile.
    pub async fn enrich(&self, raw: RawEvent, ctx: RequestContext) -> EnrichedEvent {
        let server_timestamp = ctx.received_at.unwrap_or_else(Utc::now);
        let event_type = raw.event_type();
        let location = self
            .geolocation
            .resolve(ctx.ip.as_deref(), &ctx.geo_hints)
            .await;

        EnrichedEvent {
            event_type,
            event_data: raw.properties.unwrap_or_default(),
            session_id: raw.session_id,
            visitor_id: raw.visitor_id,
            url: raw.url,
            user_agent: raw.user_agent,
            client_timestamp: raw.timestamp,
            server_timestamp,
            ip_address: ctx.ip,
            referrer: ctx.referrer,
            geo_hints: ctx.geo_hints,
            location,
            deployment: self.deployment.clone(),
        }
    }
}
