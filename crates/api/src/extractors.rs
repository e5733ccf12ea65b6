//! Request extractors.

use analytics_core::{
    error::AuthErrorCode,
    limits::{MAX_IP_LEN, MAX_REFERRER_LEN},
    Error, GeoHints,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::response::ApiError;
use crate::state::AppState;

/// Message returned for a missing or wrong cleanup token.
pub const CLEANUP_UNAUTHORIZED: &str = "Unauthorized - Invalid cleanup API key";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First hop of X-Forwarded-For, then X-Real-IP. Values too long
        // to be an address are dropped.
        let plausible = |ip: &str| !ip.is_empty() && ip.len() <= MAX_IP_LEN;

        if let Some(xff) = header_str(&parts.headers, "X-Forwarded-For") {
            if let Some(ip) = xff.split(',').next().map(str::trim).filter(|ip| plausible(ip)) {
                return Ok(ClientIp(Some(ip.to_string())));
            }
        }

        Ok(ClientIp(
            header_str(&parts.headers, "X-Real-IP")
                .map(str::trim)
                .filter(|ip| plausible(ip))
                .map(str::to_string),
        ))
    }
}

/// Coarse location set by the hosting platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformGeo(pub GeoHints);

#[async_trait]
impl<S> FromRequestParts<S> for PlatformGeo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PlatformGeo(GeoHints {
            country: header_str(&parts.headers, "X-Geo-Country").map(str::to_string),
            city: header_str(&parts.headers, "X-Geo-City").map(str::to_string),
        }))
    }
}

/// `Referer` header, truncated to a sane length.
#[derive(Debug, Clone, Default)]
pub struct Referrer(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for Referrer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Referrer(header_str(&parts.headers, header::REFERER.as_str()).map(
            |r| r.chars().take(MAX_REFERRER_LEN).collect(),
        )))
    }
}

/// Proof that the request carried the configured cleanup token.
#[derive(Debug, Clone, Copy)]
pub struct CleanupAuth;

#[async_trait]
impl FromRequestParts<AppState> for CleanupAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = header_str(&parts.headers, header::AUTHORIZATION.as_str())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        match (state.cleanup_token.as_deref(), presented) {
            (Some(expected), Some(token)) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => {
                Ok(CleanupAuth)
            }
            _ => Err(Error::auth(AuthErrorCode::InvalidCleanupToken, CLEANUP_UNAUTHORIZED).into()),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
