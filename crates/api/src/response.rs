//! Standardized API responses.

use analytics_core::{CleanupStats, PolicyDescription, User};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry::HealthReport;

/// `{success: true}` for accepted events.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Created signup.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub success: bool,
    pub user: User,
}

/// Result of `POST /cleanup`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub stats: CleanupStats,
}

/// Static policy served by `GET /cleanup`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupInfo {
    pub message: String,
    pub retention_policy: PolicyDescription,
    pub usage: String,
}

/// Answer to `format=csv&table=all`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CsvGuidance {
    pub message: String,
    pub available_tables: Vec<String>,
    pub example_urls: Vec<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub store_connected: bool,
    pub timestamp: i64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error with a machine-readable code.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::validation("VALID_001", vec![msg.into()])
    }

    pub fn unauthorized(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::UNAUTHORIZED, code, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "DB_001", msg)
    }

    pub fn validation(code: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", code).with_details(errors),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<analytics_core::Error> for ApiError {
    fn from(err: analytics_core::Error) -> Self {
        use analytics_core::Error;

        match &err {
            Error::Auth { code, message, http_status } => {
                let status = StatusCode::from_u16(*http_status).unwrap_or(StatusCode::UNAUTHORIZED);
                ApiError::with_code(status, *code, message)
            }
            Error::ValidationWithCode { code, message, .. } => {
                ApiError::validation(*code, vec![message.clone()])
            }
            Error::Database { code, message, .. } => {
                ApiError::with_code(StatusCode::INTERNAL_SERVER_ERROR, *code, message)
            }
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Serialization(e) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}
