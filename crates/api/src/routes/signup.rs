//! Signup endpoint.

use analytics_core::NewUser;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use pipeline::record_signup;
use serde::Deserialize;

use crate::response::{ApiError, SignupResponse};
use crate::state::AppState;

/// Signup form plus the tab's session id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(flatten)]
    pub user: NewUser,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /signup - Store a signup and link it to its session.
pub async fn signup_handler(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let user = record_signup(
        state.store.as_ref(),
        request.user,
        request.session_id.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            user,
        }),
    ))
}
