//! Signup recording.

use analytics_core::{NewUser, Result, SessionConversion, User};
use analytics_store::AnalyticsStore;
use telemetry::metrics;
use tracing::{error, info, warn};

/// Validate and store a signup, then link it to its session.
///
/// Both writes are on the caller's path: either failing fails the signup.
/// An unknown session id is logged and leaves the user unlinked.
pub async fn record_signup(
    store: &dyn AnalyticsStore,
    new_user: NewUser,
    session_id: Option<&str>,
) -> Result<User> {
    new_user.check()?;

    let user = store.insert_user(new_user).await.inspect_err(|e| {
        error!(error = %e, "Failed to insert user");
        metrics().signup_errors.inc();
    })?;

    if let Some(session_id) = session_id.map(str::trim).filter(|s| !s.is_empty()) {
        let conversion = SessionConversion {
            user_id: user.id,
            plan: user.selected_plan.as_str().to_string(),
            city: user.city.clone(),
        };

        let linked = store
            .link_user_to_session(session_id, conversion)
            .await
            .inspect_err(|e| {
                error!(user_id = %user.id, session_id = %session_id, error = %e, "Failed to link session");
                metrics().signup_errors.inc();
            })?;

        if !linked {
            warn!(user_id = %user.id, session_id = %session_id, "Signup session not found");
        }
    }

    metrics().signups_recorded.inc();
    info!(user_id = %user.id, plan = %user.selected_plan, "Signup recorded");
    Ok(user)
}
