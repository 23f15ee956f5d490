//! Report delivery handler

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use homewatt_core::insights::Insight;
use homewatt_core::notify::Recipient;

use crate::{AppError, AppState};

/// Request body for emailing an Insight
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub insight: Insight,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub status: &'static str,
    pub email: String,
}

/// POST /api/insights/email - Queue an Insight for delivery
///
/// Returns as soon as the send is queued; delivery failures are only logged.
/// A forecast that breaks its invariants is rejected before queuing.
pub async fn email_insight(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), AppError> {
    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Email delivery is not configured"))?;

    request.insight.forecast.validate()?;
    let recipient = Recipient::new(request.name.as_deref(), &request.email)?;
    let email = recipient.email.clone();
    dispatcher.dispatch(request.insight, recipient);

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            status: "queued",
            email,
        }),
    ))
}
