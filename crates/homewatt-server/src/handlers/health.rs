//! Health handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use homewatt_core::ai::AgentAdapter;

use crate::AppState;

/// Response for the health endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent_backend: &'static str,
    pub agent_model: String,
    pub agent_healthy: bool,
    pub model_version: String,
    pub email_enabled: bool,
}

/// GET /api/health - Service and agent backend status
///
/// Always 200: an unreachable agent only degrades insights.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let agent_healthy = state.agent.health_check().await;

    Json(HealthResponse {
        status: if agent_healthy { "ok" } else { "degraded" },
        agent_backend: state.agent.backend_name(),
        agent_model: state.agent.model().to_string(),
        agent_healthy,
        model_version: state.pipeline.model_version().to_string(),
        email_enabled: state.dispatcher.is_some(),
    })
}
