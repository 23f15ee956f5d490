//! Forecast and insight handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use homewatt_core::forecast::FeatureContext;
use homewatt_core::insights::{CancelSignal, Insight};
use homewatt_core::models::{Forecast, HomeProfile, UsageSample};
use homewatt_core::telemetry::{group_series, select_series, UsageSeries};

use crate::{AppError, AppState};

/// One meter reading in a request body
#[derive(Debug, Deserialize)]
pub struct SampleInput {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meter_id: Option<String>,
    pub consumption_kwh: f64,
}

/// Request body for forecast and optimize
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub household_id: String,
    /// Forecast a single meter; whole home when absent
    #[serde(default)]
    pub meter_id: Option<String>,
    /// Defaults to the day after the last sample
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    pub samples: Vec<SampleInput>,
    #[serde(default)]
    pub profile: Option<HomeProfile>,
    /// Mean temperature for the target day; looked up from the profile's
    /// city or location when absent
    #[serde(default)]
    pub avg_temp_c: Option<f64>,
}

impl PredictRequest {
    fn series(&self) -> Result<UsageSeries, AppError> {
        if self.household_id.trim().is_empty() {
            return Err(AppError::bad_request("household_id is required"));
        }
        if self.samples.is_empty() {
            return Err(AppError::bad_request("samples must not be empty"));
        }

        let samples = self
            .samples
            .iter()
            .map(|s| {
                UsageSample::new(
                    s.timestamp,
                    &self.household_id,
                    s.meter_id.clone(),
                    s.consumption_kwh,
                )
            })
            .collect();
        let groups = group_series(samples);
        Ok(select_series(
            &groups,
            &self.household_id,
            self.meter_id.as_deref(),
        )?)
    }

    fn target_date(&self, series: &UsageSeries) -> Result<NaiveDate, AppError> {
        self.target_date
            .or_else(|| series.next_day())
            .ok_or_else(|| AppError::bad_request("cannot determine target_date"))
    }

    /// The request's profile, placed at its city when one is named and
    /// weather lookups are enabled
    async fn profile(&self, state: &AppState) -> Option<HomeProfile> {
        let mut profile = self.profile.clone()?;
        if let Some(weather) = &state.weather {
            weather.resolve_profile(&mut profile).await;
        }
        Some(profile)
    }

    async fn context(
        &self,
        state: &AppState,
        profile: Option<&HomeProfile>,
        target: NaiveDate,
    ) -> FeatureContext {
        // Weather only when the client told us where the home is
        let avg_temp_c = match (self.avg_temp_c, &state.weather, profile) {
            (Some(t), _, _) => Some(t),
            (None, Some(weather), Some(profile)) => {
                weather.avg_temp(&profile.location, target).await
            }
            _ => None,
        };
        FeatureContext {
            avg_temp_c,
            household_size: profile.map(|p| p.household_size),
        }
    }
}

/// POST /api/forecast - Predict next-day consumption
pub async fn forecast(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Forecast>, AppError> {
    let series = request.series()?;
    let target = request.target_date(&series)?;
    let profile = request.profile(&state).await;
    let context = request.context(&state, profile.as_ref(), target).await;

    let forecast = state.pipeline.forecast(&series, target, &context)?;
    Ok(Json(forecast))
}

/// POST /api/optimize - Forecast, then explain and advise
///
/// Degraded Insights are still 200; the `degraded` flag tells the client.
/// A client disconnect drops this future and with it the orchestration.
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Insight>, AppError> {
    let series = request.series()?;
    let target = request.target_date(&series)?;
    let profile = request.profile(&state).await;
    let context = request.context(&state, profile.as_ref(), target).await;

    let insight = state
        .pipeline
        .run(
            &series,
            target,
            &context,
            profile.as_ref(),
            &CancelSignal::never(),
        )
        .await?;

    info!(
        household = %request.household_id,
        degraded = insight.degraded,
        actions = insight.ordered_actions.len(),
        "Optimize request served"
    );
    Ok(Json(insight))
}
