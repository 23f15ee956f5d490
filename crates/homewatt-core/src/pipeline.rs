//! End-to-end prediction pipeline
//!
//! Telemetry → features → forecast → insight. Forecast failures are fatal
//! and returned; agent failures only degrade the Insight.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::ai::AgentAdapter;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::forecast::{FeatureAssembler, FeatureContext, ForecastModel};
use crate::insights::{CancelSignal, Insight, InsightOrchestrator, OrchestrationReport};
use crate::models::{Forecast, HomeProfile};
use crate::telemetry::UsageSeries;

/// Owns the long-lived pieces of the pipeline; cheap to clone
#[derive(Clone)]
pub struct EnergyPipeline {
    model: Arc<dyn ForecastModel>,
    assembler: FeatureAssembler,
    orchestrator: InsightOrchestrator,
}

impl EnergyPipeline {
    pub fn new(
        model: Arc<dyn ForecastModel>,
        agent: Arc<dyn AgentAdapter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            assembler: FeatureAssembler::default(),
            orchestrator: InsightOrchestrator::new(agent, config),
        }
    }

    pub fn with_assembler(mut self, assembler: FeatureAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }

    pub fn orchestrator(&self) -> &InsightOrchestrator {
        &self.orchestrator
    }

    /// Predict consumption of `series` for `target_date`
    pub fn forecast(
        &self,
        series: &UsageSeries,
        target_date: NaiveDate,
        context: &FeatureContext,
    ) -> Result<Forecast> {
        let features = self.assembler.assemble(series, target_date, context)?;
        let forecast = self.model.predict(&features)?;
        info!(
            household = %forecast.household_id(),
            meter = forecast.meter_id().unwrap_or("-"),
            date = %target_date,
            predicted_kwh = forecast.predicted_kwh(),
            model_version = %forecast.model_version(),
            "Forecast produced"
        );
        Ok(forecast)
    }

    /// Forecast, then orchestrate the agents over it
    pub async fn run(
        &self,
        series: &UsageSeries,
        target_date: NaiveDate,
        context: &FeatureContext,
        profile: Option<&HomeProfile>,
        cancel: &CancelSignal,
    ) -> Result<Insight> {
        self.run_traced(series, target_date, context, profile, cancel)
            .await
            .map(|report| report.insight)
    }

    /// Like [`run`](Self::run), keeping the orchestrator's transition trace
    pub async fn run_traced(
        &self,
        series: &UsageSeries,
        target_date: NaiveDate,
        context: &FeatureContext,
        profile: Option<&HomeProfile>,
        cancel: &CancelSignal,
    ) -> Result<OrchestrationReport> {
        let forecast = self.forecast(series, target_date, context)?;
        self.orchestrator.run(&forecast, profile, cancel).await
    }
}
