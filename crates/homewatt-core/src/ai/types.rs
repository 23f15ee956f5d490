//! Agent request/response types
//!
//! These types are backend-agnostic and used across all agent implementations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Forecast, HomeProfile};
use crate::prompts::PromptId;

/// Which reasoning agent a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Explains the predicted number
    Interpreter,
    /// Proposes concrete energy-saving actions
    Advisor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interpreter => "interpreter",
            Self::Advisor => "advisor",
        }
    }

    /// Prompt that drives this role
    pub fn prompt_id(&self) -> PromptId {
        match self {
            Self::Interpreter => PromptId::InterpretForecast,
            Self::Advisor => PromptId::AdviseActions,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest priority an agent may assign (1 is the most important)
pub const MAX_PRIORITY: u8 = 5;

/// A single recommended action proposed by the Advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action_text: String,
    /// 1 (most important) ..= 5
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appliance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_kwh_saving: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_saving: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl RecommendedAction {
    pub fn new(action_text: impl Into<String>, priority: u8) -> Self {
        Self {
            action_text: action_text.into(),
            priority,
            appliance: None,
            estimated_kwh_saving: None,
            estimated_cost_saving: None,
            currency: None,
        }
    }

    pub fn with_appliance(mut self, appliance: impl Into<String>) -> Self {
        self.appliance = Some(appliance.into());
        self
    }

    pub fn with_savings(mut self, kwh: f64, cost: f64, currency: impl Into<String>) -> Self {
        self.estimated_kwh_saving = Some(kwh);
        self.estimated_cost_saving = Some(cost);
        self.currency = Some(currency.into());
        self
    }
}

/// Output of one agent call, bound to the forecast it was asked about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: AgentRole,
    pub input_forecast: Forecast,
    pub output_text: String,
    pub structured_actions: Vec<RecommendedAction>,
}

/// Everything an adapter needs to shape one agent call
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    pub forecast: Forecast,
    pub prior: Option<AgentMessage>,
    pub profile: Option<HomeProfile>,
}

impl AgentRequest {
    pub fn new(role: AgentRole, forecast: &Forecast, prior: Option<&AgentMessage>) -> Self {
        Self {
            role,
            forecast: forecast.clone(),
            prior: prior.cloned(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<HomeProfile>) -> Self {
        self.profile = profile;
        self
    }
}

/// Forecast fields as presented to an agent
///
/// Numbers are pre-formatted so every backend sends identical text.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    pub household_id: String,
    pub target: String,
    pub horizon_start: String,
    pub horizon_end: String,
    pub predicted_kwh: String,
    pub confidence: Option<String>,
    pub interval: Option<String>,
    pub model_version: String,
}

impl ForecastSummary {
    pub fn from_forecast(forecast: &Forecast) -> Self {
        Self {
            household_id: forecast.household_id().to_string(),
            target: forecast
                .meter_id()
                .map(str::to_string)
                .unwrap_or_else(|| "whole home".to_string()),
            horizon_start: format_time(forecast.horizon_start()),
            horizon_end: format_time(forecast.horizon_end()),
            predicted_kwh: format!("{:.2}", forecast.predicted_kwh()),
            confidence: forecast.confidence().map(|c| format!("{:.0}%", c * 100.0)),
            interval: forecast
                .interval()
                .map(|(lo, hi)| format!("{:.2} to {:.2}", lo.max(0.0), hi)),
            model_version: forecast.model_version().to_string(),
        }
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn forecast() -> Forecast {
        Forecast::for_day(
            "H1",
            None,
            NaiveDate::from_ymd_opt(2025, 7, 8).unwrap(),
            42.0,
            "2025.11:household",
        )
        .unwrap()
        .with_confidence(0.9)
        .unwrap()
        .with_interval(-1.0, 45.5)
    }

    #[test]
    fn test_role_prompt_mapping() {
        assert_eq!(AgentRole::Interpreter.prompt_id(), PromptId::InterpretForecast);
        assert_eq!(AgentRole::Advisor.prompt_id(), PromptId::AdviseActions);
        assert_eq!(AgentRole::Advisor.to_string(), "advisor");
    }

    #[test]
    fn test_forecast_summary() {
        let summary = ForecastSummary::from_forecast(&forecast());
        assert_eq!(summary.household_id, "H1");
        assert_eq!(summary.target, "whole home");
        assert_eq!(summary.predicted_kwh, "42.00");
        assert_eq!(summary.confidence.as_deref(), Some("90%"));
        assert_eq!(summary.interval.as_deref(), Some("0.00 to 45.50"));
        assert_eq!(summary.horizon_start, "2025-07-08 00:00 UTC");
        assert_eq!(summary.horizon_end, "2025-07-09 00:00 UTC");
    }

    #[test]
    fn test_action_serialization_skips_empty_fields() {
        let action = RecommendedAction::new("Shift laundry to off-peak", 2);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["priority"], 2);
        assert!(json.get("appliance").is_none());

        let action = action.with_savings(1.5, 18.0, "INR");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["currency"], "INR");
    }
}
