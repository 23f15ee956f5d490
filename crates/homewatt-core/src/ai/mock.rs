//! Mock backend for testing
//!
//! Returns deterministic responses for both agent roles without a network.
//! Responses go through the same parser as real backends.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::error::AgentError;

use super::parsing::parse_agent_response;
use super::types::{AgentMessage, AgentRequest, AgentRole};
use super::AgentAdapter;

/// Mock agent backend
///
/// Healthy and successful by default. Individual roles can be configured to
/// fail with a fixed error for degradation tests.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    failures: HashMap<AgentRole, AgentError>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            failures: HashMap::new(),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            failures: HashMap::new(),
        }
    }

    /// Make every call for `role` fail with `error`
    pub fn failing(mut self, role: AgentRole, error: AgentError) -> Self {
        self.failures.insert(role, error);
        self
    }

    /// Raw response text the mock "model" produces for a request
    fn respond(request: &AgentRequest) -> String {
        let forecast = &request.forecast;
        match request.role {
            AgentRole::Interpreter => {
                let mut explanation = format!(
                    "Tomorrow's consumption is forecast at {:.1} kWh",
                    forecast.predicted_kwh()
                );
                if let Some((lo, hi)) = forecast.interval() {
                    explanation.push_str(&format!(", most likely between {:.1} and {:.1} kWh", lo, hi));
                }
                explanation.push('.');
                json!({ "explanation": explanation, "actions": [] }).to_string()
            }
            AgentRole::Advisor => {
                let tariff = request.profile.as_ref().map(|p| &p.tariff);
                let currency = tariff.map(|t| t.currency.as_str()).unwrap_or("INR");
                let peak_start = tariff.map(|t| t.peak_start.as_str()).unwrap_or("18:00");
                let rate_gap = tariff
                    .map(|t| (t.rate_peak - t.rate_offpeak).max(0.0))
                    .unwrap_or(4.5);
                let shift_kwh = (forecast.predicted_kwh() * 0.1).max(0.1);
                json!({
                    "explanation": "Shift flexible loads and trim cooling.",
                    "actions": [
                        {
                            "action_text": format!("Run the washing machine before {}", peak_start),
                            "priority": 1,
                            "appliance": "Washing Machine",
                            "estimated_kwh_saving": 0.0,
                            "estimated_cost_saving": (shift_kwh * rate_gap * 100.0).round() / 100.0,
                            "currency": currency
                        },
                        {
                            "action_text": "Raise the air conditioning setpoint by 2 degrees",
                            "priority": 2,
                            "appliance": "Air Conditioning",
                            "estimated_kwh_saving": (shift_kwh * 100.0).round() / 100.0,
                            "currency": currency
                        },
                        {
                            "action_text": "Switch off the computer instead of leaving it on standby",
                            "priority": 4,
                            "appliance": "Computer"
                        }
                    ]
                })
                .to_string()
            }
        }
    }
}

#[async_trait]
impl AgentAdapter for MockBackend {
    async fn call(&self, request: &AgentRequest) -> Result<AgentMessage, AgentError> {
        if let Some(err) = self.failures.get(&request.role) {
            return Err(err.clone());
        }
        parse_agent_response(request.role, &request.forecast, &Self::respond(request))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
