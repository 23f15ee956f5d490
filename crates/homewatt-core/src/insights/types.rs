//! Core types for the Insight Orchestrator

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::{AgentRole, RecommendedAction};
use crate::models::Forecast;

/// Explanation used when the Interpreter stage degrades
pub const FALLBACK_EXPLANATION: &str = "Forecast value reported; detailed explanation unavailable.";

/// Why a stage contributed nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradeReason {
    /// Transient failures used up the attempt budget
    RetriesExhausted { attempts: u32, last_error: String },
    /// Auth or parse failure; never retried
    NonTransient { error: String },
    /// The invocation deadline passed before the stage could finish
    DeadlineExceeded,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "retries exhausted after {} attempts: {}", attempts, last_error),
            Self::NonTransient { error } => write!(f, "non-transient failure: {}", error),
            Self::DeadlineExceeded => f.write_str("invocation deadline exceeded"),
        }
    }
}

/// A stage that degraded, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDegradation {
    pub role: AgentRole,
    pub reason: DegradeReason,
}

/// The terminal artifact of one orchestration
///
/// The orchestrator keeps no copy; whoever receives it owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub forecast: Forecast,
    pub explanation_text: String,
    pub ordered_actions: Vec<RecommendedAction>,
    pub generated_at: DateTime<Utc>,
    /// At least one agent stage degraded
    pub degraded: bool,
    #[serde(default)]
    pub degraded_stages: Vec<StageDegradation>,
}

impl Insight {
    /// An Insight carrying only the forecast and the fallback explanation
    pub fn fallback(forecast: Forecast, degraded_stages: Vec<StageDegradation>) -> Self {
        Self {
            forecast,
            explanation_text: FALLBACK_EXPLANATION.to_string(),
            ordered_actions: Vec::new(),
            generated_at: Utc::now(),
            degraded: true,
            degraded_stages,
        }
    }

    pub fn predicted_kwh(&self) -> f64 {
        self.forecast.predicted_kwh()
    }

    /// Whether `role` degraded in this invocation
    pub fn stage_degraded(&self, role: AgentRole) -> bool {
        self.degraded_stages.iter().any(|d| d.role == role)
    }

    /// Sum of estimated kWh savings over all actions that carry one
    pub fn estimated_kwh_saving(&self) -> Option<f64> {
        let savings: Vec<f64> = self
            .ordered_actions
            .iter()
            .filter_map(|a| a.estimated_kwh_saving)
            .collect();
        if savings.is_empty() {
            None
        } else {
            Some(savings.iter().sum())
        }
    }
}
