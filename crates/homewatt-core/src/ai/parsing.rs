//! JSON parsing helpers for agent responses
//!
//! Models often wrap the JSON payload in prose or markdown code fences.
//! These functions extract the object and validate it against the shape each
//! role must return; anything else is an [`AgentError::Parse`].

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::AgentError;
use crate::models::Forecast;

use super::types::{AgentMessage, AgentRole, RecommendedAction, MAX_PRIORITY};

/// Raw agent payload, before validation
#[derive(Debug, Deserialize)]
struct AgentPayload {
    #[serde(default, alias = "summary")]
    explanation: Option<String>,
    #[serde(default)]
    actions: Option<Vec<ActionPayload>>,
}

#[derive(Debug, Deserialize)]
struct ActionPayload {
    #[serde(default, alias = "recommendation", alias = "action")]
    action_text: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    appliance: Option<String>,
    #[serde(default)]
    estimated_kwh_saving: Option<f64>,
    #[serde(default)]
    estimated_cost_saving: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[a-zA-Z]*").expect("valid regex"))
}

/// Locate the JSON object inside a model response
pub fn extract_json(response: &str) -> Result<&str, AgentError> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(AgentError::Parse(format!(
            "no JSON found in agent response | Raw: {}",
            preview(response)
        ))),
    }
}

/// Parse an agent response for `role` into an [`AgentMessage`]
///
/// The Interpreter must return a non-empty `explanation`; `actions` is
/// optional. The Advisor must return an `actions` array (possibly empty);
/// its `explanation` is optional.
pub fn parse_agent_response(
    role: AgentRole,
    forecast: &Forecast,
    response: &str,
) -> Result<AgentMessage, AgentError> {
    let stripped = code_fence().replace_all(response, "");
    let json_str = extract_json(&stripped)?;

    let payload: AgentPayload = serde_json::from_str(json_str).map_err(|e| {
        AgentError::Parse(format!(
            "invalid JSON from {} agent: {} | Raw: {}",
            role,
            e,
            preview(json_str)
        ))
    })?;

    let explanation = payload
        .explanation
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let output_text = match (role, explanation) {
        (_, Some(text)) => text,
        (AgentRole::Interpreter, None) => {
            return Err(AgentError::Parse(
                "interpreter response is missing an explanation".into(),
            ))
        }
        (AgentRole::Advisor, None) => String::new(),
    };

    let structured_actions = match (role, payload.actions) {
        (_, Some(actions)) => actions
            .into_iter()
            .enumerate()
            .map(|(idx, action)| validate_action(idx, action))
            .collect::<Result<Vec<_>, _>>()?,
        (AgentRole::Advisor, None) => {
            return Err(AgentError::Parse(
                "advisor response is missing the actions array".into(),
            ))
        }
        (AgentRole::Interpreter, None) => Vec::new(),
    };

    Ok(AgentMessage {
        role,
        input_forecast: forecast.clone(),
        output_text,
        structured_actions,
    })
}

fn validate_action(idx: usize, action: ActionPayload) -> Result<RecommendedAction, AgentError> {
    let text = action
        .action_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AgentError::Parse(format!("action {} has no action_text", idx)))?;

    let priority = action
        .priority
        .ok_or_else(|| AgentError::Parse(format!("action {} has no priority", idx)))?;
    if !(1..=MAX_PRIORITY as i64).contains(&priority) {
        return Err(AgentError::Parse(format!(
            "action {} priority {} outside 1..={}",
            idx, priority, MAX_PRIORITY
        )));
    }

    Ok(RecommendedAction {
        action_text: text,
        priority: priority as u8,
        appliance: action.appliance.filter(|a| !a.trim().is_empty()),
        estimated_kwh_saving: action.estimated_kwh_saving.filter(|v| v.is_finite()),
        estimated_cost_saving: action.estimated_cost_saving.filter(|v| v.is_finite()),
        currency: action.currency,
    })
}

/// Truncate long responses for error messages
fn preview(s: &str) -> String {
    match s.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
