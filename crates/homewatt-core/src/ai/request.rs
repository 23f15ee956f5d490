//! Request shaping per agent role
//!
//! One function per role turns an [`AgentRequest`] into template variables;
//! [`build_prompt`] renders the role's prompt with them. Adding a role means
//! adding a prompt file and a match arm here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::AgentError;
use crate::models::HomeProfile;
use crate::prompts::PromptLibrary;

use super::types::{AgentMessage, AgentRequest, AgentRole, ForecastSummary};

/// Placeholder given to the Advisor when the Interpreter stage degraded
pub const NO_INTERPRETATION: &str = "(no interpretation available)";

/// A rendered prompt, split the way chat backends want it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    /// System and user text joined, for completion-style backends
    pub fn combined(&self) -> String {
        if self.system.is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.system, self.user)
        }
    }
}

/// Template variables for a request, by role
pub fn prompt_vars(request: &AgentRequest) -> HashMap<&'static str, String> {
    match request.role {
        AgentRole::Interpreter => shape_interpreter(request),
        AgentRole::Advisor => shape_advisor(request),
    }
}

fn shape_interpreter(request: &AgentRequest) -> HashMap<&'static str, String> {
    forecast_vars(
        &ForecastSummary::from_forecast(&request.forecast),
        request.profile.as_ref(),
    )
}

fn shape_advisor(request: &AgentRequest) -> HashMap<&'static str, String> {
    let mut vars = forecast_vars(
        &ForecastSummary::from_forecast(&request.forecast),
        request.profile.as_ref(),
    );
    vars.insert("interpretation", interpretation_text(request.prior.as_ref()));
    vars
}

fn interpretation_text(prior: Option<&AgentMessage>) -> String {
    prior
        .map(|m| m.output_text.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_INTERPRETATION.to_string())
}

fn forecast_vars(
    summary: &ForecastSummary,
    profile: Option<&HomeProfile>,
) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("household_id", summary.household_id.clone());
    vars.insert("target", summary.target.clone());
    vars.insert("horizon_start", summary.horizon_start.clone());
    vars.insert("horizon_end", summary.horizon_end.clone());
    vars.insert("predicted_kwh", summary.predicted_kwh.clone());
    vars.insert("confidence", summary.confidence.clone().unwrap_or_default());
    vars.insert("interval", summary.interval.clone().unwrap_or_default());
    vars.insert("model_version", summary.model_version.clone());
    vars.insert("profile", profile.map(describe_profile).unwrap_or_default());
    vars
}

/// Plain-text household description for prompts
pub fn describe_profile(profile: &HomeProfile) -> String {
    let tariff = &profile.tariff;
    let mut lines = vec![
        format!("- Household size: {}", profile.household_size),
        format!(
            "- Tariff: peak {:.2} {cur}/kWh ({}-{}), off-peak {:.2} {cur}/kWh",
            tariff.rate_peak,
            tariff.peak_start,
            tariff.peak_end,
            tariff.rate_offpeak,
            cur = tariff.currency
        ),
    ];
    if !profile.appliances.is_empty() {
        lines.push(format!("- Appliances: {}", profile.appliances.join(", ")));
    }
    if let Some(city) = &profile.city {
        lines.push(format!("- City: {}", city));
    }
    lines.join("\n")
}

/// Render the role's prompt for this request
pub fn build_prompt(
    prompts: &Arc<RwLock<PromptLibrary>>,
    request: &AgentRequest,
) -> Result<RenderedPrompt, AgentError> {
    let vars = prompt_vars(request);
    let mut prompts = prompts
        .write()
        .map_err(|_| AgentError::Parse("failed to acquire prompt library lock".into()))?;
    let template = prompts
        .get(request.role.prompt_id())
        .map_err(|e| AgentError::Parse(format!("cannot render {} prompt: {}", request.role, e)))?;

    Ok(RenderedPrompt {
        system: template.render_system(&vars),
        user: template.render_user(&vars),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Forecast;
    use chrono::NaiveDate;

    fn forecast() -> Forecast {
        Forecast::for_day(
            "H1",
            Some("Air Conditioning".into()),
            NaiveDate::from_ymd_opt(2025, 7, 8).unwrap(),
            42.0,
            "v1",
        )
        .unwrap()
        .with_confidence(0.9)
        .unwrap()
    }

    fn library() -> Arc<RwLock<PromptLibrary>> {
        Arc::new(RwLock::new(PromptLibrary::embedded_only()))
    }

    #[test]
    fn test_interpreter_prompt() {
        let request = AgentRequest::new(AgentRole::Interpreter, &forecast(), None);
        let prompt = build_prompt(&library(), &request).unwrap();

        assert!(prompt.system.contains("Forecast Interpreter"));
        assert!(prompt.user.contains("Household: H1"));
        assert!(prompt.user.contains("Target: Air Conditioning"));
        assert!(prompt.user.contains("42.00 kWh"));
        assert!(prompt.user.contains("Model confidence: 90%"));
        // no interval and no profile were given
        assert!(!prompt.user.contains("80% interval"));
        assert!(!prompt.user.contains("Household profile"));
        assert!(!prompt.user.contains("{{"));
    }

    #[test]
    fn test_advisor_prompt_includes_interpretation() {
        let prior = AgentMessage {
            role: AgentRole::Interpreter,
            input_forecast: forecast(),
            output_text: "usage is 15% above weekly average".into(),
            structured_actions: vec![],
        };
        let request = AgentRequest::new(AgentRole::Advisor, &forecast(), Some(&prior))
            .with_profile(Some(HomeProfile::default()));
        let prompt = build_prompt(&library(), &request).unwrap();

        assert!(prompt.system.contains("Energy Advisor"));
        assert!(prompt.user.contains("usage is 15% above weekly average"));
        assert!(prompt.user.contains("Household size: 4"));
        assert!(prompt.user.contains("peak 12.00 INR/kWh (18:00-22:00)"));
    }

    #[test]
    fn test_advisor_without_prior() {
        let request = AgentRequest::new(AgentRole::Advisor, &forecast(), None);
        let vars = prompt_vars(&request);
        assert_eq!(vars["interpretation"], NO_INTERPRETATION);
    }

    #[test]
    fn test_profile_mentions_city() {
        let profile = HomeProfile {
            city: Some("Pune".into()),
            ..HomeProfile::default()
        };
        assert!(describe_profile(&profile).ends_with("- City: Pune"));
        assert!(!describe_profile(&HomeProfile::default()).contains("City"));
    }

    #[test]
    fn test_combined_prompt() {
        let prompt = RenderedPrompt {
            system: "sys".into(),
            user: "usr".into(),
        };
        assert_eq!(prompt.combined(), "sys\n\nusr");
    }
}
