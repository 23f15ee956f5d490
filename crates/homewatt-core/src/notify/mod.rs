//! Insight delivery
//!
//! Notification sits outside the orchestrator: the caller decides whether
//! an Insight is sent anywhere. [`Dispatcher::dispatch`] is fire-and-forget;
//! delivery failures are logged, never returned.

mod email;

pub use email::EmailNotifier;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::insights::Insight;

/// Subject line of every report
pub const REPORT_SUBJECT: &str = "Your Home Energy Optimization Report";

const SIGNATURE: &str = "Best regards,\nHome Energy Saver";

/// Who receives a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

impl Recipient {
    /// Build a recipient, rejecting addresses that cannot be delivered to
    pub fn new(name: Option<&str>, email: &str) -> Result<Self> {
        let email = email.trim();
        email
            .parse::<lettre::Address>()
            .map_err(|e| Error::InvalidInput(format!("invalid email address '{}': {}", email, e)))?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("User");
        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// A sink for finished Insights
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logging
    fn channel(&self) -> &str;

    async fn send(&self, insight: &Insight, recipient: &Recipient) -> Result<()>;
}

/// Plain-text report body for an Insight
pub fn render_report(insight: &Insight, recipient: &Recipient) -> String {
    let forecast = &insight.forecast;
    let mut body = String::new();

    let _ = writeln!(body, "Hi {},\n", recipient.name);
    let target = forecast.meter_id().unwrap_or("your home");
    let _ = write!(
        body,
        "Forecast for {} on {}: {:.1} kWh",
        target,
        forecast.horizon_start().format("%Y-%m-%d"),
        forecast.predicted_kwh()
    );
    if let Some((lo, hi)) = forecast.interval() {
        let _ = write!(body, " (likely {:.1} to {:.1} kWh)", lo, hi);
    }
    body.push_str(".\n\n");

    let _ = writeln!(body, "{}\n", insight.explanation_text);

    if insight.ordered_actions.is_empty() {
        body.push_str("No specific actions are recommended right now.\n");
    } else {
        body.push_str("Recommended actions:\n");
        for (i, action) in insight.ordered_actions.iter().enumerate() {
            let _ = write!(body, "{}. ", i + 1);
            if let Some(appliance) = &action.appliance {
                let _ = write!(body, "[{}] ", appliance);
            }
            body.push_str(&action.action_text);
            match (action.estimated_kwh_saving, action.estimated_cost_saving) {
                (Some(kwh), Some(cost)) => {
                    let currency = action.currency.as_deref().unwrap_or("");
                    let _ = write!(body, " (saves ~{:.1} kWh, {:.2} {})", kwh, cost, currency);
                }
                (Some(kwh), None) => {
                    let _ = write!(body, " (saves ~{:.1} kWh)", kwh);
                }
                _ => {}
            }
            body.push('\n');
        }
        if let Some(total) = insight.estimated_kwh_saving() {
            let _ = writeln!(body, "\nEstimated total saving: {:.1} kWh", total);
        }
    }

    if insight.degraded {
        body.push_str(
            "\nNote: part of this report could not be generated, so some details are missing.\n",
        );
    }

    body.push('\n');
    body.push_str(SIGNATURE);
    body.push('\n');
    body
}

/// Fire-and-forget delivery over one notifier
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Queue delivery of `insight`; returns immediately
    ///
    /// The handle is only useful to tests and shutdown paths. The task never
    /// fails: errors are logged.
    pub fn dispatch(&self, insight: Insight, recipient: Recipient) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match notifier.send(&insight, &recipient).await {
                Ok(()) => info!(
                    channel = notifier.channel(),
                    household = %insight.forecast.household_id(),
                    recipient = %recipient.email,
                    "Insight delivered"
                ),
                Err(e) => warn!(
                    channel = notifier.channel(),
                    household = %insight.forecast.household_id(),
                    recipient = %recipient.email,
                    error = %e,
                    "Insight delivery failed"
                ),
            }
        })
    }
}
