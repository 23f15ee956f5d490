//! Insight Orchestrator
//!
//! Runs the two-stage agent pipeline over one Forecast and produces one
//! Insight, with bounded retries and per-stage degradation.
//!
//! # State machine
//!
//! ```text
//! ┌───────┐   ┌──────────────┐   ┌──────────┐   ┌─────────┐   ┌──────┐
//! │ Start ├──►│ Interpreting ├──►│ Advising ├──►│ Merging ├──►│ Done │
//! └───────┘   └──┬────────▲──┘   └──┬────▲──┘   └────▲────┘   └──────┘
//!                │transient│        │    │           │
//!                ▼         │        ▼    │           │
//!             ┌────────────┴┐   ┌────────┴───┐       │
//!             │  RetryWait  │   │ RetryWait  │       │
//!             └──────┬──────┘   └─────┬──────┘       │
//!        exhausted / │ non-transient  │ / deadline   │
//!                    ▼                ▼              │
//!             ┌──────────────────────────────┐       │
//!             │ Degraded(stage) ─► next stage├───────┘
//!             └──────────────────────────────┘
//! ```
//!
//! The Advisor only starts after the Interpreter stage has finished, either
//! with an explanation or degraded. A degraded Interpreter leaves the Advisor
//! without a prior message; a degraded Advisor leaves the Insight without
//! actions. Only cancellation aborts the invocation.
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = InsightOrchestrator::new(Arc::new(agent), config.orchestrator.clone());
//! let insight = orchestrator.orchestrate(&forecast, None, &CancelSignal::never()).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ai::{AgentAdapter, AgentMessage, AgentRequest, AgentRole};
use crate::config::OrchestratorConfig;
use crate::error::{AgentError, Error, Result};
use crate::models::{Forecast, HomeProfile};

use super::cancel::CancelSignal;
use super::merge::merge_actions;
use super::types::{DegradeReason, Insight, StageDegradation, FALLBACK_EXPLANATION};

/// One state of an orchestration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Stage {
    Start,
    Interpreting {
        attempt: u32,
    },
    Advising {
        attempt: u32,
    },
    /// Waiting before attempt number `attempt` of `stage`
    RetryWait {
        stage: AgentRole,
        attempt: u32,
        #[serde(rename = "delay_ms", serialize_with = "serialize_millis")]
        delay: Duration,
    },
    Degraded {
        stage: AgentRole,
        reason: DegradeReason,
    },
    Merging,
    Done,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl Stage {
    fn calling(role: AgentRole, attempt: u32) -> Self {
        match role {
            AgentRole::Interpreter => Stage::Interpreting { attempt },
            AgentRole::Advisor => Stage::Advising { attempt },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Start => f.write_str("start"),
            Stage::Interpreting { attempt } => write!(f, "interpreting#{}", attempt),
            Stage::Advising { attempt } => write!(f, "advising#{}", attempt),
            Stage::RetryWait {
                stage,
                attempt,
                delay,
            } => write!(f, "retry_wait({} #{}, {:?})", stage, attempt, delay),
            Stage::Degraded { stage, .. } => write!(f, "degraded({})", stage),
            Stage::Merging => f.write_str("merging"),
            Stage::Done => f.write_str("done"),
        }
    }
}

/// An Insight plus how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    pub insight: Insight,
    /// Every state visited, in order
    pub trace: Vec<Stage>,
    /// Agent calls actually issued
    pub calls: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

/// Outcome of one attempted agent call
enum CallFailure {
    Agent(AgentError),
    Deadline,
}

/// Per-invocation working state; dropped when the invocation ends
struct Run<'a> {
    forecast: &'a Forecast,
    profile: Option<&'a HomeProfile>,
    cancel: &'a CancelSignal,
    deadline_at: Instant,
    interpretation: Option<AgentMessage>,
    advice: Option<AgentMessage>,
    degraded: Vec<StageDegradation>,
    trace: Vec<Stage>,
    calls: u32,
}

/// Coordinates the Interpreter and Advisor agents for one Forecast at a time
///
/// Holds only configuration and a shared adapter, so one instance can serve
/// any number of concurrent invocations.
#[derive(Clone)]
pub struct InsightOrchestrator {
    adapter: Arc<dyn AgentAdapter>,
    config: OrchestratorConfig,
}

impl InsightOrchestrator {
    pub fn new(adapter: Arc<dyn AgentAdapter>, config: OrchestratorConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<dyn AgentAdapter> {
        &self.adapter
    }

    /// Produce an Insight for `forecast`
    ///
    /// Agent failures degrade; only cancellation returns an error.
    pub async fn orchestrate(
        &self,
        forecast: &Forecast,
        profile: Option<&HomeProfile>,
        cancel: &CancelSignal,
    ) -> Result<Insight> {
        self.run(forecast, profile, cancel).await.map(|r| r.insight)
    }

    /// Like [`orchestrate`](Self::orchestrate), also returning the transition trace
    pub async fn run(
        &self,
        forecast: &Forecast,
        profile: Option<&HomeProfile>,
        cancel: &CancelSignal,
    ) -> Result<OrchestrationReport> {
        let started = Instant::now();
        let mut run = Run {
            forecast,
            profile,
            cancel,
            deadline_at: started + self.config.deadline,
            interpretation: None,
            advice: None,
            degraded: Vec::new(),
            trace: Vec::new(),
            calls: 0,
        };

        info!(
            household = %forecast.household_id(),
            predicted_kwh = forecast.predicted_kwh(),
            model_version = %forecast.model_version(),
            "Orchestrating insight"
        );

        let mut stage = Stage::Start;
        let insight = loop {
            debug!(household = %forecast.household_id(), stage = %stage, "Orchestrator transition");
            run.trace.push(stage.clone());

            stage = match stage {
                Stage::Start => self.enter(AgentRole::Interpreter, &run),

                Stage::Interpreting { attempt } => {
                    self.attempt(&mut run, AgentRole::Interpreter, attempt)
                        .await?
                }

                Stage::Advising { attempt } => {
                    self.attempt(&mut run, AgentRole::Advisor, attempt).await?
                }

                Stage::RetryWait {
                    stage: role,
                    attempt,
                    delay,
                } => {
                    if Instant::now() + delay >= run.deadline_at {
                        Stage::Degraded {
                            stage: role,
                            reason: DegradeReason::DeadlineExceeded,
                        }
                    } else {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(self.cancelled(forecast)),
                            _ = tokio::time::sleep(delay) => Stage::calling(role, attempt),
                        }
                    }
                }

                Stage::Degraded {
                    stage: role,
                    reason,
                } => {
                    warn!(
                        household = %forecast.household_id(),
                        stage = %role,
                        reason = %reason,
                        "Agent stage degraded"
                    );
                    run.degraded.push(StageDegradation { role, reason });
                    match role {
                        AgentRole::Interpreter => self.enter(AgentRole::Advisor, &run),
                        AgentRole::Advisor => Stage::Merging,
                    }
                }

                Stage::Merging => {
                    run.trace.push(Stage::Done);
                    break self.merge(&mut run);
                }

                Stage::Done => unreachable!("loop exits at merging"),
            };
        };

        let elapsed = started.elapsed();
        info!(
            household = %forecast.household_id(),
            degraded = insight.degraded,
            actions = insight.ordered_actions.len(),
            calls = run.calls,
            elapsed_ms = elapsed.as_millis() as u64,
            "Insight ready"
        );

        Ok(OrchestrationReport {
            insight,
            trace: run.trace,
            calls: run.calls,
            elapsed,
        })
    }

    /// First attempt of a stage, unless the deadline already passed
    fn enter(&self, role: AgentRole, run: &Run<'_>) -> Stage {
        if Instant::now() >= run.deadline_at {
            Stage::Degraded {
                stage: role,
                reason: DegradeReason::DeadlineExceeded,
            }
        } else {
            Stage::calling(role, 1)
        }
    }

    /// Call the agent once and decide the next state
    async fn attempt(&self, run: &mut Run<'_>, role: AgentRole, attempt: u32) -> Result<Stage> {
        let prior = match role {
            AgentRole::Interpreter => None,
            AgentRole::Advisor => run.interpretation.as_ref(),
        };
        let request =
            AgentRequest::new(role, run.forecast, prior).with_profile(run.profile.cloned());

        run.calls += 1;
        let outcome = self.call(&request, run.deadline_at, run.cancel).await;

        let failure = match outcome {
            Ok(Ok(message)) => {
                debug!(
                    household = %run.forecast.household_id(),
                    stage = %role,
                    attempt,
                    actions = message.structured_actions.len(),
                    "Agent call succeeded"
                );
                return Ok(match role {
                    AgentRole::Interpreter => {
                        run.interpretation = Some(message);
                        self.enter(AgentRole::Advisor, run)
                    }
                    AgentRole::Advisor => {
                        run.advice = Some(message);
                        Stage::Merging
                    }
                });
            }
            Ok(Err(failure)) => failure,
            Err(e) => return Err(e),
        };

        Ok(match failure {
            CallFailure::Deadline => Stage::Degraded {
                stage: role,
                reason: DegradeReason::DeadlineExceeded,
            },
            CallFailure::Agent(error) if error.is_transient() => {
                if attempt < self.config.max_retries {
                    let delay = self.backoff(attempt);
                    warn!(
                        household = %run.forecast.household_id(),
                        stage = %role,
                        attempt,
                        kind = error.kind(),
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Transient agent failure, retrying"
                    );
                    Stage::RetryWait {
                        stage: role,
                        attempt: attempt + 1,
                        delay,
                    }
                } else {
                    Stage::Degraded {
                        stage: role,
                        reason: DegradeReason::RetriesExhausted {
                            attempts: attempt,
                            last_error: error.to_string(),
                        },
                    }
                }
            }
            CallFailure::Agent(error) => {
                warn!(
                    household = %run.forecast.household_id(),
                    stage = %role,
                    attempt,
                    kind = error.kind(),
                    error = %error,
                    "Agent failure is not retryable"
                );
                Stage::Degraded {
                    stage: role,
                    reason: DegradeReason::NonTransient {
                        error: error.to_string(),
                    },
                }
            }
        })
    }

    /// One bounded agent call, racing cancellation
    ///
    /// The outer `Err` is cancellation; the inner result is the call itself.
    async fn call(
        &self,
        request: &AgentRequest,
        deadline_at: Instant,
        cancel: &CancelSignal,
    ) -> Result<std::result::Result<AgentMessage, CallFailure>> {
        let remaining = deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(Err(CallFailure::Deadline));
        }
        let budget = self.config.call_timeout.min(remaining);
        let cut_by_deadline = budget < self.config.call_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled(&request.forecast)),
            result = tokio::time::timeout(budget, self.adapter.call(request)) => Ok(match result {
                Ok(Ok(message)) => Ok(message),
                Ok(Err(error)) => Err(CallFailure::Agent(error)),
                Err(_) if cut_by_deadline => Err(CallFailure::Deadline),
                Err(_) => Err(CallFailure::Agent(AgentError::Timeout(budget))),
            }),
        }
    }

    /// Exponential backoff after failed attempt number `attempt`
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_max)
    }

    fn merge(&self, run: &mut Run<'_>) -> Insight {
        let explanation_text = run
            .interpretation
            .as_ref()
            .map(|m| m.output_text.clone())
            .unwrap_or_else(|| FALLBACK_EXPLANATION.to_string());

        let ordered_actions = run
            .advice
            .as_ref()
            .map(|m| merge_actions(&m.structured_actions, self.config.max_actions))
            .unwrap_or_default();

        let degraded_stages = std::mem::take(&mut run.degraded);
        Insight {
            forecast: run.forecast.clone(),
            explanation_text,
            ordered_actions,
            generated_at: Utc::now(),
            degraded: !degraded_stages.is_empty(),
            degraded_stages,
        }
    }

    fn cancelled(&self, forecast: &Forecast) -> Error {
        info!(household = %forecast.household_id(), "Orchestration cancelled");
        Error::Cancelled
    }
}
