//! Insight Orchestrator - Forecast to Insight
//!
//! Turns one immutable [`Forecast`](crate::models::Forecast) into one
//! [`Insight`] by running two reasoning agents in sequence:
//!
//! - **Interpreter** - explains the forecast in plain language
//! - **Advisor** - proposes prioritized actions, given the explanation
//!
//! Transient agent failures are retried with backoff; a stage that still
//! fails is degraded rather than failing the invocation. The forecast value
//! always survives into the Insight.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use homewatt_core::insights::{CancelSignal, InsightOrchestrator};
//!
//! let orchestrator = InsightOrchestrator::new(Arc::new(agent), config.orchestrator.clone());
//! let (handle, signal) = CancelSignal::new();
//! let insight = orchestrator.orchestrate(&forecast, None, &signal).await?;
//! ```

pub mod cancel;
pub mod merge;
pub mod orchestrator;
pub mod types;

pub use cancel::{CancelHandle, CancelSignal};
pub use merge::{merge_actions, normalize_action_text};
pub use orchestrator::{InsightOrchestrator, OrchestrationReport, Stage};
pub use types::{DegradeReason, Insight, StageDegradation, FALLBACK_EXPLANATION};
