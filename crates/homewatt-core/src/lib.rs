//! Homewatt Core Library
//!
//! Shared functionality for the Homewatt home energy assistant:
//! - Smart-meter telemetry loading and validation
//! - Feature assembly and a versioned forecast model registry
//! - Pluggable reasoning-agent backends (OpenAI-compatible, Azure, Ollama)
//! - Prompt library for customizable agent prompts
//! - Insight orchestrator with retries, deadlines and graceful degradation
//! - Weather context and report delivery by email

pub mod ai;
pub mod config;
pub mod error;
pub mod forecast;
pub mod insights;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod prompts;
pub mod telemetry;
pub mod weather;

/// Test utilities including a mock agent server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AgentAdapter, AgentClient, AgentMessage, AgentRequest, AgentRole, MockBackend, OllamaBackend,
    OpenAICompatibleBackend, RecommendedAction,
};
pub use config::{AgentBackendKind, AgentConfig, AppConfig, OrchestratorConfig, SmtpConfig};
pub use error::{AgentError, Error, Result};
pub use forecast::{FeatureAssembler, FeatureContext, ForecastModel, ModelRegistry};
pub use insights::{
    CancelHandle, CancelSignal, DegradeReason, Insight, InsightOrchestrator, OrchestrationReport,
    Stage, StageDegradation,
};
pub use models::{FeatureVector, Forecast, HomeProfile, Location, Season, Tariff, UsageSample};
pub use notify::{Dispatcher, EmailNotifier, Notifier, Recipient};
pub use pipeline::EnergyPipeline;
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use telemetry::{SampleGroups, UsageSeries};
pub use weather::{DailyWeather, WeatherClient};
