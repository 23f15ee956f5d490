//! Pluggable reasoning-agent backend abstraction
//!
//! The Interpreter and Advisor agents are two roles behind one adapter
//! interface, not two types. A role is a prompt plus a request-shaping
//! function (see [`request`]); every backend serves every role.
//!
//! # Architecture
//!
//! - `AgentAdapter` trait: one agent call, `invoke(role, forecast, prior)`
//! - `AgentClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend` (incl. Azure),
//!   `OllamaBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = AppConfig::from_env()?;
//! let agent = AgentClient::from_config(&config.agent)?;
//!
//! let explanation = agent.invoke(AgentRole::Interpreter, &forecast, None).await?;
//! let advice = agent
//!     .invoke(AgentRole::Advisor, &forecast, Some(&explanation))
//!     .await?;
//! ```

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod request;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::{OpenAICompatibleBackend, DEFAULT_API_VERSION};
pub use types::*;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::{AgentBackendKind, AgentConfig};
use crate::error::{AgentError, Error, Result};
use crate::models::Forecast;
use crate::prompts::PromptLibrary;

/// Trait defining one reasoning-agent call
///
/// Backends must be Send + Sync to allow use across async tasks. They
/// classify their own failures into [`AgentError`]; retry policy belongs to
/// the orchestrator, not the adapter.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Perform one call for a fully shaped request
    async fn call(&self, request: &AgentRequest) -> std::result::Result<AgentMessage, AgentError>;

    /// Call the agent for `role` about `forecast`, given the prior stage's output
    async fn invoke(
        &self,
        role: AgentRole,
        forecast: &Forecast,
        prior: Option<&AgentMessage>,
    ) -> std::result::Result<AgentMessage, AgentError> {
        self.call(&AgentRequest::new(role, forecast, prior)).await
    }

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model or deployment name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete agent client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AgentClient {
    /// OpenAI-compatible or Azure OpenAI backend
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AgentClient {
    /// Create an agent client from configuration
    ///
    /// Every HTTP backend requires an endpoint; `mock` needs nothing.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Self::from_config_with_prompts(config, Arc::new(RwLock::new(PromptLibrary::new())))
    }

    /// Same as [`AgentClient::from_config`] with an explicit prompt library
    pub fn from_config_with_prompts(
        config: &AgentConfig,
        prompts: Arc<RwLock<PromptLibrary>>,
    ) -> Result<Self> {
        let endpoint = || {
            config.endpoint.as_deref().ok_or_else(|| {
                Error::Config(format!(
                    "HOMEWATT_AGENT_ENDPOINT is required for the {} backend",
                    config.backend
                ))
            })
        };

        let client = match config.backend {
            AgentBackendKind::OpenAICompatible => {
                let backend = match config.api_key.as_deref() {
                    Some(key) => OpenAICompatibleBackend::with_api_key(
                        endpoint()?,
                        &config.deployment_name,
                        key,
                    ),
                    None => OpenAICompatibleBackend::new(endpoint()?, &config.deployment_name),
                };
                AgentClient::OpenAICompatible(
                    backend.with_timeout(config.timeout).with_prompts(prompts),
                )
            }
            AgentBackendKind::Azure => {
                let key = config.api_key.as_deref().ok_or_else(|| {
                    Error::Config("HOMEWATT_AGENT_API_KEY is required for the azure backend".into())
                })?;
                AgentClient::OpenAICompatible(
                    OpenAICompatibleBackend::azure(
                        endpoint()?,
                        &config.deployment_name,
                        key,
                        &config.api_version,
                    )
                    .with_timeout(config.timeout)
                    .with_prompts(prompts),
                )
            }
            AgentBackendKind::Ollama => AgentClient::Ollama(
                OllamaBackend::new(endpoint()?, &config.deployment_name)
                    .with_timeout(config.timeout)
                    .with_prompts(prompts),
            ),
            AgentBackendKind::Mock => AgentClient::Mock(MockBackend::new()),
        };

        tracing::debug!(
            backend = %config.backend,
            host = client.host(),
            model = client.model(),
            "Configured agent backend"
        );
        Ok(client)
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AgentClient::Mock(MockBackend::new())
    }

    /// Backend kind label (for health output)
    pub fn backend_name(&self) -> &'static str {
        match self {
            AgentClient::OpenAICompatible(b) if b.is_azure() => "azure",
            AgentClient::OpenAICompatible(_) => "openai_compatible",
            AgentClient::Ollama(_) => "ollama",
            AgentClient::Mock(_) => "mock",
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AgentClient::OpenAICompatible(b) => AgentClient::OpenAICompatible(b.with_model(model)),
            AgentClient::Ollama(b) => AgentClient::Ollama(b.with_model(model)),
            AgentClient::Mock(b) => AgentClient::Mock(b.clone()),
        }
    }
}

// Implement AgentAdapter for AgentClient by delegating to the inner backend
#[async_trait]
impl AgentAdapter for AgentClient {
    async fn call(&self, request: &AgentRequest) -> std::result::Result<AgentMessage, AgentError> {
        match self {
            AgentClient::OpenAICompatible(b) => b.call(request).await,
            AgentClient::Ollama(b) => b.call(request).await,
            AgentClient::Mock(b) => b.call(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AgentClient::OpenAICompatible(b) => b.health_check().await,
            AgentClient::Ollama(b) => b.health_check().await,
            AgentClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AgentClient::OpenAICompatible(b) => b.model(),
            AgentClient::Ollama(b) => b.model(),
            AgentClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AgentClient::OpenAICompatible(b) => b.host(),
            AgentClient::Ollama(b) => b.host(),
            AgentClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_client_mock() {
        let client = AgentClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
        assert_eq!(client.backend_name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AgentClient::mock();
        assert!(client.health_check().await);
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let config = AgentConfig {
            backend: AgentBackendKind::OpenAICompatible,
            endpoint: None,
            ..AgentConfig::default()
        };
        assert!(matches!(
            AgentClient::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_config_azure() {
        let config = AgentConfig {
            backend: AgentBackendKind::Azure,
            endpoint: Some("https://res.openai.azure.com".into()),
            api_key: Some("secret".into()),
            ..AgentConfig::default()
        };
        let client = AgentClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "azure");
        assert_eq!(client.model(), "gpt-4o-mini");

        let no_key = AgentConfig {
            api_key: None,
            ..config
        };
        assert!(AgentClient::from_config(&no_key).is_err());
    }

    #[test]
    fn test_from_config_ollama() {
        let config = AgentConfig {
            backend: AgentBackendKind::Ollama,
            endpoint: Some("http://localhost:11434".into()),
            deployment_name: "llama3.2".into(),
            ..AgentConfig::default()
        };
        let client = AgentClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "ollama");
        assert_eq!(client.with_model("gemma3").model(), "gemma3");
    }
}
