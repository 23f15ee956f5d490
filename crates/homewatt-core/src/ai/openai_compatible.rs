//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI and Azure OpenAI deployments
//! - vLLM (http://localhost:8000)
//! - LocalAI / llama-server (http://localhost:8080)
//! - Docker Model Runner (http://localhost:12434)
//!
//! Azure-style endpoints address a deployment instead of a model:
//! `POST {endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
//! and authenticate with an `api-key` header rather than a bearer token.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::prompts::PromptLibrary;

use super::parsing::parse_agent_response;
use super::request::{build_prompt, RenderedPrompt};
use super::types::{AgentMessage, AgentRequest};
use super::AgentAdapter;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default Azure OpenAI API version
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// How the endpoint expects requests to be addressed
#[derive(Debug, Clone, PartialEq)]
enum Flavor {
    /// `{base}/v1/chat/completions`, bearer auth
    OpenAI,
    /// `{base}/openai/deployments/{model}/chat/completions`, `api-key` header
    Azure { api_version: String },
}

/// OpenAI-compatible backend
///
/// # Example
///
/// ```rust,ignore
/// // vLLM
/// let backend = OpenAICompatibleBackend::new("http://192.168.1.100:8000", "llama3.2");
///
/// // Azure OpenAI
/// let backend = OpenAICompatibleBackend::azure(
///     "https://my-resource.openai.azure.com",
///     "gpt-4o-mini",
///     "secret",
///     "2024-06-01",
/// );
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    flavor: Flavor,
    timeout: Duration,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: build_client(DEFAULT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            flavor: Flavor::OpenAI,
            timeout: DEFAULT_TIMEOUT,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Create with an API key (sent as a bearer token)
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Create for an Azure OpenAI deployment
    pub fn azure(endpoint: &str, deployment: &str, api_key: &str, api_version: &str) -> Self {
        let mut backend = Self::with_api_key(endpoint, deployment, api_key);
        backend.flavor = Flavor::Azure {
            api_version: api_version.to_string(),
        };
        backend
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = build_client(timeout);
        self.timeout = timeout;
        self
    }

    /// Share a prompt library with other backends
    pub fn with_prompts(mut self, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        let mut backend = self.clone();
        backend.model = model.to_string();
        backend
    }

    pub fn is_azure(&self) -> bool {
        matches!(self.flavor, Flavor::Azure { .. })
    }

    fn completions_url(&self) -> String {
        match &self.flavor {
            Flavor::OpenAI => format!("{}/v1/chat/completions", self.base_url),
            Flavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, api_version
            ),
        }
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &RenderedPrompt) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: prompt.system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.user.clone(),
        });

        let request = ChatCompletionRequest {
            model: match self.flavor {
                Flavor::OpenAI => Some(self.model.clone()),
                Flavor::Azure { .. } => None,
            },
            messages,
            temperature: Some(0.2),
            max_tokens: Some(800),
            stream: false,
        };

        let mut req_builder = self.http_client.post(self.completions_url()).json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = match self.flavor {
                Flavor::OpenAI => req_builder.header("Authorization", format!("Bearer {}", api_key)),
                Flavor::Azure { .. } => req_builder.header("api-key", api_key),
            };
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(&e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status, &body));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::from_reqwest(&e, self.timeout))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AgentError::Parse("no choices in chat completion response".into()))
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    /// Omitted for Azure, where the deployment is in the URL
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AgentAdapter for OpenAICompatibleBackend {
    async fn call(&self, request: &AgentRequest) -> Result<AgentMessage, AgentError> {
        let prompt = build_prompt(&self.prompts, request)?;
        let response = self.chat_completion(&prompt).await?;
        debug!(role = %request.role, "OpenAI-compatible agent response: {}", response);
        parse_agent_response(request.role, &request.forecast, &response)
    }

    async fn health_check(&self) -> bool {
        let url = match &self.flavor {
            Flavor::OpenAI => format!("{}/v1/models", self.base_url),
            Flavor::Azure { api_version } => format!(
                "{}/openai/deployments?api-version={}",
                self.base_url, api_version
            ),
        };

        let mut req = self.http_client.get(url);
        if let Some(ref api_key) = self.api_key {
            req = match self.flavor {
                Flavor::OpenAI => req.header("Authorization", format!("Bearer {}", api_key)),
                Flavor::Azure { .. } => req.header("api-key", api_key),
            };
        }
        if let Ok(resp) = req.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Try /health (common for Docker Model Runner, LocalAI)
        if let Ok(resp) = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OpenAICompatibleBackend::new("http://localhost:12434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:12434");
        assert_eq!(backend.model(), "llama3.2");
        assert!(!backend.is_azure());
    }

    #[test]
    fn test_completions_url() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000", "llama3.2");
        assert_eq!(
            backend.completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );

        let azure = OpenAICompatibleBackend::azure(
            "https://res.openai.azure.com/",
            "gpt-4o-mini",
            "k",
            DEFAULT_API_VERSION,
        );
        assert!(azure.is_azure());
        assert_eq!(
            azure.completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_with_model_keeps_settings() {
        let backend = OpenAICompatibleBackend::with_api_key("http://h", "a", "sk-test")
            .with_timeout(Duration::from_secs(5));
        let other = backend.with_model("b");
        assert_eq!(other.model(), "b");
        assert_eq!(other.api_key.as_deref(), Some("sk-test"));
        assert_eq!(other.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:1", "llama3.2")
            .with_timeout(Duration::from_secs(2));
        assert!(!backend.health_check().await);
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: None,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
            }],
            temperature: Some(0.2),
            max_tokens: None,
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-123",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"explanation\": \"ok\"}"},
                "finish_reason": "stop"
            }]
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("{\"explanation\": \"ok\"}")
        );
    }
}
