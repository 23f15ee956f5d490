//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint. Requests ask for
//! `format: "json"` so local models answer with a bare JSON object.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::prompts::PromptLibrary;

use super::parsing::parse_agent_response;
use super::request::build_prompt;
use super::types::{AgentMessage, AgentRequest};
use super::AgentAdapter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: build_client(DEFAULT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: DEFAULT_TIMEOUT,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
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

    /// Make a generate request
    async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            format: "json".to_string(),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(&e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status, &body));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AgentError::from_reqwest(&e, self.timeout))?;

        Ok(ollama_response.response)
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    format: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AgentAdapter for OllamaBackend {
    async fn call(&self, request: &AgentRequest) -> Result<AgentMessage, AgentError> {
        let prompt = build_prompt(&self.prompts, request)?;
        let response = self.generate(&prompt.combined()).await?;
        debug!(role = %request.role, "Ollama agent response: {}", response);
        parse_agent_response(request.role, &request.forecast, &response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
