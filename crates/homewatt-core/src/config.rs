//! Process-wide configuration
//!
//! Loaded once at startup into an [`AppConfig`] and handed to constructors;
//! business logic never reads the environment itself.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config` / `HOMEWATT_CONFIG`)
//! 3. `HOMEWATT_*` environment variables
//!
//! ```toml
//! [agent]
//! backend = "azure"
//! endpoint = "https://my-resource.openai.azure.com"
//! deployment_name = "gpt-4o-mini"
//! timeout_secs = 30
//!
//! [orchestrator]
//! deadline_secs = 90
//! max_retries = 3
//! max_actions = 5
//!
//! [smtp]
//! host = "smtp.gmail.com"
//! port = 587
//! from = "Homewatt <energy@example.com>"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::ai::DEFAULT_API_VERSION;
use crate::error::{Error, Result};

/// Environment variable names
pub const CONFIG_ENV: &str = "HOMEWATT_CONFIG";
pub const AGENT_BACKEND_ENV: &str = "HOMEWATT_AGENT_BACKEND";
pub const AGENT_ENDPOINT_ENV: &str = "HOMEWATT_AGENT_ENDPOINT";
pub const AGENT_DEPLOYMENT_ENV: &str = "HOMEWATT_AGENT_DEPLOYMENT";
pub const AGENT_API_KEY_ENV: &str = "HOMEWATT_AGENT_API_KEY";
pub const AGENT_API_VERSION_ENV: &str = "HOMEWATT_AGENT_API_VERSION";
pub const AGENT_TIMEOUT_ENV: &str = "HOMEWATT_AGENT_TIMEOUT_S";
pub const DEADLINE_ENV: &str = "HOMEWATT_INVOCATION_DEADLINE_S";
pub const MAX_RETRIES_ENV: &str = "HOMEWATT_MAX_RETRIES";
pub const MAX_ACTIONS_ENV: &str = "HOMEWATT_MAX_ACTIONS";
pub const MODEL_REGISTRY_ENV: &str = "HOMEWATT_MODEL_REGISTRY";
pub const SMTP_HOST_ENV: &str = "HOMEWATT_SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "HOMEWATT_SMTP_PORT";
pub const SMTP_USER_ENV: &str = "HOMEWATT_SMTP_USER";
pub const SMTP_PASSWORD_ENV: &str = "HOMEWATT_SMTP_PASSWORD";
pub const SMTP_FROM_ENV: &str = "HOMEWATT_SMTP_FROM";

/// Which agent backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentBackendKind {
    #[serde(rename = "openai_compatible")]
    OpenAICompatible,
    Azure,
    Ollama,
    Mock,
}

impl AgentBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAICompatible => "openai_compatible",
            Self::Azure => "azure",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for AgentBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Ok(Self::OpenAICompatible)
            }
            "azure" | "azure_openai" => Ok(Self::Azure),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("unknown agent backend '{}'", other))),
        }
    }
}

/// Reasoning-agent endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub backend: AgentBackendKind,
    /// Where the reasoning service lives
    pub endpoint: Option<String>,
    /// Model variant (deployment name for Azure)
    pub deployment_name: String,
    pub api_key: Option<String>,
    pub api_version: String,
    /// Per-call deadline enforced by the HTTP client
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: AgentBackendKind::OpenAICompatible,
            endpoint: None,
            deployment_name: "gpt-4o-mini".to_string(),
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Retry, deadline and merge bounds for one orchestration
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Per-call timeout
    pub call_timeout: Duration,
    /// Whole-invocation deadline
    pub deadline: Duration,
    /// Attempts per stage, first call included
    pub max_retries: u32,
    /// Truncation bound for merged actions
    pub max_actions: usize,
    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(90),
            max_retries: 3,
            max_actions: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

/// Outgoing mail settings
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Mailbox, e.g. `Homewatt <energy@example.com>`
    pub from: String,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub orchestrator: OrchestratorConfig,
    /// Forecast model registry; `None` = embedded default
    pub model_registry: Option<PathBuf>,
    /// Email delivery; `None` disables it
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    /// Load from `HOMEWATT_CONFIG` (if set) and the environment
    pub fn from_env() -> Result<Self> {
        let file = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load(file.as_deref())
    }

    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a TOML file over the defaults (no environment)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid config TOML: {}", e)))?;
        let mut config = Self::default();

        if let Some(agent) = raw.agent {
            if let Some(backend) = agent.backend {
                config.agent.backend = backend;
            }
            if agent.endpoint.is_some() {
                config.agent.endpoint = agent.endpoint;
            }
            if let Some(name) = agent.deployment_name {
                config.agent.deployment_name = name;
            }
            if agent.api_key.is_some() {
                config.agent.api_key = agent.api_key;
            }
            if let Some(version) = agent.api_version {
                config.agent.api_version = version;
            }
            if let Some(secs) = agent.timeout_secs {
                config.set_call_timeout(Duration::from_secs(secs));
            }
        }

        if let Some(orch) = raw.orchestrator {
            if let Some(secs) = orch.deadline_secs {
                config.orchestrator.deadline = Duration::from_secs(secs);
            }
            if let Some(n) = orch.max_retries {
                config.orchestrator.max_retries = n;
            }
            if let Some(n) = orch.max_actions {
                config.orchestrator.max_actions = n;
            }
            if let Some(ms) = orch.backoff_base_ms {
                config.orchestrator.backoff_base = Duration::from_millis(ms);
            }
            if let Some(ms) = orch.backoff_max_ms {
                config.orchestrator.backoff_max = Duration::from_millis(ms);
            }
        }

        if let Some(forecast) = raw.forecast {
            config.model_registry = forecast.model_registry;
        }

        if let Some(smtp) = raw.smtp {
            config.smtp = Some(SmtpConfig {
                host: smtp.host,
                port: smtp.port.unwrap_or(587),
                username: smtp.username,
                password: smtp.password,
                from: smtp.from,
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply `HOMEWATT_*` overrides read through `get`
    pub fn apply_env_with<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(backend) = get(AGENT_BACKEND_ENV) {
            self.agent.backend = backend.parse()?;
        }
        if let Some(endpoint) = get(AGENT_ENDPOINT_ENV) {
            self.agent.endpoint = Some(endpoint);
        }
        if let Some(name) = get(AGENT_DEPLOYMENT_ENV) {
            self.agent.deployment_name = name;
        }
        if let Some(key) = get(AGENT_API_KEY_ENV) {
            self.agent.api_key = Some(key);
        }
        if let Some(version) = get(AGENT_API_VERSION_ENV) {
            self.agent.api_version = version;
        }
        if let Some(secs) = get(AGENT_TIMEOUT_ENV) {
            self.set_call_timeout(Duration::from_secs(parse_number(AGENT_TIMEOUT_ENV, &secs)?));
        }
        if let Some(secs) = get(DEADLINE_ENV) {
            self.orchestrator.deadline = Duration::from_secs(parse_number(DEADLINE_ENV, &secs)?);
        }
        if let Some(n) = get(MAX_RETRIES_ENV) {
            self.orchestrator.max_retries = parse_number(MAX_RETRIES_ENV, &n)?;
        }
        if let Some(n) = get(MAX_ACTIONS_ENV) {
            self.orchestrator.max_actions = parse_number(MAX_ACTIONS_ENV, &n)?;
        }
        if let Some(path) = get(MODEL_REGISTRY_ENV) {
            self.model_registry = Some(PathBuf::from(path));
        }

        if let Some(host) = get(SMTP_HOST_ENV) {
            let port = match get(SMTP_PORT_ENV) {
                Some(p) => parse_number(SMTP_PORT_ENV, &p)?,
                None => self.smtp.as_ref().map(|s| s.port).unwrap_or(587),
            };
            let username = get(SMTP_USER_ENV)
                .or_else(|| self.smtp.as_ref().and_then(|s| s.username.clone()));
            let password = get(SMTP_PASSWORD_ENV)
                .or_else(|| self.smtp.as_ref().and_then(|s| s.password.clone()));
            let from = get(SMTP_FROM_ENV)
                .or_else(|| self.smtp.as_ref().map(|s| s.from.clone()))
                .or_else(|| username.clone())
                .ok_or_else(|| {
                    Error::Config(format!("{} or {} must be set", SMTP_FROM_ENV, SMTP_USER_ENV))
                })?;
            self.smtp = Some(SmtpConfig {
                host,
                port,
                username,
                password,
                from,
            });
        }

        self.validate()
    }

    fn set_call_timeout(&mut self, timeout: Duration) {
        self.agent.timeout = timeout;
        self.orchestrator.call_timeout = timeout;
    }

    fn validate(&self) -> Result<()> {
        if self.orchestrator.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.orchestrator.call_timeout.is_zero() || self.orchestrator.deadline.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    agent: Option<RawAgent>,
    orchestrator: Option<RawOrchestrator>,
    forecast: Option<RawForecast>,
    smtp: Option<RawSmtp>,
}

#[derive(Debug, Deserialize)]
struct RawAgent {
    backend: Option<AgentBackendKind>,
    endpoint: Option<String>,
    deployment_name: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawOrchestrator {
    deadline_secs: Option<u64>,
    max_retries: Option<u32>,
    max_actions: Option<usize>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    model_registry: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawSmtp {
    host: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: String,
}
