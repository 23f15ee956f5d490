//! Error types for Homewatt

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad telemetry or features; rejected before reaching the model
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The forecast model cannot be loaded or has no entry for the target
    #[error("Forecast model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// The caller cancelled the invocation; nothing was produced
    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a single reasoning-agent call
///
/// `Timeout`, `RateLimited` and `Unavailable` are transient and retried by the
/// orchestrator. `Auth` and `Parse` are not.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error("agent rate limited: {0}")]
    RateLimited(String),

    #[error("agent service unavailable: {0}")]
    Unavailable(String),

    #[error("agent authentication failed: {0}")]
    Auth(String),

    #[error("malformed agent response: {0}")]
    Parse(String),
}

impl AgentError {
    /// Whether the orchestrator may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout(_) | AgentError::RateLimited(_) | AgentError::Unavailable(_)
        )
    }

    /// Short machine-readable label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Timeout(_) => "timeout",
            AgentError::RateLimited(_) => "rate_limited",
            AgentError::Unavailable(_) => "unavailable",
            AgentError::Auth(_) => "auth",
            AgentError::Parse(_) => "parse",
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(timeout)
        } else if err.is_decode() {
            AgentError::Parse(err.to_string())
        } else {
            AgentError::Unavailable(err.to_string())
        }
    }

    /// Classify a non-success HTTP status returned by an agent endpoint
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
        match status.as_u16() {
            401 | 403 => AgentError::Auth(detail),
            429 => AgentError::RateLimited(detail),
            408 => AgentError::Timeout(Duration::ZERO),
            s if s >= 500 => AgentError::Unavailable(detail),
            _ => AgentError::Parse(detail),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
