//! Test utilities for homewatt-core
//!
//! This module provides a mock agent server speaking both the
//! OpenAI-compatible (incl. Azure deployment paths) and Ollama APIs, for
//! development and integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// How the mock server answers agent calls
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Well-formed responses for both roles
    Healthy,
    /// Every call returns this HTTP status
    Status(u16),
    /// The first `n` calls return `status`, later calls succeed
    FailFirst { n: u32, status: u16 },
    /// 200 with a body the agent parser rejects
    Garbage,
    /// Sleep before answering
    Slow(Duration),
}

#[derive(Clone)]
struct ServerState {
    behavior: MockBehavior,
    calls: Arc<AtomicU32>,
}

/// Mock reasoning-agent server for testing and development
pub struct MockAgentServer {
    addr: SocketAddr,
    calls: Arc<AtomicU32>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockAgentServer {
    /// Start a healthy mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::Healthy).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let calls = Arc::new(AtomicU32::new(0));
        let state = ServerState {
            behavior,
            calls: calls.clone(),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/openai/deployments", get(handle_models))
            .route(
                "/openai/deployments/:deployment/chat/completions",
                post(handle_chat),
            )
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            calls,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Agent calls received so far (health checks excluded)
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockAgentServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({ "data": [{ "id": "gpt-4o-mini", "object": "model" }] }))
}

async fn handle_tags() -> Json<Value> {
    Json(json!({ "models": [{ "name": "llama3.2:latest", "size": 4_000_000_000u64 }] }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

async fn handle_chat(State(state): State<ServerState>, Json(request): Json<ChatRequest>) -> Response {
    let prompt: String = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    match answer(&state, &prompt).await {
        Ok(content) => Json(json!({
            "id": "chatcmpl-mock",
            "model": request.model.unwrap_or_else(|| "azure-deployment".to_string()),
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Err(status) => error_response(status),
    }
}

async fn handle_generate(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    match answer(&state, &request.prompt).await {
        Ok(content) => Json(json!({
            "model": request.model,
            "response": content,
            "done": true
        }))
        .into_response(),
        Err(status) => error_response(status),
    }
}

fn error_response(status: StatusCode) -> Response {
    (status, Json(json!({ "error": { "message": "mock failure" } }))).into_response()
}

/// Apply the configured behavior, then produce the model text for `prompt`
async fn answer(state: &ServerState, prompt: &str) -> Result<String, StatusCode> {
    let call = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
    let status = |code: u16| StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match &state.behavior {
        MockBehavior::Healthy => {}
        MockBehavior::Status(code) => return Err(status(*code)),
        MockBehavior::FailFirst { n, status: code } if call <= *n => return Err(status(*code)),
        MockBehavior::FailFirst { .. } => {}
        MockBehavior::Garbage => return Ok("I cannot answer that right now.".to_string()),
        MockBehavior::Slow(delay) => tokio::time::sleep(*delay).await,
    }

    Ok(respond_to_prompt(prompt))
}

/// Detect the agent role from the prompt and answer in its response shape
///
/// These patterns match the prompt files in prompts/*.md
fn respond_to_prompt(prompt: &str) -> String {
    let predicted = extract_line_value(prompt, "Predicted consumption: ")
        .and_then(|v| v.trim_end_matches(" kWh").parse::<f64>().ok())
        .unwrap_or(0.0);

    if prompt.contains("Energy Advisor") {
        json!({
            "explanation": "Shift flexible loads away from the evening peak.",
            "actions": [
                {
                    "action_text": "Run the dishwasher after 22:00",
                    "priority": 2,
                    "appliance": "Dishwasher",
                    "estimated_kwh_saving": 0.3
                },
                {
                    "action_text": "Raise the AC setpoint to 25°C",
                    "priority": 1,
                    "appliance": "Air Conditioning",
                    "estimated_kwh_saving": (predicted * 0.1 * 100.0).round() / 100.0
                },
                {
                    "action_text": "run the dishwasher after 22:00.",
                    "priority": 3
                }
            ]
        })
        .to_string()
    } else {
        // Wrapped in prose and fences, the way real models often answer
        format!(
            "Here is the analysis:\n```json\n{}\n```",
            json!({
                "explanation": format!(
                    "Tomorrow is forecast at {:.2} kWh, in line with recent usage.",
                    predicted
                )
            })
        )
    }
}

fn extract_line_value<'a>(prompt: &'a str, prefix: &str) -> Option<&'a str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}
