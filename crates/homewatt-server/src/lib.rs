//! Homewatt Web Server
//!
//! Axum-based REST API over the Homewatt forecast and insight pipeline.
//! This is the presentation boundary: handlers turn Insights into JSON and
//! decide whether to dispatch them; the orchestrator never does.
//!
//! Security features:
//! - Bearer API-key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use homewatt_core::ai::{AgentAdapter, AgentClient};
use homewatt_core::forecast::ModelRegistry;
use homewatt_core::notify::{Dispatcher, EmailNotifier};
use homewatt_core::pipeline::EnergyPipeline;
use homewatt_core::weather::WeatherClient;
use homewatt_core::AppConfig;

mod handlers;

/// Comma-separated API keys accepted as `Authorization: Bearer <key>`
pub const API_KEYS_ENV: &str = "HOMEWATT_API_KEYS";

/// Comma-separated CORS origins
pub const ALLOWED_ORIGINS_ENV: &str = "HOMEWATT_ALLOWED_ORIGINS";

/// Maximum request body size (samples can be large)
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys, sent as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

impl ServerConfig {
    /// Read API keys and CORS origins from the environment
    pub fn from_env() -> Self {
        Self {
            require_auth: true,
            allowed_origins: split_list(std::env::var(ALLOWED_ORIGINS_ENV).ok().as_deref()),
            api_keys: split_list(std::env::var(API_KEYS_ENV).ok().as_deref()),
        }
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: EnergyPipeline,
    pub agent: AgentClient,
    /// Report delivery; `None` when SMTP is not configured
    pub dispatcher: Option<Dispatcher>,
    /// Temperature lookup for requests that do not carry one
    pub weather: Option<WeatherClient>,
}

impl AppState {
    pub fn new(pipeline: EnergyPipeline, agent: AgentClient, config: ServerConfig) -> Self {
        Self {
            config,
            pipeline,
            agent,
            dispatcher: None,
            weather: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_weather(mut self, weather: WeatherClient) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Build every long-lived component from process configuration
    pub fn from_app_config(app: &AppConfig, config: ServerConfig) -> homewatt_core::Result<Self> {
        let registry = ModelRegistry::load(app.model_registry.as_deref())?;
        let agent = AgentClient::from_config(&app.agent)?;
        let pipeline = EnergyPipeline::new(
            Arc::new(registry),
            Arc::new(agent.clone()),
            app.orchestrator.clone(),
        );

        let mut state = Self::new(pipeline, agent, config).with_weather(WeatherClient::default());
        if let Some(smtp) = &app.smtp {
            let notifier = EmailNotifier::new(smtp.clone())?;
            state = state.with_dispatcher(Dispatcher::new(Arc::new(notifier)));
        }
        Ok(state)
    }
}

/// Authentication middleware - validates Bearer API keys
///
/// API keys are compared using constant-time comparison to prevent timing
/// attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && provided_bytes.ct_eq(key_bytes).into() {
            return true;
        }
    }
    false
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/forecast", post(handlers::forecast))
        .route("/optimize", post(handlers::optimize))
        .route("/insights/email", post(handlers::email_insight))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health stays open for probes
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    if !state.config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if state.config.api_keys.is_empty() {
        warn!("⚠️  Authentication required but no API keys configured (set {})", API_KEYS_ENV);
    }

    check_agent_connection(&state.agent).await;
    if state.dispatcher.is_none() {
        info!("ℹ️  Email delivery not configured (set HOMEWATT_SMTP_HOST to enable)");
    }

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log agent backend connection status
async fn check_agent_connection(agent: &AgentClient) {
    if agent.health_check().await {
        info!(
            "✅ Agent backend connected: {} at {} (model: {})",
            agent.backend_name(),
            agent.host(),
            agent.model()
        );
    } else {
        warn!(
            "⚠️  Agent backend configured but not responding: {} at {} - insights will degrade",
            agent.backend_name(),
            agent.host()
        );
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<homewatt_core::Error> for AppError {
    fn from(err: homewatt_core::Error) -> Self {
        use homewatt_core::Error;

        match err {
            Error::InvalidInput(msg) => Self::bad_request(&msg),
            Error::ModelUnavailable(msg) => {
                warn!(error = %msg, "Forecast model unavailable");
                Self::unavailable("Forecast model unavailable")
            }
            err => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(err.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests;
