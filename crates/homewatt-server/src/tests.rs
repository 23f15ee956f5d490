//! Server API tests

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use homewatt_core::ai::{AgentRole, MockBackend, OpenAICompatibleBackend};
use homewatt_core::config::OrchestratorConfig;
use homewatt_core::error::AgentError;
use homewatt_core::insights::{Insight, FALLBACK_EXPLANATION};
use homewatt_core::notify::{Notifier, Recipient};
use homewatt_core::test_utils::MockAgentServer;
use http_body_util::BodyExt;
use std::sync::Mutex;
use std::time::Duration;
use tower::ServiceExt;

fn test_state(agent: AgentClient) -> AppState {
    let pipeline = EnergyPipeline::new(
        Arc::new(ModelRegistry::embedded().unwrap()),
        Arc::new(agent.clone()),
        OrchestratorConfig {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..OrchestratorConfig::default()
        },
    );
    let config = ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
        ..Default::default()
    };
    AppState::new(pipeline, agent, config)
}

fn setup_test_app() -> Router {
    create_router(test_state(AgentClient::mock()))
}

fn samples_json() -> Vec<serde_json::Value> {
    (0..7 * 24)
        .map(|h| {
            let day = 1 + h / 24;
            let hour = h % 24;
            serde_json::json!({
                "timestamp": format!("2025-07-{:02}T{:02}:00:00Z", day, hour),
                "consumption_kwh": if (18..22).contains(&hour) { 1.2 } else { 0.4 }
            })
        })
        .collect()
}

fn predict_body() -> serde_json::Value {
    serde_json::json!({
        "household_id": "H1",
        "samples": samples_json(),
        "avg_temp_c": 31.5,
        "profile": {
            "household_size": 4,
            "appliances": ["Air Conditioning", "Washing Machine"]
        }
    })
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ========== Health ==========

#[tokio::test]
async fn test_health() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["agent_backend"], "mock");
    assert_eq!(json["agent_healthy"], true);
    assert_eq!(json["email_enabled"], false);
    assert!(json["model_version"].as_str().is_some());
}

#[tokio::test]
async fn test_health_reports_unhealthy_agent() {
    let app = create_router(test_state(AgentClient::Mock(MockBackend::unhealthy())));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["agent_healthy"], false);
}

// ========== Forecast ==========

#[tokio::test]
async fn test_forecast() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/forecast", &predict_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["household_id"], "H1");
    assert!(json["horizon_start"]
        .as_str()
        .unwrap()
        .starts_with("2025-07-08"));
    assert!(json["predicted_kwh"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_forecast_rejects_negative_samples() {
    let app = setup_test_app();
    let mut body = predict_body();
    body["samples"][3]["consumption_kwh"] = serde_json::json!(-1.0);

    let response = app
        .oneshot(post_json("/api/forecast", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("negative"));
}

#[tokio::test]
async fn test_forecast_rejects_empty_samples() {
    let app = setup_test_app();
    let body = serde_json::json!({ "household_id": "H1", "samples": [] });

    let response = app
        .oneshot(post_json("/api/forecast", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forecast_unknown_meter_is_unavailable() {
    let app = setup_test_app();
    let samples: Vec<serde_json::Value> = samples_json()
        .into_iter()
        .map(|mut s| {
            s["meter_id"] = serde_json::json!("Sauna");
            s
        })
        .collect();
    let body = serde_json::json!({
        "household_id": "H1",
        "meter_id": "Sauna",
        "samples": samples
    });

    let response = app
        .oneshot(post_json("/api/forecast", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = get_body_json(response).await;
    // Internal detail stays in the logs
    assert_eq!(json["error"], "Forecast model unavailable");
}

// ========== Optimize ==========

#[tokio::test]
async fn test_optimize_with_mock_backend() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/optimize", &predict_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["degraded"], false);
    assert!(json["explanation_text"]
        .as_str()
        .unwrap()
        .starts_with("Tomorrow's consumption is forecast at"));

    let actions = json["ordered_actions"].as_array().unwrap();
    assert!(!actions.is_empty());
    let priorities: Vec<u64> = actions
        .iter()
        .map(|a| a["priority"].as_u64().unwrap())
        .collect();
    let mut sorted = priorities.clone();
    sorted.sort();
    assert_eq!(priorities, sorted);
}

#[tokio::test]
async fn test_optimize_degraded_is_still_ok() {
    let agent = AgentClient::Mock(
        MockBackend::new().failing(AgentRole::Interpreter, AgentError::Auth("401".into())),
    );
    let app = create_router(test_state(agent));

    let response = app
        .oneshot(post_json("/api/optimize", &predict_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["degraded"], true);
    assert_eq!(json["explanation_text"], FALLBACK_EXPLANATION);
    assert_eq!(json["degraded_stages"][0]["role"], "interpreter");
    assert_eq!(json["degraded_stages"][0]["reason"]["kind"], "non_transient");
    // Advisor still contributed
    assert!(!json["ordered_actions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_optimize_over_http_agent() {
    let server = MockAgentServer::start().await;
    let agent = AgentClient::OpenAICompatible(OpenAICompatibleBackend::new(
        &server.url(),
        "gpt-4o-mini",
    ));
    let app = create_router(test_state(agent));

    let response = app
        .oneshot(post_json("/api/optimize", &predict_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["degraded"], false);
    // The mock advisor repeats one action; the merge drops the duplicate
    let actions = json["ordered_actions"].as_array().unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0]["priority"], 1);
    assert_eq!(server.calls(), 2);
}

#[tokio::test]
async fn test_optimize_invalid_json_is_client_error() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/optimize")
                .header("content-type", "application/json")
                .body(Body::from("{\"household_id\": 5}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[derive(Default)]
struct WeatherLog {
    cities: Vec<String>,
    latitudes: Vec<String>,
}

/// Open-Meteo stand-in that records which city and coordinates were asked for
async fn spawn_weather_server(log: Arc<Mutex<WeatherLog>>) -> String {
    use axum::extract::Query;
    use std::collections::HashMap;

    let search_log = log.clone();
    let app = Router::new()
        .route(
            "/v1/search",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let log = search_log.clone();
                async move {
                    let name = params.get("name").cloned().unwrap_or_default();
                    log.lock().unwrap().cities.push(name);
                    Json(serde_json::json!({
                        "results": [{
                            "latitude": 18.52,
                            "longitude": 73.86,
                            "timezone": "Asia/Kolkata"
                        }]
                    }))
                }
            }),
        )
        .route(
            "/v1/forecast",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let log = log.clone();
                async move {
                    let latitude = params.get("latitude").cloned().unwrap_or_default();
                    log.lock().unwrap().latitudes.push(latitude);
                    let day = params.get("start_date").cloned().unwrap_or_default();
                    Json(serde_json::json!({
                        "daily": {
                            "time": [day],
                            "temperature_2m_max": [33.0],
                            "temperature_2m_min": [25.0],
                            "weathercode": [0]
                        }
                    }))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_optimize_geocodes_profile_city() {
    let log = Arc::new(Mutex::new(WeatherLog::default()));
    let url = spawn_weather_server(log.clone()).await;
    let state = test_state(AgentClient::mock())
        .with_weather(WeatherClient::new(&url).with_geocoding_url(&url));
    let app = create_router(state);

    let mut body = predict_body();
    body.as_object_mut().unwrap().remove("avg_temp_c");
    body["profile"]["city"] = serde_json::json!("Pune");

    let response = app.oneshot(post_json("/api/optimize", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let log = log.lock().unwrap();
    assert_eq!(log.cities, vec!["Pune".to_string()]);
    // Weather was fetched for the geocoded city, not the default location
    assert_eq!(log.latitudes, vec!["18.52".to_string()]);
}

// ========== Email ==========

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &str {
        "recording"
    }

    async fn send(&self, _insight: &Insight, recipient: &Recipient) -> homewatt_core::Result<()> {
        self.sent.lock().unwrap().push(recipient.email.clone());
        Ok(())
    }
}

async fn insight_json(app: Router) -> serde_json::Value {
    let response = app
        .oneshot(post_json("/api/optimize", &predict_body()))
        .await
        .unwrap();
    get_body_json(response).await
}

#[tokio::test]
async fn test_email_not_configured() {
    let insight = insight_json(setup_test_app()).await;
    let app = setup_test_app();

    let response = app
        .oneshot(post_json(
            "/api/insights/email",
            &serde_json::json!({ "insight": insight, "email": "jane@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_email_queued() {
    let insight = insight_json(setup_test_app()).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let state = test_state(AgentClient::mock()).with_dispatcher(Dispatcher::new(notifier.clone()));
    let app = create_router(state);

    let response = app
        .oneshot(post_json(
            "/api/insights/email",
            &serde_json::json!({ "insight": insight, "email": "jane@example.com", "name": "Jane" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "queued");

    // Delivery happens in the background
    for _ in 0..50 {
        if !notifier.sent.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*notifier.sent.lock().unwrap(), vec!["jane@example.com".to_string()]);
}

#[tokio::test]
async fn test_email_invalid_address() {
    let insight = insight_json(setup_test_app()).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let state = test_state(AgentClient::mock()).with_dispatcher(Dispatcher::new(notifier));
    let app = create_router(state);

    let response = app
        .oneshot(post_json(
            "/api/insights/email",
            &serde_json::json!({ "insight": insight, "email": "not an address" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_rejects_negative_forecast() {
    let mut insight = insight_json(setup_test_app()).await;
    insight["forecast"]["predicted_kwh"] = serde_json::json!(-3.0);
    let notifier = Arc::new(RecordingNotifier::default());
    let state =
        test_state(AgentClient::mock()).with_dispatcher(Dispatcher::new(notifier.clone()));
    let app = create_router(state);

    let response = app
        .oneshot(post_json(
            "/api/insights/email",
            &serde_json::json!({ "insight": insight, "email": "jane@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(notifier.sent.lock().unwrap().is_empty());
}

// ========== Auth ==========

fn auth_app() -> Router {
    let mut state = test_state(AgentClient::mock());
    state.config = ServerConfig {
        require_auth: true,
        allowed_origins: vec![],
        api_keys: vec!["secret-key".to_string()],
    };
    create_router(state)
}

#[tokio::test]
async fn test_auth_required() {
    let response = auth_app()
        .oneshot(post_json("/api/forecast", &predict_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_with_api_key() {
    let mut request = post_json("/api/forecast", &predict_body());
    request
        .headers_mut()
        .insert("authorization", "Bearer secret-key".parse().unwrap());

    let response = auth_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_wrong_key() {
    let mut request = post_json("/api/forecast", &predict_body());
    request
        .headers_mut()
        .insert("authorization", "Bearer secret-kez".parse().unwrap());

    let response = auth_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let response = auth_app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["abc".to_string(), "longer-key".to_string()];
    assert!(validate_api_key("abc", &keys));
    assert!(validate_api_key("longer-key", &keys));
    assert!(!validate_api_key("abd", &keys));
    assert!(!validate_api_key("", &keys));
    assert!(!validate_api_key("abc", &[]));
}

#[test]
fn test_split_list() {
    assert_eq!(
        split_list(Some("a, b,,c ")),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert!(split_list(None).is_empty());
}
