//! Axum-based support gateway. Config-driven via CoreConfig.
//!
//! Startup order matters: `.env` first, then tracing, then config, then the
//! generation backend. A missing LLM key in live mode aborts startup — the
//! gateway refuses to serve degraded traffic. The legal dataset, by
//! contrast, is optional: when absent, annotation is a no-op.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use solace_core::{
    handle_alert_events, AlertDispatcher, AnalyticsLog, ChatInput, ChatPipeline, CoreConfig,
    ConversationMemory, GenerationBackend, InteractionLog, LegalMatcher,
    LexiconEmotionClassifier, LexiconHarassmentClassifier, MockBackend, ModelClient,
    PipelineError, ResponseGenerator, SupportInput, WebContextFetcher,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    config: Arc<CoreConfig>,
    /// `None` until initialization completes; requests are rejected with 503
    /// rather than queued.
    pipeline: Option<Arc<ChatPipeline>>,
}

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    enable_web: bool,
}

#[derive(Deserialize, Default)]
struct ResetBody {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct SupportBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: Option<String>,
}

fn error_body(detail: &str) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "detail": detail }))
}

fn not_ready() -> (StatusCode, axum::Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        error_body("Models not loaded. Please wait for initialization."),
    )
}

/// GET /health – readiness of the classifiers plus a status string.
async fn health(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let models_loaded = state.pipeline.is_some();
    axum::Json(serde_json::json!({
        "status": if models_loaded { "healthy" } else { "degraded" },
        "models_loaded": models_loaded,
        "service": state.config.app_name,
    }))
}

/// POST /api/chat – the main support conversation endpoint.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let Some(pipeline) = state.pipeline else {
        return not_ready();
    };

    let input = ChatInput {
        message: body.message,
        session_id: body.session_id,
        enable_web: body.enable_web,
    };
    match pipeline.handle_chat(input).await {
        Ok(reply) => match serde_json::to_value(&reply) {
            Ok(value) => (StatusCode::OK, axum::Json(value)),
            Err(e) => {
                tracing::error!("Chat response serialization failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, error_body("Internal server error"))
            }
        },
        Err(PipelineError::EmptyMessage) => {
            (StatusCode::BAD_REQUEST, error_body("Message cannot be empty"))
        }
        Err(PipelineError::NotReady) => not_ready(),
        Err(PipelineError::Internal(e)) => {
            tracing::error!("Chat request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("Internal server error"))
        }
    }
}

/// POST /api/reset – clears conversation memory for a session. Always
/// succeeds, including for unknown sessions.
async fn reset(
    State(state): State<AppState>,
    Json(body): Json<ResetBody>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let Some(pipeline) = state.pipeline else {
        return not_ready();
    };
    let message = pipeline.reset(body.session_id.as_deref());
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "success", "message": message })),
    )
}

/// POST /api/trigger-support – proactive supportive message for a flagged
/// notification. Never hard-fails: internal faults fall back to a static
/// severity-keyed message.
async fn trigger_support(
    State(state): State<AppState>,
    Json(body): Json<SupportBody>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let Some(pipeline) = state.pipeline else {
        return not_ready();
    };
    if body.message.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("Message cannot be empty"));
    }

    let provided_severity = body
        .severity
        .as_deref()
        .and_then(solace_core::SeverityTier::from_label);
    let input = SupportInput { message: body.message, severity: body.severity.clone() };
    match pipeline.handle_support_trigger(input).await {
        Ok(reply) => match serde_json::to_value(&reply) {
            Ok(value) => (StatusCode::OK, axum::Json(value)),
            Err(e) => {
                tracing::error!("Support response serialization failed: {}", e);
                fallback_support_response(provided_severity)
            }
        },
        Err(e) => {
            tracing::error!("Support trigger failed: {}", e);
            fallback_support_response(provided_severity)
        }
    }
}

/// Static support payload used when even the pipeline's own fallback path
/// could not run.
fn fallback_support_response(
    severity: Option<solace_core::SeverityTier>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let severity = severity.unwrap_or(solace_core::SeverityTier::Low);
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "reply": solace_core::fallback_support_message(severity),
            "severity": severity,
            "emotion": "distress",
            "harassment_score": 0.0,
        })),
    )
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/reset", post(reset))
        .route("/api/trigger-support", post(trigger_support))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the pipeline and its collaborators. Fails only on fatal
/// initialization faults (live mode without an API key).
fn init_pipeline(config: &CoreConfig) -> Result<Arc<ChatPipeline>, Box<dyn std::error::Error + Send + Sync>> {
    let backend: Arc<dyn GenerationBackend> = if config.llm_live() {
        Arc::new(ModelClient::from_env()?)
    } else {
        tracing::info!("LLM mode is mock; no live backend will be called");
        Arc::new(MockBackend::new())
    };

    let web = WebContextFetcher::from_env();
    if web.is_none() {
        tracing::info!("Web search credentials not configured; web augmentation disabled");
    }

    let legal = LegalMatcher::load(&config.legal_data_path);
    if legal.is_empty() {
        tracing::warn!("Legal annotation disabled (no sections loaded)");
    } else {
        tracing::info!("Loaded {} legal sections", legal.len());
    }

    let alerts = AlertDispatcher::from_env();
    tokio::spawn(handle_alert_events(alerts.subscribe()));

    Ok(Arc::new(ChatPipeline::new(
        Arc::new(LexiconEmotionClassifier::new()),
        Arc::new(LexiconHarassmentClassifier::new()),
        ResponseGenerator::new(backend, web),
        Arc::new(ConversationMemory::new()),
        Arc::new(legal),
        alerts,
        AnalyticsLog::new(&config.log_dir),
        InteractionLog::new(&config.log_dir),
    )))
}

#[tokio::main]
async fn main() {
    // .env first: the LLM key lives in the backend environment only.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[solace-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Config load failed: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = match init_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("FATAL: initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let app_name = config.app_name.clone();
    let state = AppState { config: Arc::new(config), pipeline: Some(pipeline) };
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Port {} unavailable: {}", port, e);
            std::process::exit(1);
        }
    };
    tracing::info!("{} listening on {}", app_name, addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use solace_core::{LegalSection, SeverityTier};
    use tower::ServiceExt;

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            port: 0,
            llm_mode: "mock".to_string(),
            log_dir: "./logs".to_string(),
            legal_data_path: "legal/sections.json".to_string(),
        }
    }

    fn test_sections() -> Vec<LegalSection> {
        vec![
            LegalSection {
                section: "354D".into(),
                title: "Stalking".into(),
                description: "Following or contacting a person despite clear disinterest".into(),
            },
            LegalSection {
                section: "503".into(),
                title: "Criminal intimidation".into(),
                description: "Threatening injury to person, reputation or property".into(),
            },
        ]
    }

    fn test_state(dir: &std::path::Path) -> AppState {
        let pipeline = ChatPipeline::new(
            Arc::new(LexiconEmotionClassifier::new()),
            Arc::new(LexiconHarassmentClassifier::new()),
            ResponseGenerator::new(Arc::new(MockBackend::new()), None),
            Arc::new(ConversationMemory::new()),
            Arc::new(LegalMatcher::from_sections(test_sections())),
            AlertDispatcher::new(),
            AnalyticsLog::new(dir),
            InteractionLog::new(dir),
        );
        AppState { config: Arc::new(test_config()), pipeline: Some(Arc::new(pipeline)) }
    }

    fn not_ready_state() -> AppState {
        AppState { config: Arc::new(test_config()), pipeline: None }
    }

    async fn post_json(
        app: Router,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_healthy_when_pipeline_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let req = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["models_loaded"], true);
    }

    #[tokio::test]
    async fn health_reports_degraded_before_initialization() {
        let app = build_app(not_ready_state());
        let req = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["models_loaded"], false);
    }

    #[tokio::test]
    async fn chat_rejects_empty_message_with_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let (status, json) = post_json(app, "/api/chat", serde_json::json!({ "message": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Message cannot be empty");
    }

    #[tokio::test]
    async fn chat_returns_503_before_initialization() {
        let app = build_app(not_ready_state());
        let (status, _) = post_json(app, "/api/chat", serde_json::json!({ "message": "hi" })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn chat_response_carries_the_full_contract() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let (status, json) = post_json(
            app,
            "/api/chat",
            serde_json::json!({ "message": "I feel anxious about my exam", "session_id": "s1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["emotion"], "anxiety");
        assert_eq!(json["harassment_level"], "Low");
        assert_eq!(json["harassment_detected"], false);
        assert_eq!(json["web_enabled"], false);
        assert!(json["reply"].as_str().unwrap().len() > 0);
        assert!(json["keywords"].is_array());
        assert!(json["harassment_confidence"].is_number());
        assert!(json["response_time_ms"].is_number());
    }

    #[tokio::test]
    async fn chat_annotates_and_escalates_harassment() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let (status, json) = post_json(
            app,
            "/api/chat",
            serde_json::json!({ "message": "My ex keeps stalking me and sent a threat" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["harassment_detected"], true);
        assert_eq!(json["harassment_level"], "High");
        let reply = json["reply"].as_str().unwrap();
        assert!(reply.contains("354D"));
        assert!(reply.contains("503"));
    }

    #[tokio::test]
    async fn reset_always_succeeds_even_for_unknown_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, json) =
            post_json(build_app(state.clone()), "/api/reset", serde_json::json!({ "session_id": "ghost" }))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");

        // Twice in a row is fine too.
        let (status, json) =
            post_json(build_app(state), "/api/reset", serde_json::json!({ "session_id": "ghost" }))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
    }

    #[tokio::test]
    async fn reset_clears_memory_between_chats() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let pipeline = state.pipeline.clone().unwrap();

        post_json(
            build_app(state.clone()),
            "/api/chat",
            serde_json::json!({ "message": "hello", "session_id": "s1" }),
        )
        .await;
        assert_eq!(pipeline.memory().len("s1"), 2);

        post_json(build_app(state), "/api/reset", serde_json::json!({ "session_id": "s1" })).await;
        assert_eq!(pipeline.memory().len("s1"), 0);
    }

    #[tokio::test]
    async fn trigger_support_returns_supportive_reply_with_severity() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let (status, json) = post_json(
            app,
            "/api/trigger-support",
            serde_json::json!({ "message": "someone keeps threatening me", "severity": "Medium" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["reply"].as_str().unwrap().len() > 0);
        let severity = SeverityTier::from_label(json["severity"].as_str().unwrap());
        assert!(severity.is_some());
        assert!(json["harassment_score"].is_number());
    }

    #[tokio::test]
    async fn trigger_support_rejects_empty_message() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(test_state(dir.path()));
        let (status, _) =
            post_json(app, "/api/trigger-support", serde_json::json!({ "message": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
