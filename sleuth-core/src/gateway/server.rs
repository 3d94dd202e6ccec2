//! Research gateway server built on axum.

use super::GatewayConfig;
use crate::research::{NoopSink, ResearchEngine, ResearchQuery};
use crate::stream::{FOLLOWUP_FAILED, ProgressStream, RESEARCH_FAILED};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayServer>;

/// Long-lived state behind every request.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: ResearchEngine,
    started_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("model", &self.engine.gateway().model_name())
            .finish()
    }
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: ResearchEngine) -> Self {
        Self {
            config,
            engine,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn engine(&self) -> &ResearchEngine {
        &self.engine
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[derive(Debug, Default, Deserialize)]
struct StreamParams {
    #[serde(default)]
    stream: Option<String>,
}

impl StreamParams {
    fn is_streaming(&self) -> bool {
        self.stream.as_deref() == Some("true")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    relevance_threshold: Option<u32>,
    #[serde(default)]
    enable_formatting: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FollowUpRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

/// Build an axum Router with the research, follow-up and `/health` routes.
pub fn router(shared: SharedGateway) -> Router {
    let cors = shared.config().cors;
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/research", post(research_handler))
        .route("/api/research/followup", post(followup_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(shared);
    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "model": gw.engine().gateway().model_name(),
        "uptime_secs": gw.uptime_secs(),
    }))
}

fn client_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn server_error(details: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "details": details })),
    )
        .into_response()
}

fn decode<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid request body", "details": e.to_string() })),
        )
            .into_response()
    })
}

fn event_stream(events: crate::stream::ProgressEvents) -> Response {
    Sse::new(events.map(|event| Event::default().json_data(event))).into_response()
}

async fn research_handler(
    State(gw): State<SharedGateway>,
    Query(params): Query<StreamParams>,
    body: Bytes,
) -> Response {
    let request: ResearchRequest = match decode(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let Some(text) = request.query.filter(|q| !q.is_empty()) else {
        return client_error("Query is required");
    };
    let query = ResearchQuery {
        text,
        relevance_threshold: request
            .relevance_threshold
            .unwrap_or(gw.engine().settings().default_relevance_threshold),
        enable_formatting: request.enable_formatting.unwrap_or(true),
    };

    if params.is_streaming() {
        let engine = gw.engine().clone();
        let stream = ProgressStream::new(engine.settings().liveness_timeout());
        let events = stream.start(RESEARCH_FAILED, move |sink| async move {
            engine.research(&query, &sink).await
        });
        return event_stream(events);
    }

    match gw.engine().research(&query, &NoopSink).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!(error = %err, "Research API error");
            server_error(err.to_string())
        }
    }
}

async fn followup_handler(
    State(gw): State<SharedGateway>,
    Query(params): Query<StreamParams>,
    body: Bytes,
) -> Response {
    let request: FollowUpRequest = match decode(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let (Some(question), Some(context)) = (
        request.question.filter(|q| !q.is_empty()),
        request.context.filter(|c| !c.is_empty()),
    ) else {
        return client_error("Question and context are required");
    };

    if params.is_streaming() {
        let engine = gw.engine().clone();
        let stream = ProgressStream::new(engine.settings().liveness_timeout());
        let events = stream.start(FOLLOWUP_FAILED, move |sink| async move {
            engine.follow_up(&question, &context, &sink).await
        });
        return event_stream(events);
    }

    match gw.engine().follow_up(&question, &context, &NoopSink).await {
        Ok(answer) => Json(answer).into_response(),
        Err(err) => {
            error!(error = %err, "Follow-up API error");
            server_error(err.to_string())
        }
    }
}

/// Start the gateway server on the configured address.
///
/// Runs until Ctrl-C.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let addr = gw.config().bind_addr();
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gateway");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{MockLlmProvider, ModelGateway};
    use crate::config::{FollowUpConfig, ResearchConfig};
    use crate::evidence::{CannedEvidence, EvidenceSource};
    use crate::providers::RateLimitConfig;
    use axum::body::Body;
    use tower::ServiceExt;

    fn make_shared_gateway(mock: Arc<MockLlmProvider>) -> SharedGateway {
        let source: Arc<dyn EvidenceSource> = Arc::new(CannedEvidence::new());
        let engine = ResearchEngine::new(
            Arc::new(ModelGateway::new(mock, RateLimitConfig::unlimited())),
            source.clone(),
            source,
            ResearchConfig::default(),
            FollowUpConfig::default(),
        );
        Arc::new(GatewayServer::new(GatewayConfig::default(), engine))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(make_shared_gateway(Arc::new(MockLlmProvider::new())));
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], "mock-model");
        assert!(json["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_missing_query_is_rejected() {
        let mock = Arc::new(MockLlmProvider::new());
        let gw = make_shared_gateway(mock.clone());

        for body in [r#"{}"#, r#"{"query": ""}"#, ""] {
            let (status, json) = post_json(router(gw.clone()), "/api/research", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json, json!({"error": "Query is required"}));
        }
        let (status, _) = post_json(router(gw), "/api/research?stream=true", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_followup_fields_are_rejected() {
        let gw = make_shared_gateway(Arc::new(MockLlmProvider::new()));
        for body in [r#"{"question": "why?"}"#, r#"{"context": "c"}"#, r#"{"question": "", "context": "c"}"#] {
            let (status, json) = post_json(router(gw.clone()), "/api/research/followup", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "Question and context are required");
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let gw = make_shared_gateway(Arc::new(MockLlmProvider::new()));
        let (status, json) = post_json(router(gw), "/api/research", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid request body");
    }

    #[tokio::test]
    async fn test_model_failure_is_500() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(crate::error::LlmError::AuthFailed {
            provider: "Anthropic".into(),
        });
        let gw = make_shared_gateway(mock);
        let (status, json) = post_json(router(gw), "/api/research", r#"{"query": "gold"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["details"], "Authentication failed for provider Anthropic");
    }

    #[tokio::test]
    async fn test_followup_sync() {
        let mock = Arc::new(MockLlmProvider::with_response("Central banks kept buying."));
        let gw = make_shared_gateway(mock);
        let (status, json) = post_json(
            router(gw),
            "/api/research/followup",
            r#"{"question": "Why did gold rise?", "context": "Gold rose 10%."}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["question"], "Why did gold rise?");
        assert_eq!(json["answer"], "Central banks kept buying.");
        assert_eq!(json["contextUsed"][0], "Gold rose 10%....");
        assert_eq!(json["method"], "Context + LLM analysis");
    }

    #[test]
    fn test_stream_flag() {
        let on = StreamParams {
            stream: Some("true".into()),
        };
        let off = StreamParams {
            stream: Some("1".into()),
        };
        assert!(on.is_streaming());
        assert!(!off.is_streaming());
        assert!(!StreamParams::default().is_streaming());
    }
}
