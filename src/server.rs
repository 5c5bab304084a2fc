use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::analysis::AnalysisResult;
use crate::charts::{ChartRenderer, PlotlyHtmlRenderer};
use crate::config::ServiceConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::explain::{explain_with_fallback, Explanation, GeminiExplainer, InsightExplainer};

pub struct AppState {
    pub engine: Arc<Engine>,
    pub renderer: Box<dyn ChartRenderer>,
    pub explainer: Option<Box<dyn InsightExplainer>>,
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub include_explanation: bool,
}

#[derive(Deserialize)]
pub struct AssistantRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub result: Arc<AnalysisResult>,
    pub chart_url: Option<String>,
    pub explanation: Option<Explanation>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// Engine failures as HTTP answers
pub struct ApiError(pub EngineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            EngineError::NoDatasetLoaded | EngineError::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            EngineError::InsufficientColumns { .. } | EngineError::InsufficientData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::Render { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.0.to_string(), kind: self.0.kind() };
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/query", post(query_handler))
        .route("/api/insights", get(insights_handler))
        .route("/api/history", get(history_handler))
        .route("/api/info", get(info_handler))
        .route("/api/suggestions", get(suggestions_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/ai/context", get(ai_context_handler))
        .route("/api/ai/query", post(ai_query_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

// Main backend function
#[tokio::main]
pub async fn backend_server(engine: Arc<Engine>, cfg: ServiceConfig) -> anyhow::Result<()> {
    let explainer: Option<Box<dyn InsightExplainer>> = match &cfg.gemini_api_key {
        Some(key) => Some(Box::new(GeminiExplainer::new(key.clone(), cfg.gemini_model.clone()))),
        None => {
            println!("{}", "GEMINI_API_KEY not set - explanations will use the local narrative".yellow());
            None
        }
    };

    let state = Arc::new(AppState {
        engine,
        renderer: Box::new(PlotlyHtmlRenderer::new(&cfg.static_dir)),
        explainer,
    });

    let app = router(state, &cfg.static_dir);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", cfg.port)).await?;
    println!("🚀 Server running on http://127.0.0.1:{}", cfg.port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn upload_handler(State(state): State<Arc<AppState>>, body: String) -> Result<Response, ApiError> {
    let outcome = state.engine.load_csv(body.as_bytes())?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let result = state.engine.run_query(&payload.query)?;

    let chart_url = match result.chart_spec.as_ref() {
        Some(spec) => match state.renderer.render(spec) {
            Ok(name) => Some(format!("/static/{}", name)),
            Err(e) => {
                eprintln!("Chart rendering failed: {}", e);
                None
            }
        },
        None => None,
    };

    let explanation = if payload.include_explanation {
        Some(explain_with_fallback(state.explainer.as_deref(), &result).await)
    } else {
        None
    };

    Ok((StatusCode::OK, Json(QueryResponse { result, chart_url, explanation })).into_response())
}

async fn insights_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let doc = state.engine.get_comprehensive_insights()?;
    Ok((StatusCode::OK, Json(doc)).into_response())
}

async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.engine.get_history())).into_response()
}

async fn info_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let profile = state.engine.profile()?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

async fn suggestions_handler(State(state): State<Arc<AppState>>) -> Response {
    let suggestions = state.engine.suggest_queries();
    (StatusCode::OK, Json(serde_json::json!({ "suggestions": suggestions }))).into_response()
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let dashboard = state.engine.get_analytics_dashboard()?;
    Ok((StatusCode::OK, Json(dashboard)).into_response())
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let statistics = state.engine.get_statistics()?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "statistics": statistics }))).into_response())
}

async fn ai_context_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let context = state.engine.get_ai_context()?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "context": context }))).into_response())
}

async fn ai_query_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AssistantRequest>,
) -> Result<Response, ApiError> {
    let answer = state.engine.query_for_ai(&payload.question)?;
    Ok((StatusCode::OK, Json(answer)).into_response())
}
