//! JSON HTTP server.
//!
//! Exposes the pipeline over a small REST-ish surface:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Run one pipeline turn for an agent |
//! | `POST` | `/search` | Run the search chain on its own |
//! | `POST` | `/sessions` | Create a conversation session |
//! | `POST` | `/sessions/{session_id}/status` | Move a session between statuses |
//! | `GET`  | `/usage/{user_id}` | Spend aggregates and limits |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "quota_exceeded", "message": "daily limit reached" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `quota_exceeded`
//! (429), `internal` (500). A degraded turn is NOT an error: it returns
//! 200 with the apologetic message and `can_retry: true` in metadata.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::AgentKind;
use crate::compose::ContextBlock;
use crate::config::Config;
use crate::ledger::{self, QuotaDecision};
use crate::models::{MessageRole, SearchEngine, TurnPhase};
use crate::pipeline::{run_turn, PipelineDeps, TurnInput, TurnResult};
use crate::search::{run_search, SearchRequest};
use crate::session::{self, Session, SessionStatus};

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    deps: Arc<PipelineDeps>,
}

/// Build the router with all routes and middleware attached.
pub fn app(config: Arc<Config>, deps: Arc<PipelineDeps>) -> Router {
    let state = AppState { config, deps };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/search", post(handle_search))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{session_id}/status", post(handle_session_status))
        .route("/usage/{user_id}", get(handle_usage))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, deps: PipelineDeps) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let router = app(Arc::new(config.clone()), Arc::new(deps));

    println!("mentor server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn quota_exceeded(decision: &QuotaDecision) -> AppError {
    let message = match decision {
        QuotaDecision::DailyExceeded { used_usd, limit_usd } => {
            format!("daily limit reached (${:.2} of ${:.2})", used_usd, limit_usd)
        }
        QuotaDecision::MonthlyExceeded { used_usd, limit_usd } => {
            format!(
                "monthly limit reached (${:.2} of ${:.2})",
                used_usd, limit_usd
            )
        }
        QuotaDecision::Allowed => "quota check failed".to_string(),
    };
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "quota_exceeded".to_string(),
        message,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequestBody {
    message: String,
    agent_type: String,
    #[serde(default)]
    session_id: Option<String>,
    user_context: UserContext,
}

#[derive(Deserialize)]
struct UserContext {
    user_id: String,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    knowledge: Vec<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    timeframe: Option<String>,
}

#[derive(Serialize)]
struct ChatResponseBody {
    response: String,
    tokens_used: u32,
    cost: f64,
    model: String,
    metadata: ChatMetadata,
}

#[derive(Serialize)]
struct ChatMetadata {
    regenerated: bool,
    search_engine: Option<SearchEngine>,
    degraded: bool,
    can_retry: bool,
    /// How many manual retries the caller should allow itself.
    retry_limit: u32,
    failed_phase: Option<TurnPhase>,
    session_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, AppError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let Some(agent) = AgentKind::parse(&body.agent_type) else {
        return Err(bad_request(format!(
            "unknown agent_type: {}",
            body.agent_type
        )));
    };

    // History comes from the session when one is named.
    let history = match &body.session_id {
        Some(session_id) => {
            session::get_session(&state.deps.pool, session_id)
                .await
                .map_err(|e| not_found(e.to_string()))?;
            session::load_history(&state.deps.pool, session_id)
                .await
                .map_err(|e| internal(e.to_string()))?
        }
        None => Vec::new(),
    };

    let mut search_request = SearchRequest::new(body.message.clone());
    search_request.company_name = body.user_context.company_name.clone();
    search_request.industry = body.user_context.industry.clone();
    search_request.timeframe = body.user_context.timeframe.clone();

    let input = TurnInput {
        user_id: body.user_context.user_id.clone(),
        agent,
        message: body.message.clone(),
        context: ContextBlock {
            profile: body.user_context.profile.clone(),
            knowledge: body.user_context.knowledge.clone(),
        },
        history,
        search: Some(search_request),
    };

    let result = run_turn(&state.deps, &state.config, &input)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let outcome = match result {
        TurnResult::QuotaExceeded(decision) => return Err(quota_exceeded(&decision)),
        TurnResult::Completed(outcome) => outcome,
    };

    if let Some(session_id) = &body.session_id {
        session::append_message(&state.deps.pool, session_id, MessageRole::User, &body.message)
            .await
            .map_err(|e| internal(e.to_string()))?;
        session::append_message(
            &state.deps.pool,
            session_id,
            MessageRole::Assistant,
            &outcome.response,
        )
        .await
        .map_err(|e| internal(e.to_string()))?;
    }

    Ok(Json(ChatResponseBody {
        response: outcome.response,
        tokens_used: outcome.tokens_used,
        cost: outcome.cost,
        model: outcome.model,
        metadata: ChatMetadata {
            regenerated: outcome.regenerated,
            search_engine: outcome.search_engine,
            degraded: outcome.degraded,
            can_retry: outcome.can_retry,
            retry_limit: state.config.pipeline.max_manual_retries,
            failed_phase: outcome.failed_phase,
            session_id: body.session_id,
        },
    }))
}

// ============ POST /sessions ============

#[derive(Deserialize)]
struct CreateSessionBody {
    user_id: String,
    agent_type: String,
    /// Opaque per-session settings stored as-is.
    #[serde(default)]
    config: Option<serde_json::Value>,
}

async fn handle_create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<Session>, AppError> {
    if body.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    let Some(agent) = AgentKind::parse(&body.agent_type) else {
        return Err(bad_request(format!(
            "unknown agent_type: {}",
            body.agent_type
        )));
    };

    let config_json = body
        .config
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string());

    let created = session::create_session(&state.deps.pool, &body.user_id, agent, &config_json)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(created))
}

// ============ POST /sessions/{session_id}/status ============

#[derive(Deserialize)]
struct SessionStatusBody {
    status: String,
}

async fn handle_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SessionStatusBody>,
) -> Result<Json<Session>, AppError> {
    let Some(status) = SessionStatus::parse(&body.status) else {
        return Err(bad_request(format!("unknown status: {}", body.status)));
    };

    session::get_session(&state.deps.pool, &session_id)
        .await
        .map_err(|e| not_found(e.to_string()))?;
    // Rejected transitions (reopening an archived session) are the
    // caller's mistake, not ours.
    session::set_status(&state.deps.pool, &session_id, status)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    let updated = session::get_session(&state.deps.pool, &session_id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(updated))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequestBody {
    query: String,
    user_id: String,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    timeframe: Option<String>,
}

#[derive(Serialize)]
struct SearchResponseBody {
    content: String,
    sources: Vec<String>,
    metrics: SearchMetrics,
    search_engine: SearchEngine,
    status: String,
}

#[derive(Serialize)]
struct SearchMetrics {
    confidence: f64,
    source_count: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequestBody>,
) -> Result<Json<SearchResponseBody>, AppError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let mut request = SearchRequest::new(body.query);
    request.company_name = body.company_name;
    request.industry = body.industry;
    request.timeframe = body.timeframe;

    let outcome = run_search(
        &state.deps.search_chain,
        &state.deps.pool,
        &body.user_id,
        &request,
        &state.deps.retry,
    )
    .await
    .map_err(|e| internal(e.to_string()))?;

    Ok(Json(SearchResponseBody {
        content: outcome.content,
        sources: outcome.sources,
        metrics: SearchMetrics {
            confidence: outcome.confidence,
            source_count: outcome.source_count,
        },
        search_engine: outcome.engine,
        status: "ok".to_string(),
    }))
}

// ============ GET /usage/{user_id} ============

#[derive(Serialize)]
struct UsageResponseBody {
    user_id: String,
    today_usd: f64,
    month_usd: f64,
    total_usd: f64,
    request_count: i64,
    daily_limit_usd: f64,
    monthly_limit_usd: f64,
}

async fn handle_usage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UsageResponseBody>, AppError> {
    let summary = ledger::usage_summary(&state.deps.pool, &user_id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(UsageResponseBody {
        user_id: summary.user_id,
        today_usd: summary.today_usd,
        month_usd: summary.month_usd,
        total_usd: summary.total_usd,
        request_count: summary.request_count,
        daily_limit_usd: state.config.quota.daily_limit_usd,
        monthly_limit_usd: state.config.quota.monthly_limit_usd,
    }))
}
