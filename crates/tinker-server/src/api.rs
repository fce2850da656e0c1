//! HTTP API endpoints for the Tinker lesson server.
//!
//! # Endpoints
//!
//! - `POST /api/compile` - Compile a sketch and return diagnostics
//! - `POST /api/explain` - Stream an AI explanation of compiler errors (SSE)
//! - `POST /api/check` - Check blank values against a supplied answer key
//! - `POST /api/lessons/:id/check` - Check blank values against a stored lesson
//! - `POST /api/answer-key` - Draft an answer key from a template and solved sketch
//! - `GET /api/health` - Liveness probe
//!
//! # Example
//!
//! ```no_run
//! use tinker_server::{create_router, AppState, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(Config::default())?;
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tinker_answerkey::{AnswerKeyDraft, Overrides, SourceGenerator, UnresolvedBlank, ValueKind};
use tinker_blanks::{check_all, infer, AnswerKey, InferredBlank, Verdict};
use tinker_sandbox::{CompileDiagnostic, CompileResult, Compiler};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::error::{Result, TinkerError};
use crate::explain::{build_prompt, explain, ExplainRequest, StreamEvent};
use crate::lesson::LessonStore;
use crate::llm::LlmClient;
use crate::location::{LessonLocation, LocationReporter, TracingReporter};
use crate::Config;

/// Events buffered between the relay and a slow client.
const EVENT_BUFFER: usize = 64;

const MISSING_CODE: &str = "Missing 'code'.";
const MISSING_TEMPLATE: &str = "Missing 'template'.";
const INTERNAL_ERROR: &str = "Internal error.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the compile endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompileRequest {
    /// The full sketch.
    #[serde(default)]
    pub code: String,
}

/// Response body for the compile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    /// Whether the sketch compiled.
    pub ok: bool,
    /// Diagnostics in compiler order; empty on success.
    pub errors: Vec<CompileDiagnostic>,
    /// Warnings and memory usage on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notices: Option<Vec<String>>,
}

impl From<CompileResult> for CompileResponse {
    fn from(result: CompileResult) -> Self {
        match result {
            CompileResult::Success { notices } => Self {
                ok: true,
                errors: Vec::new(),
                notices: Some(notices).filter(|n| !n.is_empty()),
            },
            CompileResult::Failure { diagnostics } => Self {
                ok: false,
                errors: diagnostics,
                notices: None,
            },
        }
    }
}

/// Request body for the check endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckRequest {
    /// One rule per blank.
    #[serde(default)]
    pub rules: AnswerKey,
    /// Current value of every filled blank.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

/// Request body for the lesson check endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LessonCheckRequest {
    /// Current value of every filled blank.
    #[serde(default)]
    pub values: HashMap<String, String>,
    /// Step the student is on.
    #[serde(default)]
    pub step: Option<u32>,
}

/// Response body for both check endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Whether every blank is correct.
    pub ok: bool,
    /// One verdict per rule, in rule order.
    pub results: Vec<Verdict>,
}

impl CheckResponse {
    fn from_verdicts(results: Vec<Verdict>) -> Self {
        Self {
            ok: results.iter().all(|v| v.correct),
            results,
        }
    }
}

/// Request body for the answer-key endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerKeyRequest {
    /// Template with blanks.
    #[serde(default)]
    pub template: String,
    /// The same sketch with every blank filled in.
    #[serde(default)]
    pub solved: String,
    /// Blank name to the blank whose value it repeats.
    #[serde(default)]
    pub bind: BTreeMap<String, String>,
    /// Blank name to a forced kind.
    #[serde(default)]
    pub kind: BTreeMap<String, ValueKind>,
}

/// Response body for the answer-key endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerKeyResponse {
    /// What was inferred for each blank.
    pub blanks: Vec<InferredBlank>,
    /// Generated rules for resolved blanks.
    pub rules: AnswerKey,
    /// Blanks left without a rule.
    pub unresolved: Vec<UnresolvedBlank>,
    /// Lesson-source rendering of the key.
    pub snippet: String,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`.
    pub ok: bool,
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Everything here is immutable or internally synchronized, so concurrent
/// requests never wait on each other.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Sketch compiler.
    pub compiler: Compiler,
    /// Language model client.
    pub llm: LlmClient,
    /// Lesson files.
    pub lessons: LessonStore,
    /// Receives a location after every lesson check.
    pub locations: Arc<dyn LocationReporter>,
}

impl AppState {
    /// Creates the state for `config`, logging locations via `tracing`.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            compiler: Compiler::new(config.compiler.to_settings()),
            llm: LlmClient::new(config.llm.clone())?,
            lessons: LessonStore::new(config.lessons_path()),
            locations: Arc::new(TracingReporter),
            config,
        })
    }

    /// Replaces the location reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LocationReporter>) -> Self {
        self.locations = reporter;
        self
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request is unusable as sent.
    BadRequest(String),
    /// The requested resource does not exist.
    NotFound(String),
    /// Anything else; details are logged, not returned.
    Internal,
}

impl From<TinkerError> for ApiError {
    fn from(err: TinkerError) -> Self {
        match err {
            TinkerError::InvalidLessonId { .. } => Self::BadRequest("Invalid lesson id.".to_string()),
            e if e.is_not_found() => Self::NotFound("Lesson not found.".to_string()),
            other => {
                error!(error = %other, "Request failed");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string()),
        };

        let body = Json(ErrorResponse {
            ok: false,
            error: message,
        });
        (status, body).into_response()
    }
}

/// Unwraps a JSON body, answering 400 with `message` when it is unusable.
fn body_or<T>(payload: std::result::Result<Json<T>, JsonRejection>, message: &str) -> std::result::Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest(message.to_string())
    })
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// All routes live under `/api`, with permissive CORS for browser clients and
/// request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/compile", post(handle_compile))
        .route("/explain", post(handle_explain))
        .route("/check", post(handle_check))
        .route("/lessons/:id/check", post(handle_lesson_check))
        .route("/answer-key", post(handle_answer_key))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/compile`.
///
/// The compile runs on its own task so a client disconnect does not cut the
/// sandbox cleanup short.
async fn handle_compile(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CompileRequest>, JsonRejection>,
) -> std::result::Result<Json<CompileResponse>, ApiError> {
    let request = body_or(payload, MISSING_CODE)?;
    if request.code.trim().is_empty() {
        return Err(ApiError::BadRequest(MISSING_CODE.to_string()));
    }

    info!(code_len = request.code.len(), "Received compile request");

    let compiler = state.compiler.clone();
    let result = tokio::spawn(async move { compiler.compile(&request.code).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Compile task failed");
            ApiError::Internal
        })?;

    Ok(Json(result.into()))
}

/// Handler for `POST /api/explain`.
///
/// Responds immediately with an event stream fed by a relay task. Dropping
/// the response closes the channel, which stops the relay.
async fn handle_explain(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ExplainRequest>, JsonRejection>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError> {
    let request = body_or(payload, MISSING_CODE)?;
    if request.code.trim().is_empty() {
        return Err(ApiError::BadRequest(MISSING_CODE.to_string()));
    }

    info!(
        errors = request.errors.len(),
        mode = ?request.mode,
        sentences = request.sentence_limit(),
        "Received explain request"
    );

    let prompt = build_prompt(&request, &state.config.explain);
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        let outcome = explain(&state.llm, &prompt, tx).await;
        info!(?outcome, "Explanation stream ended");
    });

    let events = ReceiverStream::new(rx).map(|event: StreamEvent| {
        Ok::<_, Infallible>(Event::default().event(event.name()).data(event.payload()))
    });
    Ok(Sse::new(events))
}

/// Handler for `POST /api/check`.
async fn handle_check(
    payload: std::result::Result<Json<CheckRequest>, JsonRejection>,
) -> std::result::Result<Json<CheckResponse>, ApiError> {
    let request = body_or(payload, "Invalid check request.")?;
    let results = check_all(&request.rules, &request.values);
    Ok(Json(CheckResponse::from_verdicts(results)))
}

/// Handler for `POST /api/lessons/:id/check`.
///
/// Reports the student's location after checking.
async fn handle_lesson_check(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<LessonCheckRequest>, JsonRejection>,
) -> std::result::Result<Json<CheckResponse>, ApiError> {
    let request = body_or(payload, "Invalid check request.")?;
    let lesson = state.lessons.load(&id)?;

    let response = CheckResponse::from_verdicts(lesson.check(&request.values));
    info!(lesson = %lesson.id, step = ?request.step, ok = response.ok, "Checked lesson blanks");

    state
        .locations
        .report(LessonLocation::now(lesson.id, request.step));
    Ok(Json(response))
}

/// Handler for `POST /api/answer-key`.
async fn handle_answer_key(
    payload: std::result::Result<Json<AnswerKeyRequest>, JsonRejection>,
) -> std::result::Result<Json<AnswerKeyResponse>, ApiError> {
    let request = body_or(payload, MISSING_TEMPLATE)?;
    if request.template.trim().is_empty() {
        return Err(ApiError::BadRequest(MISSING_TEMPLATE.to_string()));
    }

    let blanks = infer(&request.template, &request.solved);
    let overrides = Overrides {
        bind: request.bind,
        kind: request.kind,
    };
    let draft = AnswerKeyDraft::build(&blanks, &overrides);
    let snippet = SourceGenerator::new(&draft).generate();

    info!(
        blanks = blanks.len(),
        unresolved = draft.unresolved().count(),
        "Drafted answer key"
    );

    Ok(Json(AnswerKeyResponse {
        rules: draft.answer_key(),
        unresolved: draft.unresolved().cloned().collect(),
        blanks,
        snippet,
    }))
}

/// Handler for `GET /api/health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
