//! HTTP API for hosting lesson sessions.
//!
//! Presentation layers create a session per learner and lesson, submit runs
//! and chat messages, and follow the session live over a WebSocket.
//!
//! # Endpoints
//!
//! - `GET /api/lessons` - List available lessons
//! - `POST /api/sessions` - Start a session for a learner and lesson
//! - `GET /api/sessions/:id` - Get the session snapshot
//! - `DELETE /api/sessions/:id` - End a session and release it
//! - `POST /api/sessions/:id/run` - Run submitted code
//! - `POST /api/sessions/:id/messages` - Send a chat message to the tutor
//! - `GET /api/sessions/:id/events` - WebSocket stream of session events
//!
//! # Example
//!
//! ```no_run
//! use lessonloop_engine::{create_router, AppState, Config, Engine, LessonCatalog};
//!
//! # async fn example() -> lessonloop_engine::Result<()> {
//! let config = Config::default();
//! let engine = Engine::from_config(&config)?;
//! let catalog = LessonCatalog::load_dir(&config.lessons_dir)?;
//!
//! let router = create_router(AppState::new(engine, catalog));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::events::SessionSnapshot;
use crate::lesson::{LessonCatalog, LessonSummary};
use crate::session::{Engine, LessonSession, RunReport};
use crate::tutor::{ChatTurn, TutorPhase};
use crate::websocket::session_events;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Learner identifier.
    pub user_id: String,
    /// Lesson to work on.
    pub lesson_id: String,
}

/// Request body for running code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source text to run and grade.
    pub code: String,
}

/// Request body for a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    /// What the learner wrote.
    pub text: String,
}

/// Response body for a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Turns added: the learner's, then the tutor's.
    pub turns: Vec<ChatTurn>,
    /// Tutor phase after the message.
    pub phase: TutorPhase,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

pub(crate) type SessionHandle = Arc<Mutex<LessonSession>>;

/// Shared application state for the HTTP server.
///
/// Sessions are kept in a registry map. Each session sits behind its own
/// async mutex, so requests for one session are handled one at a time while
/// different sessions proceed independently.
#[derive(Debug, Clone)]
pub struct AppState {
    engine: Engine,
    catalog: Arc<LessonCatalog>,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    /// Creates state serving lessons from `catalog`.
    #[must_use]
    pub fn new(engine: Engine, catalog: LessonCatalog) -> Self {
        Self {
            engine,
            catalog: Arc::new(catalog),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Looks up a live session.
    pub(crate) async fn session(&self, id: &str) -> Result<SessionHandle, ApiError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::from(EngineError::session_not_found(id)))
    }

    /// Removes a session from the registry, returning it if it existed.
    ///
    /// Requests already holding the session finish normally; event streams
    /// close once the last handle is gone.
    pub(crate) async fn remove_session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn new_session_id(&self) -> String {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{n}", Utc::now().timestamp_millis())
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// The request was malformed.
    BadRequest(String),
    /// The session or lesson does not exist.
    NotFound(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::SessionNotFound { .. } | EngineError::UnknownLesson { .. } => {
                Self::NotFound(e.to_string())
            }
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - CORS middleware allowing any origin
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/lessons", get(handle_list_lessons))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/:id",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/:id/run", post(handle_run))
        .route("/sessions/:id/messages", post(handle_message))
        .route("/sessions/:id/events", get(session_events));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/lessons`.
async fn handle_list_lessons(State(state): State<AppState>) -> Json<Vec<LessonSummary>> {
    Json(state.catalog.summaries())
}

/// Handler for `POST /api/sessions`.
///
/// Starts a session, which loads stored progress and greets the learner.
async fn handle_create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId must not be empty".to_string()));
    }

    let lesson = state.catalog.get(&request.lesson_id)?.clone();
    let id = state.new_session_id();

    info!(
        session_id = %id,
        user_id = %request.user_id,
        lesson_id = %lesson.id,
        "Creating session"
    );

    let session =
        LessonSession::start(state.engine.clone(), id.clone(), request.user_id, lesson).await;
    let snapshot = session.snapshot();
    state
        .sessions
        .write()
        .await
        .insert(id, Arc::new(Mutex::new(session)));

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Handler for `GET /api/sessions/:id`.
async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(&id).await?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

/// Handler for `DELETE /api/sessions/:id`.
async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.remove_session(&id).await.is_none() {
        return Err(EngineError::session_not_found(&id).into());
    }
    info!(session_id = %id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/sessions/:id/run`.
async fn handle_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;

    let report = session.run(&request.code).await;
    if !report.persisted {
        warn!(session_id = %id, run = report.run, "Run finished but progress was not saved");
    }
    Ok(Json(report))
}

/// Handler for `POST /api/sessions/:id/messages`.
async fn handle_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let session = state.session(&id).await?;
    let mut session = session.lock().await;

    let turns = session.send_message(&request.text).await;
    Ok(Json(MessageResponse {
        turns,
        phase: session.phase(),
    }))
}

// ============================================================================
// Tests
// ============================================================================
