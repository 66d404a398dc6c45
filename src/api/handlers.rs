//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AskRequest, AskResponse, ErrorResponse, StatusResponse, SuccessResponse, ToolsResponse,
};
use super::AppState;
use crate::config::AgentConfig;
use crate::runtime::AgentError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/configure", post(configure))
        .route("/api/reset", post(reset))
        .route("/api/status", get(status))
        // Questions
        .route("/api/ask", post(ask))
        .route("/api/ask/stream", post(ask_stream))
        // Manifest
        .route("/api/tools", get(list_tools))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn configure(
    State(state): State<AppState>,
    Json(config): Json<AgentConfig>,
) -> Result<Json<StatusResponse>, AppError> {
    if !config.is_complete() {
        return Err(AppError::BadRequest(
            "All configuration parameters are required".to_string(),
        ));
    }

    match state.session.initialize(&config).await {
        Ok(()) => Ok(Json(StatusResponse { initialized: true })),
        Err(AgentError::NotInitialized) => Err(AppError::BadRequest(
            "All configuration parameters are required".to_string(),
        )),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn reset(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.session.reset().await;
    Json(SuccessResponse { success: true })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        initialized: state.session.is_initialized().await,
    })
}

// ============================================================
// Questions
// ============================================================

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Json<AskResponse>, AppError> {
    let question = non_empty_question(&req)?;
    let answer = state.session.ask(question, req.config.as_ref()).await;
    Ok(Json(AskResponse { answer }))
}

async fn ask_stream(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Response, AppError> {
    let question = non_empty_question(&req)?;
    let steps = state.session.ask_streaming(question, req.config.as_ref()).await;
    Ok(sse_stream(steps).into_response())
}

fn non_empty_question(req: &AskRequest) -> Result<&str, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(AppError::BadRequest("Question must not be empty".to_string()));
    }
    Ok(question)
}

// ============================================================
// Manifest
// ============================================================

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.session.definitions().await,
    })
}

async fn get_version() -> &'static str {
    concat!("pharma-assistant ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
