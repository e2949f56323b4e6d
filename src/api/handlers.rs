//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ActionResponse, CancelResponse, ChoiceRequest, ErrorResponse, FileCategoriesRequest,
    FilesRequest, SuccessResponse, TextRequest,
};
use super::AppState;
use crate::flow::FlowTable;
use crate::runtime::{FlowSession, SessionError, SessionSnapshot, Submission};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/:id/reset", post(reset_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User actions
        .route("/api/sessions/:id/choice", post(submit_choice))
        .route("/api/sessions/:id/text", post(submit_text))
        .route("/api/sessions/:id/files", post(submit_files))
        .route(
            "/api/sessions/:id/file-categories",
            post(edit_file_categories),
        )
        // Reply control
        .route("/api/sessions/:id/reply", post(request_reply))
        .route("/api/sessions/:id/retry", post(retry_reply))
        .route("/api/sessions/:id/cancel", post(cancel_reply))
        // Flow table
        .route("/api/flow", get(get_flow))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

async fn find_session(state: &AppState, id: &str) -> Result<FlowSession, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    let session = state.sessions.create().await;
    Json(session.snapshot().await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(session.snapshot().await))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, &id).await?;
    session.start().await;
    Ok(Json(session.snapshot().await))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.remove(&id).await {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(AppError::NotFound(format!("Session not found: {id}")))
    }
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = find_session(&state, &id).await?;
    // Subscribe before the snapshot so no event falls between the two
    let rx = session.subscribe();
    let snapshot = session.snapshot().await;
    Ok(sse_stream(snapshot, rx))
}

// ============================================================
// User Actions
// ============================================================

async fn submit_choice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChoiceRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let submission = session.submit_choice(req.step, req.choice).await;
    Ok(Json(action_response(&session, submission).await))
}

async fn submit_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TextRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let submission = session.submit_free_text(req.text).await;
    Ok(Json(action_response(&session, submission).await))
}

async fn submit_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FilesRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let submission = session.submit_files(req.files).await;
    Ok(Json(action_response(&session, submission).await))
}

async fn edit_file_categories(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FileCategoriesRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let submission = match (req.category, req.other_description) {
        (Some(category), None) => session.toggle_file_category(category).await,
        (None, Some(text)) => session.set_other_file_description(text).await,
        _ => {
            return Err(AppError::BadRequest(
                "Provide exactly one of category or other_description".to_string(),
            ))
        }
    };
    Ok(Json(action_response(&session, submission).await))
}

/// The reply task keeps running after its handle is dropped
async fn action_response(session: &FlowSession, submission: Submission) -> ActionResponse {
    let (accepted, reason, reply_id) = match submission {
        Submission::Accepted { reply } => {
            (true, None, reply.map(|r| r.message_id().to_string()))
        }
        Submission::Discarded { reason } => (false, Some(reason.to_string()), None),
    };
    ActionResponse {
        accepted,
        reason,
        reply_id,
        snapshot: session.snapshot().await,
    }
}

// ============================================================
// Reply Control
// ============================================================

/// Regenerate the assistant reply for the current history
async fn request_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let reply = session.request_reply().await;
    Ok(Json(ActionResponse {
        accepted: true,
        reason: None,
        reply_id: Some(reply.message_id().to_string()),
        snapshot: session.snapshot().await,
    }))
}

async fn retry_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let reply = session.retry().await?;
    Ok(Json(ActionResponse {
        accepted: true,
        reason: None,
        reply_id: Some(reply.message_id().to_string()),
        snapshot: session.snapshot().await,
    }))
}

async fn cancel_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let cancelled = session.cancel().await;
    Ok(Json(CancelResponse {
        cancelled,
        snapshot: session.snapshot().await,
    }))
}

// ============================================================
// Flow Table & Version
// ============================================================

async fn get_flow(State(state): State<AppState>) -> Json<FlowTable> {
    Json(state.sessions.config().table.clone())
}

async fn get_version() -> &'static str {
    concat!("gaia-guide ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NothingToRetry => AppError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
