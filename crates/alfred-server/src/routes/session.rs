use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use alfred::session::Session;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct CreateSessionResponse {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListSessionsResponse {
    sessions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeedbackRequest {
    score: u8,
    #[serde(default)]
    comment: Option<String>,
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.sessions.create().await;
    tracing::info!(session_id = %id, "session created");
    (StatusCode::CREATED, Json(CreateSessionResponse { id }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse {
        sessions: state.sessions.ids().await,
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let entry = state
        .sessions
        .get(&id)
        .await
        .ok_or(ApiError::SessionNotFound(id))?;
    let session = entry.lock().await.session.clone();
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

/// Rate the last finished turn of a session
async fn feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
    let trace = entry
        .lock()
        .await
        .last_trace
        .clone()
        .ok_or_else(|| ApiError::Conflict(format!("Session '{}' has no answer to rate yet", id)))?;

    state
        .agent
        .record_feedback(&trace, request.score, request.comment)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(json!({ "status": "recorded", "trace_id": trace.trace_id })))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/feedback", post(feedback))
        .with_state(state)
}
