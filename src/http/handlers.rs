use super::state::AppState;
use crate::error::{FetchError, SessionError};
use crate::session::{Advance, SessionView};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    /// "next" or "finished"
    pub outcome: String,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub recognition_enabled: bool,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Remediation text for the candidate
    pub message: String,
    pub blocking: bool,
}

fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::InvalidState(_) | SessionError::SpeechInProgress => StatusCode::CONFLICT,
        SessionError::Fetch(FetchError::NotFound) => StatusCode::NOT_FOUND,
        SessionError::Fetch(_) | SessionError::Submission(_) => StatusCode::BAD_GATEWAY,
        e if e.is_blocking() => StatusCode::PRECONDITION_FAILED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &SessionError) -> Response {
    (
        status_for(err),
        Json(ErrorResponse {
            error: err.to_string(),
            message: err.user_message(),
            blocking: err.is_blocking(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
/// Snapshot of the interview session
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    (StatusCode::OK, Json(session.view()))
}

/// POST /session/start
/// Load the interview if needed, request permissions and start
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;

    if session.context().is_none() {
        if let Err(e) = session.fetch_context(&state.slug).await {
            error!("Failed to load interview {}: {}", state.slug, e);
            return error_response(&e);
        }
    }

    match session.start().await {
        Ok(()) => {
            info!("Interview started through the control surface");
            (StatusCode::OK, Json(session.view())).into_response()
        }
        Err(e) => {
            error!("Failed to start interview: {}", e);
            error_response(&e)
        }
    }
}

/// POST /session/next
/// Commit the current answer and move on (finishes after the last question)
pub async fn next_question(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;

    match session.advance_question().await {
        Ok(advance) => {
            let outcome = match advance {
                Advance::Next { .. } => "next",
                Advance::Finished => "finished",
            };
            (
                StatusCode::OK,
                Json(AdvanceResponse {
                    outcome: outcome.to_string(),
                    session: session.view(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Next question rejected: {}", e);
            error_response(&e)
        }
    }
}

/// POST /session/recognition/toggle
pub async fn toggle_recognition(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;

    match session.toggle_recognition() {
        Ok(enabled) => (
            StatusCode::OK,
            Json(ToggleResponse {
                recognition_enabled: enabled,
                session: session.view(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /session/transcript/clear
pub async fn clear_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    session.clear_transcript();
    (StatusCode::OK, Json(session.view()))
}

/// POST /session/question/replay
pub async fn replay_question(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;

    match session.replay_question() {
        Ok(()) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /session/submit/retry
/// Resubmit a recording whose completion request failed
pub async fn retry_submission(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.lock().await;

    match session.retry_submission().await {
        Ok(()) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(e) => {
            error!("Retry failed: {}", e);
            error_response(&e)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
