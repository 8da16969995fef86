use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session snapshot
        .route("/session", get(handlers::get_session))
        // Interview control
        .route("/session/start", post(handlers::start_session))
        .route("/session/next", post(handlers::next_question))
        .route(
            "/session/question/replay",
            post(handlers::replay_question),
        )
        .route(
            "/session/recognition/toggle",
            post(handlers::toggle_recognition),
        )
        .route(
            "/session/transcript/clear",
            post(handlers::clear_transcript),
        )
        .route("/session/submit/retry", post(handlers::retry_submission))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
