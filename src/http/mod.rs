//! HTTP API server for local control of the interview
//!
//! This module exposes the candidate-facing actions as a REST API:
//! - GET /session - Session snapshot (question, transcript, flags, error)
//! - POST /session/start - Request permissions and start the interview
//! - POST /session/next - Next question, or finish after the last one
//! - POST /session/question/replay - Read the current question again
//! - POST /session/recognition/toggle - Turn recognition off or back on
//! - POST /session/transcript/clear - Clear the current transcript
//! - POST /session/submit/retry - Retry a failed submission
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
