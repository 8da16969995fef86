use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::QuestionType;
use super::state::RecognitionState;

/// The candidate's answer to one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub question_text: String,

    /// Finalized transcript at the moment the candidate moved on
    pub answer_text: String,

    pub question_type: QuestionType,

    /// When the answer was committed
    pub answered_at: DateTime<Utc>,
}

/// Snapshot of the session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,

    /// `not_started`, `awaiting_permissions`, `active`, `finished` or `failed`
    pub state: String,

    /// Failure reason while the session is `failed`
    pub failure: Option<String>,

    pub question: Option<QuestionView>,

    pub transcript: TranscriptView,

    pub recognition: RecognitionState,
    pub recognition_enabled: bool,
    pub speaking: bool,
    pub recording: bool,

    pub answers_committed: usize,

    /// Transient error text, cleared after the display window
    pub error: Option<String>,

    /// A failed submission can be retried
    pub can_retry_submission: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub text: String,
    /// One-based position in base ++ custom
    pub number: usize,
    pub total: usize,
    pub question_type: QuestionType,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptView {
    pub finalized: String,
    pub interim: String,
}
