//! Interview session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Camera and microphone permissions
//! - Question playback through speech synthesis
//! - Continuous speech recognition with bounded automatic restarts
//! - Per-question transcripts and answer records
//! - Video recording and the final submission

mod config;
mod context;
mod controller;
mod state;
mod stats;
mod transcript;

pub use config::{SessionConfig, VoiceSettings};
pub use context::{InterviewContext, Question, QuestionRef, QuestionType};
pub use controller::SessionController;
pub use state::{Advance, RecognitionState, SessionState};
pub use stats::{AnswerRecord, QuestionView, SessionView, TranscriptView};
pub use transcript::TranscriptBuffer;
