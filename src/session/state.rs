use serde::Serialize;

use crate::error::SessionError;

/// Lifecycle of an interview session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    AwaitingPermissions,
    /// `cursor` indexes base ++ custom questions
    Active { cursor: usize },
    Finished,
    Failed { reason: SessionError },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::AwaitingPermissions => "awaiting_permissions",
            SessionState::Active { .. } => "active",
            SessionState::Finished => "finished",
            SessionState::Failed { .. } => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn cursor(&self) -> Option<usize> {
        match self {
            SessionState::Active { cursor } => Some(*cursor),
            _ => None,
        }
    }
}

/// Speech recognizer lifecycle as tracked by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    Stopped,
    Listening,
    /// A delayed restart is scheduled
    Restarting,
}

/// Outcome of `advance_question`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved on; the new question is being read
    Next { cursor: usize },
    /// The last question was answered and the interview was submitted
    Finished,
}
