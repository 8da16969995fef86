use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::MediaConstraints;

/// Voice used to read questions aloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            lang: "ja-JP".to_string(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Configuration for an interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier used in logs (e.g., "interview-<uuid>")
    pub session_id: String,

    /// Delay before recognition is restarted after an unexpected end
    /// Default: 1 second
    pub restart_delay: Duration,

    /// Consecutive restarts without any recognized speech before giving up
    pub max_restart_attempts: u32,

    /// How long a surfaced error stays visible
    pub error_display_window: Duration,

    /// Recognition language (BCP 47)
    pub recognition_lang: String,

    pub voice: VoiceSettings,

    pub constraints: MediaConstraints,

    /// Where a local copy of the finished recording is written, if anywhere
    pub recording_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("interview-{}", uuid::Uuid::new_v4()),
            restart_delay: Duration::from_secs(1),
            max_restart_attempts: 3,
            error_display_window: Duration::from_secs(5),
            recognition_lang: "ja-JP".to_string(),
            voice: VoiceSettings::default(),
            constraints: MediaConstraints::default(),
            recording_dir: None,
        }
    }
}
