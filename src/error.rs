use serde::Serialize;
use thiserror::Error;

/// Which physical device a media request targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Microphone,
    Camera,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Microphone => write!(f, "microphone"),
            DeviceKind::Camera => write!(f, "camera"),
        }
    }
}

/// Failure of a single media device request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("{0} not found")]
    NotFound(DeviceKind),

    #[error("{0} access not allowed")]
    NotAllowed(DeviceKind),

    #[error("{0} is not readable (in use by another application?)")]
    NotReadable(DeviceKind),

    #[error("{kind} failed: {message}")]
    Other { kind: DeviceKind, message: String },
}

/// Error classes reported by a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorKind {
    NotAllowed,
    NoSpeech,
    Aborted,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map the wire name of a recognition error (`not-allowed`, `no-speech`, ...)
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" => Self::NotAllowed,
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Loading the interview context failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("interview not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Submitting the completed interview failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not encode submission: {0}")]
    Encoding(String),
}

/// Everything the session controller can surface to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("permission denied for {0}")]
    PermissionDenied(DeviceKind),

    #[error("{0} not found")]
    DeviceNotFound(DeviceKind),

    #[error("{0} is not readable")]
    DeviceUnreadable(DeviceKind),

    #[error("media initialisation failed: {0}")]
    MediaInit(String),

    #[error("speech recognition is not supported")]
    RecognitionUnsupported,

    #[error("speech recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("failed to load interview: {0}")]
    Fetch(#[from] FetchError),

    #[error("a question is still being read")]
    SpeechInProgress,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound(kind) => SessionError::DeviceNotFound(kind),
            DeviceError::NotAllowed(kind) => SessionError::PermissionDenied(kind),
            DeviceError::NotReadable(kind) => SessionError::DeviceUnreadable(kind),
            DeviceError::Other { kind, message } => {
                SessionError::MediaInit(format!("{}: {}", kind, message))
            }
        }
    }
}

impl SessionError {
    /// Blocking errors prevent the interview from starting until the user fixes
    /// their environment
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            SessionError::PermissionDenied(_)
                | SessionError::DeviceNotFound(_)
                | SessionError::DeviceUnreadable(_)
                | SessionError::RecognitionUnsupported
                | SessionError::Recognition(RecognitionErrorKind::NotAllowed)
        )
    }

    /// Text shown to the candidate, including remediation hints
    pub fn user_message(&self) -> String {
        match self {
            SessionError::PermissionDenied(_) => {
                "Camera and microphone access is not allowed. Allow both in the browser \
                 settings and try again."
                    .to_string()
            }
            SessionError::DeviceNotFound(_) => {
                "Camera or microphone not found. Check that the devices are connected, \
                 not blocked in the browser settings and not used by another application."
                    .to_string()
            }
            SessionError::DeviceUnreadable(_) => {
                "The device cannot be accessed. Another application may be using it.".to_string()
            }
            SessionError::MediaInit(_) => "Failed to initialise the camera.".to_string(),
            SessionError::RecognitionUnsupported => {
                "This browser does not support speech recognition. Chrome is recommended."
                    .to_string()
            }
            SessionError::Recognition(RecognitionErrorKind::NotAllowed) => {
                "Microphone use is not allowed for speech recognition. Check the browser \
                 settings."
                    .to_string()
            }
            SessionError::Recognition(_) => "A speech recognition error occurred.".to_string(),
            SessionError::Synthesis(_) => "A speech synthesis error occurred.".to_string(),
            SessionError::Submission(_) => {
                "Failed to complete the interview. Your answers were kept; please retry."
                    .to_string()
            }
            SessionError::Fetch(FetchError::NotFound) => "Interview not found.".to_string(),
            SessionError::Fetch(_) => "Failed to load the interview.".to_string(),
            SessionError::SpeechInProgress => {
                "Please wait until the question has been read.".to_string()
            }
            SessionError::InvalidState(what) => format!("Action not available: {}", what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_to_session_taxonomy() {
        assert_eq!(
            SessionError::from(DeviceError::NotAllowed(DeviceKind::Camera)),
            SessionError::PermissionDenied(DeviceKind::Camera)
        );
        assert_eq!(
            SessionError::from(DeviceError::NotFound(DeviceKind::Microphone)),
            SessionError::DeviceNotFound(DeviceKind::Microphone)
        );
        assert_eq!(
            SessionError::from(DeviceError::NotReadable(DeviceKind::Camera)),
            SessionError::DeviceUnreadable(DeviceKind::Camera)
        );
    }

    #[test]
    fn recognition_codes_parse() {
        assert_eq!(RecognitionErrorKind::from_code("not-allowed"), RecognitionErrorKind::NotAllowed);
        assert_eq!(RecognitionErrorKind::from_code("no-speech"), RecognitionErrorKind::NoSpeech);
        assert_eq!(RecognitionErrorKind::from_code("aborted"), RecognitionErrorKind::Aborted);
        assert_eq!(
            RecognitionErrorKind::from_code("network"),
            RecognitionErrorKind::Other("network".to_string())
        );
    }

    #[test]
    fn only_environment_errors_block() {
        assert!(SessionError::RecognitionUnsupported.is_blocking());
        assert!(SessionError::PermissionDenied(DeviceKind::Microphone).is_blocking());
        assert!(!SessionError::Recognition(RecognitionErrorKind::Aborted).is_blocking());
        assert!(!SessionError::SpeechInProgress.is_blocking());
    }
}
