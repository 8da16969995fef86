pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod session;

pub use api::{ApiClient, InterviewBackend, Submission, VideoPayload};
pub use config::Config;
pub use error::{
    DeviceError, DeviceKind, FetchError, RecognitionErrorKind, SessionError, SubmissionError,
};
pub use http::{create_router, AppState};
pub use media::{
    DeviceOutcome, DeviceScript, Devices, MediaProbe, RecognizerProbe, ScriptedDevices,
    SynthesizerProbe,
};
pub use session::{
    Advance, AnswerRecord, InterviewContext, Question, QuestionType, RecognitionState,
    SessionConfig, SessionController, SessionState, SessionView, TranscriptBuffer,
};
