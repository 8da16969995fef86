// Shared test doubles: an in-memory interview backend and scripted devices

#![allow(dead_code)]

use interview_session::api::InterviewBackend;
use interview_session::error::{FetchError, SubmissionError};
use interview_session::media::{
    DeviceScript, MediaProbe, RecognizerProbe, ScriptedDevices, SynthesizerProbe,
};
use interview_session::session::{InterviewContext, Question, SessionConfig, SessionController};
use interview_session::Submission;
use std::sync::{Arc, Mutex};

pub const SLUG: &str = "test-slug";

/// Interview with `base` base questions followed by `custom` custom questions
pub fn context(base: usize, custom: usize) -> InterviewContext {
    let base_questions = (1..=base)
        .map(|n| Question {
            id: n as i64,
            text: format!("Base question {}", n),
            position: n as i32,
        })
        .collect();
    let custom_questions = (1..=custom)
        .map(|n| Question {
            id: 100 + n as i64,
            text: format!("Custom question {}", n),
            position: n as i32,
        })
        .collect();

    InterviewContext::new(7, SLUG, base_questions, custom_questions)
}

/// In-memory interview backend
pub struct FakeBackend {
    context: Option<InterviewContext>,
    failures_left: Mutex<u32>,
    submissions: Mutex<Vec<Submission>>,
}

impl FakeBackend {
    pub fn new(context: InterviewContext) -> Arc<Self> {
        Self::failing(context, 0)
    }

    /// Reject the first `failures` completion requests
    pub fn failing(context: InterviewContext, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            context: Some(context),
            failures_left: Mutex::new(failures),
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            context: None,
            failures_left: Mutex::new(0),
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InterviewBackend for FakeBackend {
    async fn fetch_context(&self, _slug: &str) -> Result<InterviewContext, FetchError> {
        self.context.clone().ok_or(FetchError::NotFound)
    }

    async fn complete_interview(&self, submission: &Submission) -> Result<(), SubmissionError> {
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SubmissionError::Status {
                    status: 500,
                    message: "internal server error".to_string(),
                });
            }
        }
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(())
    }
}

/// A controller on scripted devices plus the probes observing them
pub struct Harness {
    pub session: SessionController,
    pub media: MediaProbe,
    pub recognizer: RecognizerProbe,
    pub synthesizer: SynthesizerProbe,
    pub backend: Arc<FakeBackend>,
}

pub fn harness(script: DeviceScript, backend: Arc<FakeBackend>) -> Harness {
    harness_with_config(script, backend, SessionConfig::default())
}

pub fn harness_with_config(
    script: DeviceScript,
    backend: Arc<FakeBackend>,
    config: SessionConfig,
) -> Harness {
    let scripted = ScriptedDevices::new(script);
    let dyn_backend: Arc<dyn InterviewBackend> = backend.clone();
    let session = SessionController::new(config, dyn_backend, scripted.devices);

    Harness {
        session,
        media: scripted.media,
        recognizer: scripted.recognizer,
        synthesizer: scripted.synthesizer,
        backend,
    }
}

/// A started interview whose first question is being read
pub async fn started(base: usize, custom: usize) -> Harness {
    let mut h = harness(DeviceScript::default(), FakeBackend::new(context(base, custom)));
    h.session.fetch_context(SLUG).await.unwrap();
    h.session.start().await.unwrap();
    h.session.pump();
    h
}

impl Harness {
    /// Finish reading the current question
    pub fn finish_speech(&mut self) {
        self.synthesizer.finish();
        self.session.pump();
    }

    /// The candidate says one finalized utterance
    pub fn say(&mut self, text: &str) {
        self.recognizer.emit_final(text);
        self.session.pump();
    }

    pub fn interim(&mut self, text: &str) {
        self.recognizer.emit_interim(text);
        self.session.pump();
    }

    /// The recognition service disconnects on its own
    pub fn drop_recognition(&mut self) {
        self.recognizer.emit_end();
        self.session.pump();
    }
}
