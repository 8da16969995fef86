use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::context::{InterviewContext, QuestionRef};
use super::state::{Advance, RecognitionState, SessionState};
use super::stats::{AnswerRecord, QuestionView, SessionView, TranscriptView};
use super::transcript::TranscriptBuffer;
use crate::api::{InterviewBackend, Submission, VideoPayload};
use crate::error::{RecognitionErrorKind, SessionError};
use crate::media::{
    DeviceEvent, Devices, EventReceiver, EventSender, MediaDevices, MediaRecorder, MediaStream,
    RecognitionEvent, RecognitionHandle, SpeechHandle, SpeechRecognizer, SpeechSynthesizer,
    SynthesisEvent, TrackKind, Utterance,
};

/// Drives a candidate through the interview questions
///
/// The controller is the single owner of every device resource: the combined
/// camera/microphone stream, the recorder, the recognizer and the
/// synthesizer. Devices report back through `DeviceEvent`s which the owner
/// feeds into `handle_event` (or `pump` / `next_event`).
///
/// Recognition and synthesis never overlap: speaking stops recognition first,
/// and recognition is resumed from the end of the utterance.
pub struct SessionController {
    config: SessionConfig,
    backend: Arc<dyn InterviewBackend>,

    media: Box<dyn MediaDevices>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,

    events_tx: EventSender,
    events_rx: Option<EventReceiver>,

    context: Option<InterviewContext>,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,

    stream: Option<MediaStream>,
    recorder: Option<Box<dyn MediaRecorder>>,

    recognition: RecognitionState,
    recognition_run: u64,
    auto_restart: bool,
    /// Set by a `not-allowed` error or by the user turning recognition off
    recognition_blocked: bool,
    restart_attempts: u32,
    restart_generation: u64,
    restart_task: Option<JoinHandle<()>>,

    speaking: bool,
    utterance_id: u64,

    transcript: TranscriptBuffer,
    answers: Vec<AnswerRecord>,
    committed_cursor: Option<usize>,
    pending_submission: Option<Submission>,

    error: Option<(SessionError, Instant)>,
}

impl SessionController {
    pub fn new(config: SessionConfig, backend: Arc<dyn InterviewBackend>, devices: Devices) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "Creating interview session {} (media: {}, recognizer: {}, synthesizer: {})",
            config.session_id,
            devices.media.name(),
            devices.recognizer.as_ref().map_or("unsupported", |r| r.name()),
            devices.synthesizer.as_ref().map_or("unsupported", |s| s.name()),
        );

        Self {
            config,
            backend,
            media: devices.media,
            recognizer: devices.recognizer,
            synthesizer: devices.synthesizer,
            events_tx,
            events_rx: Some(events_rx),
            context: None,
            state: SessionState::NotStarted,
            started_at: None,
            ended_at: None,
            stream: None,
            recorder: None,
            recognition: RecognitionState::Stopped,
            recognition_run: 0,
            auto_restart: false,
            recognition_blocked: false,
            restart_attempts: 0,
            restart_generation: 0,
            restart_task: None,
            speaking: false,
            utterance_id: 0,
            transcript: TranscriptBuffer::new(),
            answers: Vec::new(),
            committed_cursor: None,
            pending_submission: None,
            error: None,
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn context(&self) -> Option<&InterviewContext> {
        self.context.as_ref()
    }

    pub fn recognition_state(&self) -> RecognitionState {
        self.recognition
    }

    pub fn is_listening(&self) -> bool {
        self.recognition == RecognitionState::Listening
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    pub fn recognition_enabled(&self) -> bool {
        !self.recognition_blocked
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_task.is_some()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.as_ref().is_some_and(|r| r.is_recording())
    }

    pub fn transcript(&self) -> &TranscriptBuffer {
        &self.transcript
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// Submission kept after a failed completion request
    pub fn pending_submission(&self) -> Option<&Submission> {
        self.pending_submission.as_ref()
    }

    pub fn current_question(&self) -> Option<QuestionRef<'_>> {
        let cursor = self.state.cursor()?;
        self.context.as_ref()?.question_at(cursor)
    }

    /// The last surfaced error, until its display window has passed
    pub fn visible_error(&self) -> Option<&SessionError> {
        match &self.error {
            Some((err, shown_at)) if shown_at.elapsed() < self.config.error_display_window => {
                Some(err)
            }
            _ => None,
        }
    }

    pub fn view(&self) -> SessionView {
        let question = self.current_question().map(|q| QuestionView {
            id: q.question.id,
            text: q.question.text.clone(),
            number: q.index + 1,
            total: q.total,
            question_type: q.question_type,
            label: q.label(),
        });

        let failure = match &self.state {
            SessionState::Failed { reason } => Some(reason.user_message()),
            _ => None,
        };

        let duration_secs = self.started_at.map_or(0.0, |started| {
            let end = self.ended_at.unwrap_or_else(Utc::now);
            end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
        });

        SessionView {
            session_id: self.config.session_id.clone(),
            state: self.state.name().to_string(),
            failure,
            question,
            transcript: TranscriptView {
                finalized: self.transcript.finalized(),
                interim: self.transcript.interim().to_string(),
            },
            recognition: self.recognition,
            recognition_enabled: !self.recognition_blocked,
            speaking: self.speaking,
            recording: self.is_recording(),
            answers_committed: self.answers.len(),
            error: self.visible_error().map(SessionError::user_message),
            can_retry_submission: self.pending_submission.is_some()
                && matches!(
                    self.state,
                    SessionState::Failed {
                        reason: SessionError::Submission(_)
                    }
                ),
            started_at: self.started_at,
            duration_secs,
        }
    }

    // ========================================================================
    // Event plumbing
    // ========================================================================

    /// Hand the device event receiver to an external pump task
    ///
    /// After this, `pump` and `next_event` no longer see any events.
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.events_rx.take()
    }

    /// Handle every event already queued, returning how many were handled
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events_rx.as_mut().map(|rx| rx.try_recv()) {
                Some(Ok(event)) => event,
                _ => break,
            };
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next device event without handling it
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Handle events as they arrive for the given duration
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            match tokio::time::timeout_at(deadline, self.next_event()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) | Err(_) => break,
            }
        }
    }

    /// Handle events until the current question has been read out
    pub async fn wait_until_spoken(&mut self) {
        while self.speaking {
            match self.next_event().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Recognition { run, event } => {
                if run != self.recognition_run {
                    debug!("Ignoring {:?} from stale recognition run {}", event, run);
                    return;
                }
                self.on_recognition_event(event);
            }
            DeviceEvent::Synthesis { utterance, event } => {
                if utterance != self.utterance_id {
                    debug!("Ignoring {:?} from stale utterance {}", event, utterance);
                    return;
                }
                self.on_synthesis_event(event);
            }
            DeviceEvent::RestartDue { generation } => {
                if generation != self.restart_generation {
                    debug!("Ignoring cancelled restart {}", generation);
                    return;
                }
                self.restart_task = None;
                self.on_restart_due();
            }
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Load the interview and its questions
    pub async fn fetch_context(&mut self, slug: &str) -> Result<(), SessionError> {
        if self.state.is_active() {
            return Err(SessionError::InvalidState("session is already active"));
        }

        info!("Loading interview {}", slug);

        let backend = Arc::clone(&self.backend);
        match backend.fetch_context(slug).await {
            Ok(context) => {
                info!(
                    "Interview {} loaded: {} base, {} custom questions",
                    context.interview_id,
                    context.base_questions().len(),
                    context.custom_questions().len()
                );
                self.context = Some(context);
                if matches!(self.state, SessionState::Failed { .. }) {
                    self.state = SessionState::NotStarted;
                }
                Ok(())
            }
            Err(e) => {
                let err = SessionError::Fetch(e);
                error!("Failed to load interview {}: {}", slug, err);
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Ask for the microphone, then the camera
    ///
    /// On any failure every already-acquired track is stopped and the session
    /// goes back to `NotStarted` so the start control can be offered again.
    pub async fn request_permissions(&mut self) -> Result<(), SessionError> {
        if self.state.is_active() {
            return Err(SessionError::InvalidState("session is already active"));
        }

        info!("Requesting media permissions");

        self.release_stream();
        self.state = SessionState::AwaitingPermissions;

        let constraints = self.config.constraints.clone();

        let microphone = match self.media.request_microphone(&constraints.audio).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.permission_failed(e.into())),
        };
        info!("Microphone permission granted");

        let camera = match self.media.request_camera(&constraints.video).await {
            Ok(stream) => stream,
            Err(e) => {
                let stopped = microphone.stop_all();
                debug!("Released {} microphone track(s) after camera failure", stopped);
                return Err(self.permission_failed(e.into()));
            }
        };
        info!("Camera permission granted");

        self.stream = Some(MediaStream::combine(microphone, camera));
        self.state = SessionState::NotStarted;

        info!("All media permissions granted");
        Ok(())
    }

    fn permission_failed(&mut self, err: SessionError) -> SessionError {
        warn!("Media permission request failed: {}", err);
        self.state = SessionState::NotStarted;
        self.surface(err.clone());
        err
    }

    /// Begin the interview on the granted stream
    pub async fn start_session(&mut self) -> Result<(), SessionError> {
        let total = match &self.context {
            Some(context) => context.total_questions(),
            None => return Err(SessionError::InvalidState("interview is not loaded")),
        };
        if self.state.is_active() {
            return Err(SessionError::InvalidState("session is already active"));
        }
        if total == 0 {
            return Err(SessionError::InvalidState("interview has no questions"));
        }
        if self.recognizer.is_none() {
            let err = SessionError::RecognitionUnsupported;
            self.surface(err.clone());
            return Err(err);
        }

        let stream = match self.stream.as_ref() {
            Some(stream) => stream,
            None => return Err(SessionError::InvalidState("media permissions not granted")),
        };

        if !stream.is_active() || !stream.has_live_track(TrackKind::Video) {
            let err = SessionError::MediaInit("camera stream is not active".to_string());
            error!("{}", err);
            self.release_stream();
            self.fail(err.clone());
            return Err(err);
        }

        let mut recorder = match self.media.create_recorder() {
            Ok(recorder) => recorder,
            Err(e) => return Err(self.media_failed(e.to_string())),
        };
        if let Err(e) = recorder.start(stream) {
            return Err(self.media_failed(e.to_string()));
        }
        self.recorder = Some(recorder);

        info!(
            "Starting interview session {} ({} questions)",
            self.config.session_id, total
        );

        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.state = SessionState::Active { cursor: 0 };
        self.answers.clear();
        self.transcript.clear();
        self.committed_cursor = None;
        self.pending_submission = None;
        self.recognition_blocked = false;

        if let Err(e) = self.start_recognition() {
            warn!("Speech recognition did not start: {}", e);
        }
        self.speak_current_question();

        Ok(())
    }

    fn media_failed(&mut self, message: String) -> SessionError {
        let err = SessionError::MediaInit(message);
        error!("Failed to start recording: {}", err);
        self.recorder = None;
        self.release_stream();
        self.fail(err.clone());
        err
    }

    /// Request permissions, then start the session
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.context.is_none() {
            return Err(SessionError::InvalidState("interview is not loaded"));
        }
        if self.recognizer.is_none() {
            let err = SessionError::RecognitionUnsupported;
            self.surface(err.clone());
            return Err(err);
        }

        self.request_permissions().await?;
        self.start_session().await
    }

    /// Commit the current answer and move to the next question
    ///
    /// Rejected while a question is being read. Past the last question this
    /// finishes the interview.
    pub async fn advance_question(&mut self) -> Result<Advance, SessionError> {
        let cursor = match self.state {
            SessionState::Active { cursor } => cursor,
            _ => return Err(SessionError::InvalidState("session is not active")),
        };
        if self.speaking {
            warn!("Ignoring next question while the current one is being read");
            return Err(SessionError::SpeechInProgress);
        }

        let total = self.context.as_ref().map_or(0, |c| c.total_questions());
        if cursor + 1 >= total {
            self.finish_session().await?;
            return Ok(Advance::Finished);
        }

        self.commit_answer(cursor);
        self.transcript.clear();

        let next = cursor + 1;
        self.state = SessionState::Active { cursor: next };
        info!("Advancing to question {} of {}", next + 1, total);
        self.speak_current_question();

        Ok(Advance::Next { cursor: next })
    }

    /// Stop capture, assemble the recording and answers, and submit them
    pub async fn finish_session(&mut self) -> Result<(), SessionError> {
        let cursor = match self.state {
            SessionState::Active { cursor } => cursor,
            _ => return Err(SessionError::InvalidState("session is not active")),
        };
        let interview_id = match &self.context {
            Some(context) => context.interview_id,
            None => return Err(SessionError::InvalidState("interview is not loaded")),
        };

        info!("Finishing interview session {}", self.config.session_id);
        self.ended_at = Some(Utc::now());

        self.stop_recognition();
        self.cancel_speech();

        let video = match self.recorder.take() {
            Some(mut recorder) => {
                let mime_type = recorder.mime_type().to_string();
                let chunks = match recorder.stop().await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        error!("Recorder failed to flush: {}", e);
                        Vec::new()
                    }
                };
                info!("Recording stopped ({} chunks)", chunks.len());
                VideoPayload::from_chunks(chunks, &mime_type)
            }
            None => VideoPayload::from_chunks(Vec::new(), "video/webm"),
        };

        if video.is_empty() {
            warn!("Submitting interview without recorded video");
        }

        self.commit_answer(cursor);
        self.transcript.clear();
        self.release_stream();

        if let Some(dir) = self.config.recording_dir.clone() {
            match save_recording(dir, &self.config.session_id, &video).await {
                Ok(path) => info!("Saved local recording to {}", path.display()),
                Err(e) => warn!("Failed to save local recording: {}", e),
            }
        }

        self.pending_submission = Some(Submission {
            interview_id,
            video,
            answers: self.answers.clone(),
        });

        self.submit().await
    }

    /// Resubmit the recording and answers after a failed completion request
    pub async fn retry_submission(&mut self) -> Result<(), SessionError> {
        let retryable = matches!(
            self.state,
            SessionState::Failed {
                reason: SessionError::Submission(_)
            }
        );
        if !retryable || self.pending_submission.is_none() {
            return Err(SessionError::InvalidState("no failed submission to retry"));
        }

        info!("Retrying interview submission");
        self.submit().await
    }

    async fn submit(&mut self) -> Result<(), SessionError> {
        let backend = Arc::clone(&self.backend);
        let submission = match self.pending_submission.as_ref() {
            Some(submission) => submission,
            None => return Err(SessionError::InvalidState("nothing to submit")),
        };

        match backend.complete_interview(submission).await {
            Ok(()) => {
                info!(
                    "Interview {} completed with {} answers",
                    submission.interview_id,
                    submission.answers.len()
                );
                self.pending_submission = None;
                self.state = SessionState::Finished;
                self.teardown();
                Ok(())
            }
            Err(e) => {
                let err = SessionError::Submission(e);
                error!("Failed to complete interview: {}", err);
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    fn commit_answer(&mut self, cursor: usize) {
        if self.committed_cursor == Some(cursor) {
            return;
        }

        let record = match self.context.as_ref().and_then(|c| c.question_at(cursor)) {
            Some(q) => AnswerRecord {
                question_id: q.question.id,
                question_text: q.question.text.clone(),
                answer_text: self.transcript.finalized(),
                question_type: q.question_type,
                answered_at: Utc::now(),
            },
            None => return,
        };

        debug!(
            "Committed answer for question {} ({} chars)",
            record.question_id,
            record.answer_text.len()
        );
        self.answers.push(record);
        self.committed_cursor = Some(cursor);
    }

    /// Release every device resource
    ///
    /// Safe to call in any state and any number of times; also runs on drop.
    pub fn teardown(&mut self) {
        let had_resources = self.stream.is_some()
            || self.recorder.is_some()
            || self.recognition != RecognitionState::Stopped
            || self.speaking;

        self.stop_recognition();
        self.cancel_speech();
        self.recorder = None;
        self.release_stream();

        if self.state.is_active() {
            self.state = SessionState::NotStarted;
        }

        if had_resources {
            info!("Interview session {} torn down", self.config.session_id);
        }
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let stopped = stream.stop_all();
            debug!("Stopped {} track(s) of stream {}", stopped, stream.id());
        }
    }

    fn fail(&mut self, reason: SessionError) {
        self.surface(reason.clone());
        self.state = SessionState::Failed { reason };
    }

    fn surface(&mut self, err: SessionError) {
        self.error = Some((err, Instant::now()));
    }

    // ========================================================================
    // Presentation actions
    // ========================================================================

    /// Turn recognition off, or back on (also clears a sticky `not-allowed`)
    ///
    /// While a question is read, recognition is off but still wanted once
    /// playback ends, so a toggle then turns it off. After the restart limit it
    /// is neither running nor blocked, and a toggle turns it back on.
    ///
    /// Returns whether recognition is enabled afterwards.
    pub fn toggle_recognition(&mut self) -> Result<bool, SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::InvalidState("session is not active"));
        }

        let wanted = self.recognition != RecognitionState::Stopped || self.speaking;
        if !self.recognition_blocked && wanted {
            info!("Speech recognition turned off");
            self.stop_recognition();
            self.recognition_blocked = true;
            return Ok(false);
        }

        info!("Speech recognition turned on");
        self.recognition_blocked = false;
        self.error = None;
        if !self.speaking {
            self.start_recognition()?;
        }
        Ok(true)
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Read the current question aloud again
    pub fn replay_question(&mut self) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::InvalidState("session is not active"));
        }
        self.speak_current_question();
        Ok(())
    }

    // ========================================================================
    // Speech recognition
    // ========================================================================

    /// Intentional start: enables auto restart and resets the restart budget
    fn start_recognition(&mut self) -> Result<(), SessionError> {
        if self.speaking {
            debug!("Not starting recognition while speaking");
            return Ok(());
        }
        if self.recognition == RecognitionState::Listening {
            debug!("Recognition is already running");
            return Ok(());
        }
        if self.recognizer.is_none() {
            return Err(SessionError::RecognitionUnsupported);
        }

        self.cancel_pending_restart();
        self.restart_attempts = 0;

        match self.launch_recognition() {
            Ok(()) => {
                self.auto_restart = true;
                Ok(())
            }
            Err(kind) => {
                let err = SessionError::Recognition(kind.clone());
                error!("Failed to start speech recognition: {}", err);
                if kind == RecognitionErrorKind::NotAllowed {
                    self.on_recognition_error(kind);
                } else {
                    self.surface(err.clone());
                }
                Err(err)
            }
        }
    }

    fn launch_recognition(&mut self) -> Result<(), RecognitionErrorKind> {
        let recognizer = match self.recognizer.as_mut() {
            Some(recognizer) => recognizer,
            None => return Err(RecognitionErrorKind::Other("unsupported".to_string())),
        };

        self.recognition_run += 1;
        let handle = RecognitionHandle::new(self.recognition_run, self.events_tx.clone());

        match recognizer.start(&self.config.recognition_lang, handle) {
            Ok(()) => {
                debug!("Recognition run {} started", self.recognition_run);
                self.recognition = RecognitionState::Listening;
                Ok(())
            }
            Err(kind) => {
                self.recognition = RecognitionState::Stopped;
                Err(kind)
            }
        }
    }

    /// Intentional stop: disables auto restart
    fn stop_recognition(&mut self) {
        self.auto_restart = false;
        self.cancel_pending_restart();

        if self.recognition == RecognitionState::Listening {
            if let Some(recognizer) = self.recognizer.as_mut() {
                recognizer.stop();
            }
            debug!("Recognition run {} stopped", self.recognition_run);
        }

        // Anything the stopped run still reports is stale
        self.recognition_run += 1;
        self.recognition = RecognitionState::Stopped;
    }

    fn schedule_restart(&mut self) {
        if self.restart_task.is_some() {
            debug!("Recognition restart already pending");
            return;
        }

        if self.restart_attempts >= self.config.max_restart_attempts {
            warn!(
                "Giving up on speech recognition after {} restart attempts",
                self.restart_attempts
            );
            self.auto_restart = false;
            self.recognition = RecognitionState::Stopped;
            self.surface(SessionError::Recognition(RecognitionErrorKind::Other(
                "restart-limit".to_string(),
            )));
            return;
        }

        self.restart_attempts += 1;
        self.restart_generation += 1;

        let generation = self.restart_generation;
        let delay = self.config.restart_delay;
        let tx = self.events_tx.clone();

        info!(
            "Restarting speech recognition in {:?} (attempt {})",
            delay, self.restart_attempts
        );

        self.restart_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DeviceEvent::RestartDue { generation });
        }));
        self.recognition = RecognitionState::Restarting;
    }

    fn cancel_pending_restart(&mut self) {
        if let Some(task) = self.restart_task.take() {
            task.abort();
            self.restart_generation += 1;
            debug!("Cancelled pending recognition restart");
        }
        if self.recognition == RecognitionState::Restarting {
            self.recognition = RecognitionState::Stopped;
        }
    }

    fn can_auto_restart(&self) -> bool {
        self.auto_restart && !self.recognition_blocked && !self.speaking && self.state.is_active()
    }

    fn on_restart_due(&mut self) {
        if self.recognition == RecognitionState::Restarting {
            self.recognition = RecognitionState::Stopped;
        }
        if !self.can_auto_restart() {
            debug!("Recognition restart no longer wanted");
            return;
        }

        info!("Automatically restarting speech recognition");
        if let Err(kind) = self.launch_recognition() {
            error!("Error restarting recognition: {}", kind);
            if kind == RecognitionErrorKind::NotAllowed {
                self.on_recognition_error(kind);
                return;
            }
            self.surface(SessionError::Recognition(kind));
            self.schedule_restart();
        }
    }

    fn on_recognition_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                debug!("Speech recognition service has started");
            }
            RecognitionEvent::Result(batch) => {
                self.restart_attempts = 0;
                self.transcript.apply(&batch);
            }
            RecognitionEvent::Error(kind) => self.on_recognition_error(kind),
            RecognitionEvent::Ended => {
                info!("Speech recognition service disconnected");
                if self.restart_task.is_some() {
                    return;
                }
                self.recognition = RecognitionState::Stopped;
                if self.can_auto_restart() {
                    self.schedule_restart();
                }
            }
        }
    }

    fn on_recognition_error(&mut self, kind: RecognitionErrorKind) {
        match kind {
            RecognitionErrorKind::NotAllowed => {
                error!("Speech recognition not allowed; automatic restart disabled");
                self.auto_restart = false;
                self.recognition_blocked = true;
                self.cancel_pending_restart();
                self.recognition = RecognitionState::Stopped;
                self.surface(SessionError::Recognition(RecognitionErrorKind::NotAllowed));
            }
            RecognitionErrorKind::NoSpeech => {
                debug!("No speech detected");
            }
            RecognitionErrorKind::Aborted => {
                info!("Recognition aborted");
                if self.can_auto_restart() {
                    self.schedule_restart();
                }
            }
            other => {
                warn!("Speech recognition error: {}", other);
                self.surface(SessionError::Recognition(other));
                if self.can_auto_restart() {
                    self.schedule_restart();
                }
            }
        }
    }

    // ========================================================================
    // Speech synthesis
    // ========================================================================

    fn speak_current_question(&mut self) {
        let text = match self.current_question() {
            Some(q) => q.question.text.clone(),
            None => return,
        };
        self.speak(text);
    }

    fn speak(&mut self, text: String) {
        self.cancel_speech();
        self.stop_recognition();

        self.utterance_id += 1;
        let handle = SpeechHandle::new(self.utterance_id, self.events_tx.clone());
        let utterance = Utterance {
            text,
            lang: self.config.voice.lang.clone(),
            rate: self.config.voice.rate,
            pitch: self.config.voice.pitch,
        };

        let outcome = match self.synthesizer.as_mut() {
            Some(synthesizer) => {
                self.speaking = true;
                synthesizer.speak(utterance, handle)
            }
            None => Err("speech synthesis not supported".to_string()),
        };

        if let Err(message) = outcome {
            error!("Error in speech synthesis: {}", message);
            self.speaking = false;
            self.surface(SessionError::Synthesis(message));
            self.resume_after_speech();
        }
    }

    fn cancel_speech(&mut self) {
        if !self.speaking {
            return;
        }
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
        }
        self.speaking = false;
        // Late events of the cancelled utterance are stale
        self.utterance_id += 1;
    }

    fn resume_after_speech(&mut self) {
        if self.recognition_blocked || !self.state.is_active() {
            return;
        }
        if let Err(e) = self.start_recognition() {
            warn!("Could not resume recognition after speech: {}", e);
        }
    }

    fn on_synthesis_event(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started => debug!("Speech started"),
            SynthesisEvent::Ended => {
                if !self.speaking {
                    return;
                }
                debug!("Speech ended");
                self.speaking = false;
                self.resume_after_speech();
            }
            SynthesisEvent::Error(message) => {
                if !self.speaking {
                    return;
                }
                error!("Speech synthesis error: {}", message);
                self.speaking = false;
                self.surface(SessionError::Synthesis(message));
                self.resume_after_speech();
            }
        }
    }
}

async fn save_recording(
    dir: PathBuf,
    session_id: &str,
    video: &VideoPayload,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.webm", session_id));
    tokio::fs::write(&path, &video.bytes).await?;
    Ok(path)
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}
