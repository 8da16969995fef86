// Scripted device backend
//
// Stands in for the browser devices: outcomes, recorded chunks and spoken
// answers come from a `DeviceScript`. Each device exposes a probe so the
// driver (CLI autopilot or a test) can observe and steer it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{
    AudioConstraints, Devices, MediaDevices, MediaRecorder, MediaStream, MediaTrack,
    SpeechRecognizer, SpeechSynthesizer, TrackKind, Utterance, VideoConstraints,
};
use super::events::{RecognitionBatch, RecognitionHandle, SpeechHandle};
use crate::error::{DeviceError, DeviceKind, RecognitionErrorKind};

/// Result of a scripted device request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceOutcome {
    #[default]
    Granted,
    NotFound,
    NotAllowed,
    NotReadable,
}

impl DeviceOutcome {
    fn into_result(self, kind: DeviceKind) -> Result<(), DeviceError> {
        match self {
            DeviceOutcome::Granted => Ok(()),
            DeviceOutcome::NotFound => Err(DeviceError::NotFound(kind)),
            DeviceOutcome::NotAllowed => Err(DeviceError::NotAllowed(kind)),
            DeviceOutcome::NotReadable => Err(DeviceError::NotReadable(kind)),
        }
    }
}

/// Behaviour of the scripted devices
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceScript {
    pub microphone: DeviceOutcome,
    pub camera: DeviceOutcome,
    /// Whether the granted camera delivers frames
    pub camera_active: bool,
    pub recognition_supported: bool,
    pub synthesis_supported: bool,
    /// Playback time per spoken question; 0 means playback ends only when driven by a probe
    pub speech_ms: u64,
    /// Pause before each scripted utterance is recognized; 0 means driven by a probe
    pub utterance_gap_ms: u64,
    /// Spoken answers, one list of utterances per question
    pub answers: Vec<Vec<String>>,
    /// Number of chunks the recorder emits and the size of each
    pub video_chunks: usize,
    pub video_chunk_bytes: usize,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            microphone: DeviceOutcome::Granted,
            camera: DeviceOutcome::Granted,
            camera_active: true,
            recognition_supported: true,
            synthesis_supported: true,
            speech_ms: 0,
            utterance_gap_ms: 0,
            answers: Vec::new(),
            video_chunks: 3,
            video_chunk_bytes: 1024,
        }
    }
}

impl DeviceScript {
    /// Load a script from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device script {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse device script {}", path.display()))
    }
}

/// Scripted devices plus the probes that observe them
pub struct ScriptedDevices {
    pub devices: Devices,
    pub media: MediaProbe,
    pub recognizer: RecognizerProbe,
    pub synthesizer: SynthesizerProbe,
}

impl ScriptedDevices {
    pub fn new(script: DeviceScript) -> Self {
        let media = MediaProbe::default();
        let recognizer = RecognizerProbe::default();
        let synthesizer = SynthesizerProbe::default();

        let recognizer_backend: Option<Box<dyn SpeechRecognizer>> = if script.recognition_supported
        {
            Some(Box::new(ScriptedRecognizer::new(
                recognizer.clone(),
                non_zero_millis(script.utterance_gap_ms),
            )))
        } else {
            None
        };

        let synthesizer_backend: Option<Box<dyn SpeechSynthesizer>> = if script.synthesis_supported
        {
            Some(Box::new(ScriptedSynthesizer::new(
                synthesizer.clone(),
                non_zero_millis(script.speech_ms),
            )))
        } else {
            None
        };

        let devices = Devices {
            media: Box::new(ScriptedMediaDevices::new(script, media.clone())),
            recognizer: recognizer_backend,
            synthesizer: synthesizer_backend,
        };

        Self {
            devices,
            media,
            recognizer,
            synthesizer,
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Media devices
// ============================================================================

struct ScriptedTrack {
    kind: TrackKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack for ScriptedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MediaProbeState {
    requests: Vec<DeviceKind>,
    tracks: Vec<Arc<AtomicBool>>,
    recorder_starts: usize,
    recorder_stops: usize,
}

/// Observes scripted media devices: requests made and tracks still live
#[derive(Clone, Default)]
pub struct MediaProbe {
    state: Arc<Mutex<MediaProbeState>>,
}

impl MediaProbe {
    /// Device requests in the order they were made
    pub fn requests(&self) -> Vec<DeviceKind> {
        lock(&self.state).requests.clone()
    }

    /// Tracks handed out that have not been stopped
    pub fn live_tracks(&self) -> usize {
        lock(&self.state)
            .tracks
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }

    pub fn tracks_created(&self) -> usize {
        lock(&self.state).tracks.len()
    }

    pub fn recorder_starts(&self) -> usize {
        lock(&self.state).recorder_starts
    }

    pub fn recorder_stops(&self) -> usize {
        lock(&self.state).recorder_stops
    }

    fn new_track(&self, kind: TrackKind, live: bool) -> Box<dyn MediaTrack> {
        let flag = Arc::new(AtomicBool::new(live));
        lock(&self.state).tracks.push(Arc::clone(&flag));
        Box::new(ScriptedTrack { kind, live: flag })
    }
}

pub struct ScriptedMediaDevices {
    script: DeviceScript,
    probe: MediaProbe,
}

impl ScriptedMediaDevices {
    pub fn new(script: DeviceScript, probe: MediaProbe) -> Self {
        Self { script, probe }
    }
}

#[async_trait::async_trait]
impl MediaDevices for ScriptedMediaDevices {
    async fn request_microphone(
        &mut self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStream, DeviceError> {
        lock(&self.probe.state).requests.push(DeviceKind::Microphone);
        debug!("Scripted microphone request ({:?})", constraints);
        tokio::task::yield_now().await;

        self.script.microphone.into_result(DeviceKind::Microphone)?;
        Ok(MediaStream::new(vec![self.probe.new_track(TrackKind::Audio, true)]))
    }

    async fn request_camera(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<MediaStream, DeviceError> {
        lock(&self.probe.state).requests.push(DeviceKind::Camera);
        debug!(
            "Scripted camera request ({}x{}, facing {})",
            constraints.ideal_width, constraints.ideal_height, constraints.facing_mode
        );
        tokio::task::yield_now().await;

        self.script.camera.into_result(DeviceKind::Camera)?;
        Ok(MediaStream::new(vec![self
            .probe
            .new_track(TrackKind::Video, self.script.camera_active)]))
    }

    fn create_recorder(&mut self) -> Result<Box<dyn MediaRecorder>, DeviceError> {
        Ok(Box::new(ScriptedRecorder {
            chunks: self.script.video_chunks,
            chunk_bytes: self.script.video_chunk_bytes,
            recording: false,
            probe: self.probe.clone(),
        }))
    }

    fn name(&self) -> &str {
        "scripted media devices"
    }
}

struct ScriptedRecorder {
    chunks: usize,
    chunk_bytes: usize,
    recording: bool,
    probe: MediaProbe,
}

#[async_trait::async_trait]
impl MediaRecorder for ScriptedRecorder {
    fn start(&mut self, stream: &MediaStream) -> Result<(), DeviceError> {
        if !stream.has_track(TrackKind::Video) {
            return Err(DeviceError::Other {
                kind: DeviceKind::Camera,
                message: "stream has no video track".to_string(),
            });
        }
        self.recording = true;
        lock(&self.probe.state).recorder_starts += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<Vec<u8>>, DeviceError> {
        if !self.recording {
            return Ok(Vec::new());
        }
        self.recording = false;
        lock(&self.probe.state).recorder_stops += 1;

        // Final chunk flush
        tokio::task::yield_now().await;

        Ok((0..self.chunks)
            .map(|i| vec![(i % 256) as u8; self.chunk_bytes])
            .collect())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

// ============================================================================
// Speech recognition
// ============================================================================

#[derive(Default)]
struct RecognizerProbeState {
    handle: Option<RecognitionHandle>,
    running: bool,
    starts: usize,
    stops: usize,
    langs: Vec<String>,
    feed: VecDeque<String>,
    refusal: Option<RecognitionErrorKind>,
}

/// Observes and drives the scripted recognizer
#[derive(Clone, Default)]
pub struct RecognizerProbe {
    state: Arc<Mutex<RecognizerProbeState>>,
}

impl RecognizerProbe {
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn starts(&self) -> usize {
        lock(&self.state).starts
    }

    pub fn stops(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn last_lang(&self) -> Option<String> {
        lock(&self.state).langs.last().cloned()
    }

    /// Make the next `start` fail with the given error code (`not-allowed`, ...)
    pub fn refuse_next_start(&self, code: &str) {
        lock(&self.state).refusal = Some(RecognitionErrorKind::from_code(code));
    }

    /// Handle of the most recent run
    pub fn handle(&self) -> Option<RecognitionHandle> {
        lock(&self.state).handle.clone()
    }

    /// Queue utterances to be "spoken" during the following runs
    pub fn feed<I, S>(&self, utterances: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .feed
            .extend(utterances.into_iter().map(Into::into));
    }

    pub fn emit_interim(&self, text: &str) {
        if let Some(handle) = self.handle() {
            handle.result(RecognitionBatch::interim(text));
        }
    }

    pub fn emit_final(&self, text: &str) {
        if let Some(handle) = self.handle() {
            handle.result(RecognitionBatch::final_text(text));
        }
    }

    /// Report an error on the current run; anything but `no-speech` ends the run
    pub fn emit_error(&self, kind: RecognitionErrorKind) {
        let handle = {
            let mut state = lock(&self.state);
            if kind != RecognitionErrorKind::NoSpeech {
                state.running = false;
            }
            state.handle.clone()
        };
        if let Some(handle) = handle {
            handle.error(kind);
        }
    }

    /// Simulate the service disconnecting on its own
    pub fn emit_end(&self) {
        let handle = {
            let mut state = lock(&self.state);
            state.running = false;
            state.handle.clone()
        };
        if let Some(handle) = handle {
            handle.ended();
        }
    }

    /// `None` once the run is over, `Some(None)` while nothing is queued
    fn next_utterance(&self, run: u64) -> Option<Option<String>> {
        let mut state = lock(&self.state);
        let current = state.handle.as_ref().map(|h| h.run());
        if !state.running || current != Some(run) {
            return None;
        }
        Some(state.feed.pop_front())
    }
}

pub struct ScriptedRecognizer {
    probe: RecognizerProbe,
    utterance_gap: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedRecognizer {
    pub fn new(probe: RecognizerProbe, utterance_gap: Option<Duration>) -> Self {
        Self {
            probe,
            utterance_gap,
            task: None,
        }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self, lang: &str, handle: RecognitionHandle) -> Result<(), RecognitionErrorKind> {
        {
            let mut state = lock(&self.probe.state);
            if state.running {
                return Err(RecognitionErrorKind::Other("invalid-state".to_string()));
            }
            if let Some(refusal) = state.refusal.take() {
                return Err(refusal);
            }
            state.running = true;
            state.starts += 1;
            state.langs.push(lang.to_string());
            state.handle = Some(handle.clone());
        }

        handle.started();

        if let Some(task) = self.task.take() {
            task.abort();
        }

        if let Some(gap) = self.utterance_gap {
            let probe = self.probe.clone();
            let run = handle.run();
            self.task = Some(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(gap).await;
                    let text = match probe.next_utterance(run) {
                        None => break,
                        Some(None) => continue,
                        Some(Some(text)) => text,
                    };
                    if let Some(first_word) = text.split_whitespace().next() {
                        handle.result(RecognitionBatch::interim(first_word));
                    }
                    handle.result(RecognitionBatch::final_text(text));
                }
            }));
        }

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let handle = {
            let mut state = lock(&self.probe.state);
            if !state.running {
                return;
            }
            state.running = false;
            state.stops += 1;
            state.handle.clone()
        };

        if let Some(handle) = handle {
            handle.ended();
        }
    }

    fn name(&self) -> &str {
        "scripted recognizer"
    }
}

impl Drop for ScriptedRecognizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Speech synthesis
// ============================================================================

#[derive(Default)]
struct SynthesizerProbeState {
    handle: Option<SpeechHandle>,
    speaking: bool,
    spoken: Vec<Utterance>,
    cancels: usize,
}

/// Observes and drives the scripted synthesizer
#[derive(Clone, Default)]
pub struct SynthesizerProbe {
    state: Arc<Mutex<SynthesizerProbeState>>,
}

impl SynthesizerProbe {
    pub fn is_speaking(&self) -> bool {
        lock(&self.state).speaking
    }

    /// Texts of every utterance requested so far
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.state)
            .spoken
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn last_utterance(&self) -> Option<Utterance> {
        lock(&self.state).spoken.last().cloned()
    }

    pub fn cancels(&self) -> usize {
        lock(&self.state).cancels
    }

    /// Finish the current utterance
    pub fn finish(&self) {
        if let Some(handle) = self.take_current() {
            handle.ended();
        }
    }

    /// Fail the current utterance
    pub fn fail(&self, message: &str) {
        if let Some(handle) = self.take_current() {
            handle.error(message);
        }
    }

    fn take_current(&self) -> Option<SpeechHandle> {
        let mut state = lock(&self.state);
        if !state.speaking {
            return None;
        }
        state.speaking = false;
        state.handle.clone()
    }
}

pub struct ScriptedSynthesizer {
    probe: SynthesizerProbe,
    speech_duration: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedSynthesizer {
    pub fn new(probe: SynthesizerProbe, speech_duration: Option<Duration>) -> Self {
        Self {
            probe,
            speech_duration,
            task: None,
        }
    }
}

impl SpeechSynthesizer for ScriptedSynthesizer {
    fn speak(&mut self, utterance: Utterance, handle: SpeechHandle) -> Result<(), String> {
        {
            let mut state = lock(&self.probe.state);
            info!("Speaking: {}", utterance.text);
            state.spoken.push(utterance);
            state.speaking = true;
            state.handle = Some(handle.clone());
        }

        handle.started();

        if let Some(duration) = self.speech_duration {
            let probe = self.probe.clone();
            self.task = Some(tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                probe.finish();
            }));
        }

        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut state = lock(&self.probe.state);
        state.speaking = false;
        state.cancels += 1;
    }

    fn name(&self) -> &str {
        "scripted synthesizer"
    }
}

impl Drop for ScriptedSynthesizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::events::{DeviceEvent, RecognitionEvent};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn denied_camera_still_hands_out_microphone() {
        let script = DeviceScript {
            camera: DeviceOutcome::NotAllowed,
            ..Default::default()
        };
        let mut scripted = ScriptedDevices::new(script);
        let constraints = crate::media::MediaConstraints::default();

        let mic = scripted
            .devices
            .media
            .request_microphone(&constraints.audio)
            .await
            .unwrap();
        assert!(mic.is_active());

        let err = scripted
            .devices
            .media
            .request_camera(&constraints.video)
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::NotAllowed(DeviceKind::Camera));
        assert_eq!(scripted.media.live_tracks(), 1);

        mic.stop_all();
        assert_eq!(scripted.media.live_tracks(), 0);
    }

    #[tokio::test]
    async fn recognizer_rejects_double_start() {
        let probe = RecognizerProbe::default();
        let mut recognizer = ScriptedRecognizer::new(probe.clone(), None);
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer.start("ja-JP", RecognitionHandle::new(1, tx.clone())).unwrap();
        assert!(recognizer
            .start("ja-JP", RecognitionHandle::new(2, tx))
            .is_err());

        recognizer.stop();
        assert!(!probe.is_running());
        assert_eq!(
            rx.recv().await,
            Some(DeviceEvent::Recognition {
                run: 1,
                event: RecognitionEvent::Started
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(DeviceEvent::Recognition {
                run: 1,
                event: RecognitionEvent::Ended
            })
        );
    }

    #[test]
    fn script_defaults_grant_everything() {
        let script: DeviceScript = serde_json::from_str(r#"{"answers": [["hello"]]}"#).unwrap();
        assert_eq!(script.microphone, DeviceOutcome::Granted);
        assert_eq!(script.camera, DeviceOutcome::Granted);
        assert!(script.camera_active);
        assert_eq!(script.answers.len(), 1);
    }
}
