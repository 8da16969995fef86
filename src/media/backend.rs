use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{RecognitionHandle, SpeechHandle};
use crate::error::{DeviceError, RecognitionErrorKind};

/// Kind of a single media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Microphone processing constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

/// Camera constraints (ideal values, the device may pick something close)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// "user" for the front camera
    pub facing_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
    pub video: VideoConstraints,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: AudioConstraints {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            video: VideoConstraints {
                ideal_width: 1280,
                ideal_height: 720,
                facing_mode: "user".to_string(),
            },
        }
    }
}

/// A single audio or video track of a media stream
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Whether the track is still delivering media
    fn is_live(&self) -> bool;

    /// Stop the track and release the underlying device. Stopping twice is a no-op.
    fn stop(&self);
}

/// A set of media tracks acquired from the devices
pub struct MediaStream {
    id: String,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Merge the tracks of two streams into one new stream
    pub fn combine(first: MediaStream, second: MediaStream) -> Self {
        let mut tracks = first.tracks;
        tracks.extend(second.tracks);
        Self::new(tracks)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A stream is active while at least one of its tracks is live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    pub fn has_live_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind && t.is_live())
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Stop every track, returning how many were still live
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in &self.tracks {
            if track.is_live() {
                stopped += 1;
            }
            track.stop();
            debug!("Stopped {:?} track of stream {}", track.kind(), self.id);
        }
        stopped
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("live", &self.live_track_count())
            .finish()
    }
}

/// Camera and microphone access
///
/// Implementations:
/// - Browser: `navigator.mediaDevices.getUserMedia` (one request per device class)
/// - Scripted: preconfigured outcomes (for the CLI and for testing)
#[async_trait::async_trait]
pub trait MediaDevices: Send {
    /// Request an audio-only stream
    async fn request_microphone(
        &mut self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStream, DeviceError>;

    /// Request a video-only stream
    async fn request_camera(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<MediaStream, DeviceError>;

    /// Create a recorder for a stream acquired from these devices
    fn create_recorder(&mut self) -> Result<Box<dyn MediaRecorder>, DeviceError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Records a media stream into an ordered sequence of encoded chunks
#[async_trait::async_trait]
pub trait MediaRecorder: Send {
    /// Start recording the given stream
    fn start(&mut self, stream: &MediaStream) -> Result<(), DeviceError>;

    /// Stop recording, wait for the final chunk to flush and return all chunks in order
    async fn stop(&mut self) -> Result<Vec<Vec<u8>>, DeviceError>;

    fn is_recording(&self) -> bool;

    /// Container mime type of the produced chunks
    fn mime_type(&self) -> &str {
        "video/webm"
    }
}

/// Continuous speech-to-text
///
/// `start` returns immediately; progress is reported through the handle
/// (`started`, `result`, `error`, `ended`).
pub trait SpeechRecognizer: Send {
    /// Start a continuous recognition run with interim results enabled
    fn start(&mut self, lang: &str, handle: RecognitionHandle) -> Result<(), RecognitionErrorKind>;

    /// Stop the current run. The run reports `ended` afterwards.
    fn stop(&mut self);

    fn name(&self) -> &str;
}

/// Voice settings for reading a question aloud
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Text-to-speech playback
pub trait SpeechSynthesizer: Send {
    /// Queue an utterance; completion is reported through the handle
    fn speak(&mut self, utterance: Utterance, handle: SpeechHandle) -> Result<(), String>;

    /// Cancel every queued or playing utterance
    fn cancel(&mut self);

    fn name(&self) -> &str;
}

/// Every device capability the session controller needs
///
/// Missing speech capabilities are `None` (browser without the API).
pub struct Devices {
    pub media: Box<dyn MediaDevices>,
    pub recognizer: Option<Box<dyn SpeechRecognizer>>,
    pub synthesizer: Option<Box<dyn SpeechSynthesizer>>,
}
