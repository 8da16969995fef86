pub mod backend;
pub mod events;
pub mod scripted;

pub use backend::{
    AudioConstraints, Devices, MediaConstraints, MediaDevices, MediaRecorder, MediaStream,
    MediaTrack, SpeechRecognizer, SpeechSynthesizer, TrackKind, Utterance, VideoConstraints,
};
pub use events::{
    DeviceEvent, EventReceiver, EventSender, Hypothesis, RecognitionBatch, RecognitionEvent,
    RecognitionHandle, SpeechHandle, SynthesisEvent,
};
pub use scripted::{
    DeviceOutcome, DeviceScript, MediaProbe, RecognizerProbe, ScriptedDevices, SynthesizerProbe,
};
