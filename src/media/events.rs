use tokio::sync::mpsc;
use tracing::debug;

use crate::error::RecognitionErrorKind;

/// One recognition hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub text: String,
    /// Final hypotheses are never revised; interim ones are replaced by the next batch
    pub is_final: bool,
}

/// Results delivered by one recognizer callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionBatch {
    pub hypotheses: Vec<Hypothesis>,
}

impl RecognitionBatch {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            hypotheses: vec![Hypothesis {
                text: text.into(),
                is_final: false,
            }],
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            hypotheses: vec![Hypothesis {
                text: text.into(),
                is_final: true,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Started,
    Result(RecognitionBatch),
    Error(RecognitionErrorKind),
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Error(String),
}

/// Asynchronous completion reported back to the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Recognition { run: u64, event: RecognitionEvent },
    Synthesis { utterance: u64, event: SynthesisEvent },
    /// A delayed recognition restart is due
    RestartDue { generation: u64 },
}

pub type EventSender = mpsc::UnboundedSender<DeviceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

/// Callback handle given to a recognizer for one run
#[derive(Debug, Clone)]
pub struct RecognitionHandle {
    run: u64,
    tx: EventSender,
}

impl RecognitionHandle {
    pub fn new(run: u64, tx: EventSender) -> Self {
        Self { run, tx }
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn started(&self) {
        self.emit(RecognitionEvent::Started);
    }

    pub fn result(&self, batch: RecognitionBatch) {
        self.emit(RecognitionEvent::Result(batch));
    }

    pub fn error(&self, kind: RecognitionErrorKind) {
        self.emit(RecognitionEvent::Error(kind));
    }

    pub fn ended(&self) {
        self.emit(RecognitionEvent::Ended);
    }

    fn emit(&self, event: RecognitionEvent) {
        if self
            .tx
            .send(DeviceEvent::Recognition {
                run: self.run,
                event,
            })
            .is_err()
        {
            debug!("Recognition run {} outlived its session", self.run);
        }
    }
}

/// Callback handle given to a synthesizer for one utterance
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    utterance: u64,
    tx: EventSender,
}

impl SpeechHandle {
    pub fn new(utterance: u64, tx: EventSender) -> Self {
        Self { utterance, tx }
    }

    pub fn utterance(&self) -> u64 {
        self.utterance
    }

    pub fn started(&self) {
        self.emit(SynthesisEvent::Started);
    }

    pub fn ended(&self) {
        self.emit(SynthesisEvent::Ended);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(SynthesisEvent::Error(message.into()));
    }

    fn emit(&self, event: SynthesisEvent) {
        if self
            .tx
            .send(DeviceEvent::Synthesis {
                utterance: self.utterance,
                event,
            })
            .is_err()
        {
            debug!("Utterance {} outlived its session", self.utterance);
        }
    }
}
