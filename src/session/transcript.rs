use serde::Serialize;

use crate::media::RecognitionBatch;

/// Text recognized for the current question
///
/// Final utterances are append-only; the interim slot holds the latest
/// unfinalized hypothesis and is replaced, never appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptBuffer {
    finals: Vec<String>,
    interim: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch of recognizer results
    pub fn apply(&mut self, batch: &RecognitionBatch) {
        let mut interim = String::new();
        let mut saw_final = false;

        for hypothesis in &batch.hypotheses {
            if hypothesis.is_final {
                self.push_final(&hypothesis.text);
                saw_final = true;
            } else {
                interim.push_str(&hypothesis.text);
            }
        }

        if saw_final || !interim.is_empty() {
            self.interim = interim;
        }
    }

    pub fn push_final(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.finals.push(text.to_string());
        }
        self.interim.clear();
    }

    pub fn set_interim(&mut self, text: &str) {
        self.interim = text.to_string();
    }

    /// Finalized utterances joined by newlines
    pub fn finalized(&self) -> String {
        self.finals.join("\n")
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.interim.is_empty()
    }

    pub fn clear(&mut self) {
        self.finals.clear();
        self.interim.clear();
    }
}
