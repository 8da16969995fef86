use serde::{Deserialize, Serialize};

use crate::session::AnswerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarType {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Pending,
    InProgress,
    Completed,
}

/// Interview returned by `GET /interviews/by-url/{slug}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRecord {
    pub id: i64,
    #[serde(default)]
    pub job_posting_id: Option<i64>,
    pub candidate_name: String,
    #[serde(default)]
    pub candidate_email: Option<String>,
    pub interview_url: String,
    #[serde(default)]
    pub avatar_type: Option<AvatarType>,
    pub status: InterviewStatus,
}

/// Base or custom question as listed by the interview endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub question_text: String,
    pub order: i32,
}

/// Recorded video attached to the completion request
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl VideoPayload {
    /// Concatenate recorder chunks in order into a single payload
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: &str) -> Self {
        Self {
            bytes: chunks.concat(),
            mime_type: mime_type.to_string(),
            file_name: "interview-recording.webm".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Everything sent to `POST /interviews/{id}/complete`
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub interview_id: i64,
    pub video: VideoPayload,
    pub answers: Vec<AnswerRecord>,
}

impl Submission {
    /// JSON encoding of the answers field
    pub fn answers_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interview_record_tolerates_missing_optionals() {
        let json = r#"{
            "id": 7,
            "candidate_name": "Sato",
            "interview_url": "abc123",
            "status": "in_progress"
        }"#;

        let record: InterviewRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.status, InterviewStatus::InProgress);
        assert!(record.avatar_type.is_none());
    }

    #[test]
    fn chunks_concatenate_in_order() {
        let video = VideoPayload::from_chunks(vec![vec![1, 2], vec![], vec![3]], "video/webm");
        assert_eq!(video.bytes, vec![1, 2, 3]);
        assert_eq!(video.file_name, "interview-recording.webm");
    }
}
