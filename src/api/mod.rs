pub mod client;
pub mod messages;

pub use client::{ApiClient, InterviewBackend};
pub use messages::{
    AvatarType, InterviewRecord, InterviewStatus, QuestionRecord, Submission, VideoPayload,
};
