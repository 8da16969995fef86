use serde::{Deserialize, Serialize};

use crate::api::{AvatarType, InterviewRecord, InterviewStatus, QuestionRecord};

/// Which list a question comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Base,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub position: i32,
}

impl From<QuestionRecord> for Question {
    fn from(record: QuestionRecord) -> Self {
        Self {
            id: record.id,
            text: record.question_text,
            position: record.order,
        }
    }
}

/// A question resolved against the combined question order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRef<'a> {
    pub question: &'a Question,
    pub question_type: QuestionType,
    /// Zero-based index in base ++ custom
    pub index: usize,
    pub total: usize,
}

impl QuestionRef<'_> {
    /// "question N of M (base)"
    pub fn label(&self) -> String {
        let kind = match self.question_type {
            QuestionType::Base => "base",
            QuestionType::Custom => "custom",
        };
        format!("question {} of {} ({})", self.index + 1, self.total, kind)
    }
}

/// The interview being taken: fetched once, immutable afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewContext {
    pub interview_id: i64,
    pub slug: String,
    pub candidate_name: String,
    pub candidate_email: Option<String>,
    pub avatar_type: Option<AvatarType>,
    pub status: InterviewStatus,
    base_questions: Vec<Question>,
    custom_questions: Vec<Question>,
}

impl InterviewContext {
    pub fn new(
        interview_id: i64,
        slug: impl Into<String>,
        mut base_questions: Vec<Question>,
        mut custom_questions: Vec<Question>,
    ) -> Self {
        // Stable sort keeps server order for equal positions
        base_questions.sort_by_key(|q| q.position);
        custom_questions.sort_by_key(|q| q.position);

        Self {
            interview_id,
            slug: slug.into(),
            candidate_name: String::new(),
            candidate_email: None,
            avatar_type: None,
            status: InterviewStatus::Pending,
            base_questions,
            custom_questions,
        }
    }

    pub fn from_records(
        slug: &str,
        interview: InterviewRecord,
        base: Vec<QuestionRecord>,
        custom: Vec<QuestionRecord>,
    ) -> Self {
        let mut context = Self::new(
            interview.id,
            slug,
            base.into_iter().map(Question::from).collect(),
            custom.into_iter().map(Question::from).collect(),
        );
        context.candidate_name = interview.candidate_name;
        context.candidate_email = interview.candidate_email;
        context.avatar_type = interview.avatar_type;
        context.status = interview.status;
        context
    }

    pub fn base_questions(&self) -> &[Question] {
        &self.base_questions
    }

    pub fn custom_questions(&self) -> &[Question] {
        &self.custom_questions
    }

    pub fn total_questions(&self) -> usize {
        self.base_questions.len() + self.custom_questions.len()
    }

    /// Resolve a cursor into base ++ custom
    pub fn question_at(&self, index: usize) -> Option<QuestionRef<'_>> {
        let total = self.total_questions();
        let base_len = self.base_questions.len();

        let (question, question_type) = if index < base_len {
            (&self.base_questions[index], QuestionType::Base)
        } else {
            (self.custom_questions.get(index - base_len)?, QuestionType::Custom)
        };

        Some(QuestionRef {
            question,
            question_type,
            index,
            total,
        })
    }
}
