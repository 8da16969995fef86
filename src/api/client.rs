use anyhow::Context;
use reqwest::{multipart, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::messages::{InterviewRecord, QuestionRecord, Submission};
use crate::error::{FetchError, SubmissionError};
use crate::session::InterviewContext;

/// Interview backend as seen by the session controller
#[async_trait::async_trait]
pub trait InterviewBackend: Send + Sync {
    /// Load the interview and both question lists for a url slug
    async fn fetch_context(&self, slug: &str) -> Result<InterviewContext, FetchError>;

    /// Submit the recording and answers of a finished interview
    async fn complete_interview(&self, submission: &Submission) -> Result<(), SubmissionError>;
}

/// HTTP client for the interview backend
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base url: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base url cannot have paths appended: {}", base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for ApiClient")?;

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET /interviews/by-url/{slug}
    pub async fn interview_by_url(&self, slug: &str) -> Result<InterviewRecord, FetchError> {
        self.get_json(self.endpoint(&["interviews", "by-url", slug]))
            .await
    }

    /// GET /interviews/{id}/base-questions
    pub async fn base_questions(&self, interview_id: i64) -> Result<Vec<QuestionRecord>, FetchError> {
        let id = interview_id.to_string();
        self.get_json(self.endpoint(&["interviews", &id, "base-questions"]))
            .await
    }

    /// GET /interviews/{id}/custom-questions
    pub async fn custom_questions(
        &self,
        interview_id: i64,
    ) -> Result<Vec<QuestionRecord>, FetchError> {
        let id = interview_id.to_string();
        self.get_json(self.endpoint(&["interviews", &id, "custom-questions"]))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("{} returned 404", url);
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", url, status, message);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl InterviewBackend for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_context(&self, slug: &str) -> Result<InterviewContext, FetchError> {
        let interview = self.interview_by_url(slug).await?;
        info!(
            "Loaded interview {} for {} ({:?})",
            interview.id, interview.candidate_name, interview.status
        );

        let (base, custom) = futures::try_join!(
            self.base_questions(interview.id),
            self.custom_questions(interview.id)
        )?;

        info!(
            "Loaded {} base and {} custom questions",
            base.len(),
            custom.len()
        );

        Ok(InterviewContext::from_records(slug, interview, base, custom))
    }

    #[instrument(skip(self, submission), fields(interview_id = submission.interview_id, answers = submission.answers.len()))]
    async fn complete_interview(&self, submission: &Submission) -> Result<(), SubmissionError> {
        let answers = submission
            .answers_json()
            .map_err(|e| SubmissionError::Encoding(e.to_string()))?;

        let video = multipart::Part::bytes(submission.video.bytes.clone())
            .file_name(submission.video.file_name.clone())
            .mime_str(&submission.video.mime_type)
            .map_err(|e| SubmissionError::Encoding(e.to_string()))?;

        let form = multipart::Form::new()
            .part("video", video)
            .text("answers", answers);

        let id = submission.interview_id.to_string();
        let url = self.endpoint(&["interviews", &id, "complete"]);

        info!(
            "Submitting interview {} ({} bytes of video)",
            submission.interview_id,
            submission.video.bytes.len()
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            warn!("Completion rejected with {}: {}", status, message);
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        info!("Interview {} submitted", submission.interview_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_append_to_base_path() {
        let client = ApiClient::new("http://localhost:8000/api/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["interviews", "by-url", "abc"]).as_str(),
            "http://localhost:8000/api/v1/interviews/by-url/abc"
        );
    }

    #[test]
    fn slugs_are_percent_encoded() {
        let client = ApiClient::new("http://localhost:8000", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(&["interviews", "by-url", "a/b c"]).as_str(),
            "http://localhost:8000/interviews/by-url/a%2Fb%20c"
        );
    }

    #[test]
    fn rejects_invalid_base() {
        assert!(ApiClient::new("not a url", Duration::from_secs(5)).is_err());
    }
}
