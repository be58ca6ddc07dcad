//! Pull request comments.

use async_trait::async_trait;
use gantry_core::Job;
use serde::Serialize;
use tracing::debug;

use crate::error::check_response;
use crate::{Notifier, NotifyError, Outcome};

#[derive(Debug, Serialize)]
struct Comment {
    body: String,
}

/// Comments on the pull request a job was built for.
pub struct PullRequestCommenter {
    client: reqwest::Client,
}

impl PullRequestCommenter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn comment_body(outcome: &Outcome) -> String {
    if outcome.passed {
        "build successful".to_string()
    } else {
        format!("build failed - <a href='{}'>show log</a>", outcome.job_url)
    }
}

#[async_trait]
impl Notifier for PullRequestCommenter {
    fn name(&self) -> String {
        "pull_request".to_string()
    }

    async fn notify(&self, job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
        let Some(pr) = &job.pull_request else {
            return Ok(());
        };
        let access_key = job.repository.access_key.as_deref().ok_or_else(|| {
            NotifyError::MissingCredential(format!(
                "access key for repository '{}'",
                job.repository.name
            ))
        })?;

        debug!(job_id = %job.id, pr = pr.number, "Commenting on pull request");

        let response = self
            .client
            .post(&pr.comments_url)
            .header("Authorization", format!("token {}", access_key))
            .header("User-Agent", "Gantry-CI")
            .header("Accept", "application/vnd.github+json")
            .json(&Comment {
                body: comment_body(outcome),
            })
            .send()
            .await?;
        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::finished_job;
    use gantry_core::PullRequestRef;

    #[test]
    fn test_comment_body() {
        let ok = Outcome::for_job(&finished_job(true), "https://ci.example.com");
        assert_eq!(comment_body(&ok), "build successful");

        let bad = Outcome::for_job(&finished_job(false), "https://ci.example.com");
        assert_eq!(
            comment_body(&bad),
            "build failed - <a href='https://ci.example.com/7'>show log</a>"
        );
    }

    #[tokio::test]
    async fn test_missing_access_key() {
        let mut job = finished_job(true);
        job.pull_request = Some(PullRequestRef {
            number: 3,
            comments_url: "http://127.0.0.1:1/comments".to_string(),
        });
        let outcome = Outcome::for_job(&job, "http://ci");

        let result = PullRequestCommenter::new(reqwest::Client::new())
            .notify(&job, &outcome)
            .await;
        assert!(matches!(result, Err(NotifyError::MissingCredential(_))));
    }

    #[tokio::test]
    async fn test_no_pull_request_is_noop() {
        let job = finished_job(true);
        let outcome = Outcome::for_job(&job, "http://ci");
        let result = PullRequestCommenter::new(reqwest::Client::new())
            .notify(&job, &outcome)
            .await;
        assert!(result.is_ok());
    }
}
