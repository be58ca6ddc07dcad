//! HTTP client for the Gantry API.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use gantry_core::{CommandLog, JobId, JobStatus};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct RepositoryView {
    pub name: String,
    pub url: String,
}

/// A job as served by `/api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub repository: RepositoryView,
    pub branch: String,
    pub commit: String,
    pub commit_url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub tasks_started: Option<DateTime<Utc>>,
    pub tasks_finished: Option<DateTime<Utc>>,
    pub deploy_finished: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub status: JobStatus,
    pub running: bool,
    pub url: String,
    #[serde(default)]
    pub command_logs: Vec<CommandLog>,
}

#[derive(Debug, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobView>,
    pub total: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub async fn list_jobs(&self, offset: i64, limit: i64) -> Result<JobPage> {
        let request = self
            .client
            .get(self.url("/jobs"))
            .query(&[("offset", offset), ("limit", limit)]);
        self.send(request).await
    }

    pub async fn get_job(&self, id: i64) -> Result<JobView> {
        self.send(self.client.get(self.url(&format!("/jobs/{}", id))))
            .await
    }

    pub async fn search_jobs(&self, query: &str) -> Result<Vec<JobView>> {
        let request = self
            .client
            .get(self.url("/jobs/search"))
            .query(&[("q", query)]);
        self.send(request).await
    }

    pub async fn cancel_job(&self, id: i64) -> Result<JobView> {
        self.send(self.client.post(self.url(&format!("/jobs/{}/cancel", id))))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .header("User-Agent", "Gantry-CLI")
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;

        let status = response.status();
        debug!(status = %status, url = %response.url(), "API response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            bail!("API returned {}: {}", status, message);
        }

        response
            .json()
            .await
            .context("failed to decode API response")
    }
}
