//! GitHub webhook payloads.

use chrono::Utc;
use serde::Deserialize;

use super::{
    BuildRequest, GitProvider, PullRequestRef, WebhookError, branch_from_ref, is_null_sha,
    malformed, string_at,
};

/// Pull request actions that produce a new head commit worth building.
const BUILD_ACTIONS: &[&str] = &["opened", "reopened", "synchronize"];

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: String,
    #[serde(default)]
    deleted: bool,
    compare: Option<String>,
    head_commit: Option<HeadCommit>,
    repository: RepositoryInfo,
    /// Kept untyped: identity fields are optional and may be null.
    #[serde(default)]
    pusher: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    html_url: Option<String>,
    url: Option<String>,
}

impl RepositoryInfo {
    fn web_url(&self) -> Result<String, WebhookError> {
        self.html_url
            .clone()
            .or_else(|| self.url.clone())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| WebhookError::MalformedPayload("missing repository url".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequest,
    repository: RepositoryInfo,
    #[serde(default)]
    sender: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    html_url: Option<String>,
    comments_url: String,
    head: PullRequestHead,
    #[serde(default)]
    user: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

/// Parse a GitHub `push` event.
pub fn parse_push(body: &[u8]) -> Result<BuildRequest, WebhookError> {
    let payload: PushPayload = serde_json::from_slice(body).map_err(malformed)?;

    if payload.git_ref.is_empty() {
        return Err(WebhookError::MalformedPayload("missing ref".to_string()));
    }

    let repository_url = payload.repository.web_url()?;
    let should_build = !payload.deleted && !is_null_sha(&payload.after);

    let (commit, commit_url) = match payload.head_commit {
        Some(head) => {
            let url = head.url.or(payload.compare).unwrap_or_default();
            (head.id, url)
        }
        None => (payload.after.clone(), payload.compare.unwrap_or_default()),
    };

    if should_build && commit.is_empty() {
        return Err(WebhookError::MalformedPayload(
            "missing head commit".to_string(),
        ));
    }

    Ok(BuildRequest {
        provider: GitProvider::Github,
        repository_url,
        branch: branch_from_ref(&payload.git_ref),
        commit,
        commit_url,
        name: string_at(&payload.pusher, &["name"]),
        email: string_at(&payload.pusher, &["email"]),
        timestamp: Utc::now(),
        should_build,
        pull_request: None,
    })
}

/// Parse a GitHub `pull_request` event.
///
/// The request targets the base repository, builds the PR head commit and
/// remembers where to comment once the job finishes.
pub fn parse_pull_request(body: &[u8]) -> Result<BuildRequest, WebhookError> {
    let payload: PullRequestPayload = serde_json::from_slice(body).map_err(malformed)?;

    let repository_url = payload.repository.web_url()?;
    let pr = payload.pull_request;

    let commit_url = pr
        .html_url
        .as_deref()
        .map(|url| format!("{}/commits/{}", url, pr.head.sha))
        .unwrap_or_default();

    let mut name = string_at(&payload.sender, &["login"]);
    if name.is_empty() {
        name = string_at(&pr.user, &["login"]);
    }

    Ok(BuildRequest {
        provider: GitProvider::Github,
        repository_url,
        branch: pr.head.git_ref,
        commit: pr.head.sha,
        commit_url,
        name,
        email: String::new(),
        timestamp: Utc::now(),
        should_build: BUILD_ACTIONS.contains(&payload.action.as_str()),
        pull_request: Some(PullRequestRef {
            number: payload.number,
            comments_url: pr.comments_url,
        }),
    })
}
