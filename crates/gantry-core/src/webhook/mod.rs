//! Webhook normalization.
//!
//! Provider payloads are turned into a provider-agnostic [`BuildRequest`].
//! Normalizers have no side effects; admission is decided elsewhere.

pub mod github;
pub mod gitlab;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Git provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProvider::Github => write!(f, "github"),
            GitProvider::Gitlab => write!(f, "gitlab"),
        }
    }
}

impl std::str::FromStr for GitProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(GitProvider::Github),
            "gitlab" => Ok(GitProvider::Gitlab),
            _ => Err(format!("Unknown git provider: {}", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Pull request a build request originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    /// API endpoint for posting issue comments on the pull request.
    pub comments_url: String,
}

/// A provider-agnostic build trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub provider: GitProvider,
    pub repository_url: String,
    pub branch: String,
    pub commit: String,
    pub commit_url: String,
    /// Pusher name; empty when the payload omits it.
    pub name: String,
    /// Pusher email; empty when the payload omits it.
    pub email: String,
    pub timestamp: DateTime<Utc>,
    /// False for branch deletions and pull request actions that need no build.
    pub should_build: bool,
    pub pull_request: Option<PullRequestRef>,
}

/// Normalize a webhook delivery.
///
/// Returns `Ok(None)` for event types that never trigger a build
/// (pings, issue events, ...).
pub fn normalize(
    provider: GitProvider,
    event: &str,
    body: &[u8],
) -> Result<Option<BuildRequest>, WebhookError> {
    match (provider, event) {
        (GitProvider::Github, "push") => github::parse_push(body).map(Some),
        (GitProvider::Github, "pull_request") => github::parse_pull_request(body).map(Some),
        (GitProvider::Gitlab, "Push Hook") => gitlab::parse_push(body).map(Some),
        _ => Ok(None),
    }
}

/// Branch name for a git ref.
///
/// `refs/heads/` is stripped so branch names containing slashes survive;
/// other refs fall back to their final path segment.
pub fn branch_from_ref(git_ref: &str) -> String {
    if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
        return branch.to_string();
    }
    git_ref.rsplit('/').next().unwrap_or_default().to_string()
}

/// Whether a SHA is the all-zero placeholder providers send for deletions.
pub fn is_null_sha(sha: &str) -> bool {
    !sha.is_empty() && sha.chars().all(|c| c == '0')
}

/// Best-effort string lookup along a path of object keys.
fn string_at(value: &serde_json::Value, path: &[&str]) -> String {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn malformed(err: serde_json::Error) -> WebhookError {
    WebhookError::MalformedPayload(err.to_string())
}
