//! GitLab webhook payloads.

use chrono::Utc;
use serde::Deserialize;

use super::{BuildRequest, GitProvider, WebhookError, branch_from_ref, is_null_sha, malformed};

#[derive(Debug, Deserialize)]
struct PushHook {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: String,
    checkout_sha: Option<String>,
    user_name: Option<String>,
    user_email: Option<String>,
    project: Project,
    #[serde(default)]
    commits: Vec<Commit>,
}

#[derive(Debug, Deserialize)]
struct Project {
    web_url: Option<String>,
    git_http_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Commit {
    id: String,
    #[serde(default)]
    url: String,
}

/// Parse a GitLab `Push Hook` event.
pub fn parse_push(body: &[u8]) -> Result<BuildRequest, WebhookError> {
    let hook: PushHook = serde_json::from_slice(body).map_err(malformed)?;

    if hook.git_ref.is_empty() {
        return Err(WebhookError::MalformedPayload("missing ref".to_string()));
    }

    let repository_url = hook
        .project
        .web_url
        .or(hook.project.git_http_url)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| WebhookError::MalformedPayload("missing project url".to_string()))?;

    let should_build = !is_null_sha(&hook.after);
    let commit = hook
        .checkout_sha
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| hook.after.clone());

    if should_build && commit.is_empty() {
        return Err(WebhookError::MalformedPayload(
            "missing head commit".to_string(),
        ));
    }

    let commit_url = hook
        .commits
        .iter()
        .find(|c| c.id == commit)
        .or_else(|| hook.commits.last())
        .map(|c| c.url.clone())
        .unwrap_or_default();

    Ok(BuildRequest {
        provider: GitProvider::Gitlab,
        repository_url,
        branch: branch_from_ref(&hook.git_ref),
        commit,
        commit_url,
        name: hook.user_name.unwrap_or_default(),
        email: hook.user_email.unwrap_or_default(),
        timestamp: Utc::now(),
        should_build,
        pull_request: None,
    })
}
