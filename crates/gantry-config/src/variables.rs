//! Variable interpolation for configured commands.
//!
//! Supports variables like:
//! - `${git.sha}` - Full commit SHA
//! - `${git.short_sha}` - Short (7 char) commit SHA
//! - `${git.branch}` - Branch name
//! - `${git.commit_url}` - Link to the commit on the provider
//! - `${git.author}` - Pusher name
//! - `${git.author_email}` - Pusher email
//! - `${repo.url}` - Repository URL
//! - `${repo.name}` - Repository name
//! - `${job.id}` - Job ID
//! - `${env.VAR_NAME}` - Environment variable
//! - `${timestamp}` - Unix timestamp
//!
//! Unknown variables are left untouched.

use gantry_core::Job;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub git: GitContext,
    pub repo: RepoContext,
    pub job: JobContext,
    /// Environment variables
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct GitContext {
    pub sha: String,
    pub short_sha: String,
    pub branch: String,
    pub commit_url: String,
    pub author: String,
    pub author_email: String,
}

#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub id: String,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("variable pattern is valid")
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the commands of `job`.
    pub fn for_job(job: &Job) -> Self {
        VariableContextBuilder::new()
            .with_git_sha(&job.commit)
            .with_git_branch(&job.branch)
            .with_commit_url(&job.commit_url)
            .with_author(&job.name, &job.email)
            .with_repo(&job.repository.url, &job.repository.name)
            .with_job_id(job.id.to_string())
            .build()
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["git", "sha"] => Some(self.git.sha.clone()),
            ["git", "short_sha"] => Some(self.git.short_sha.clone()),
            ["git", "branch"] => Some(self.git.branch.clone()),
            ["git", "commit_url"] => Some(self.git.commit_url.clone()),
            ["git", "author"] => Some(self.git.author.clone()),
            ["git", "author_email"] => Some(self.git.author_email.clone()),

            ["repo", "url"] => Some(self.repo.url.clone()),
            ["repo", "name"] => Some(self.repo.name.clone()),

            ["job", "id"] => Some(self.job.id.clone()),

            ["env", name] => self.env.get(*name).cloned(),

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_git_sha(mut self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        self.ctx.git.short_sha = sha.chars().take(7).collect();
        self.ctx.git.sha = sha;
        self
    }

    pub fn with_git_branch(mut self, branch: impl Into<String>) -> Self {
        self.ctx.git.branch = branch.into();
        self
    }

    pub fn with_commit_url(mut self, url: impl Into<String>) -> Self {
        self.ctx.git.commit_url = url.into();
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.ctx.git.author = name.into();
        self.ctx.git.author_email = email.into();
        self
    }

    pub fn with_repo(mut self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.ctx.repo.url = url.into();
        self.ctx.repo.name = name.into();
        self
    }

    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.job.id = id.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
