//! Jobs and their derived lifecycle.
//!
//! A job's status is never stored. It is derived from the lifecycle
//! timestamps and the append-only command logs every time it is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;
use crate::repository::{Command, CommandKind, Repository};
use crate::webhook::{BuildRequest, PullRequestRef};

/// Derived status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit outcome of a logged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    NotRun,
    Passed,
    Failed,
}

impl CommandOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOutcome::NotRun => "not_run",
            CommandOutcome::Passed => "passed",
            CommandOutcome::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CommandOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_run" => Ok(CommandOutcome::NotRun),
            "passed" => Ok(CommandOutcome::Passed),
            "failed" => Ok(CommandOutcome::Failed),
            _ => Err(format!("Unknown command outcome: {}", s)),
        }
    }
}

/// Record of one executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLog {
    pub kind: CommandKind,
    pub command: String,
    pub outcome: CommandOutcome,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CommandLog {
    pub fn passed(&self) -> bool {
        self.outcome == CommandOutcome::Passed
    }
}

/// Everything needed to create a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub repository: Repository,
    pub branch: String,
    pub commit: String,
    pub commit_url: String,
    pub name: String,
    pub email: String,
    pub pull_request: Option<PullRequestRef>,
}

impl NewJob {
    /// Seed a job from an admitted request and a snapshot of its repository.
    pub fn from_request(repository: Repository, request: &BuildRequest) -> Self {
        Self {
            repository,
            branch: request.branch.clone(),
            commit: request.commit.clone(),
            commit_url: request.commit_url.clone(),
            name: request.name.clone(),
            email: request.email.clone(),
            pull_request: request.pull_request.clone(),
        }
    }
}

/// One execution of a repository's pipeline for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub cancelled: bool,
    pub tasks_started: Option<DateTime<Utc>>,
    pub tasks_finished: Option<DateTime<Utc>>,
    pub deploy_finished: Option<DateTime<Utc>>,
    /// Snapshot taken at creation; later repository edits do not apply.
    pub repository: Repository,
    pub branch: String,
    pub commit: String,
    pub commit_url: String,
    pub name: String,
    pub email: String,
    pub pull_request: Option<PullRequestRef>,
    pub created_at: DateTime<Utc>,
    /// Append-only, in execution order.
    pub command_logs: Vec<CommandLog>,
}

impl Job {
    /// Build a pending job. Stores call this when assigning an id.
    pub fn create(id: JobId, new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            cancelled: false,
            tasks_started: None,
            tasks_finished: None,
            deploy_finished: None,
            repository: new.repository,
            branch: new.branch,
            commit: new.commit,
            commit_url: new.commit_url,
            name: new.name,
            email: new.email,
            pull_request: new.pull_request,
            created_at,
            command_logs: Vec::new(),
        }
    }

    /// True if every command logged so far passed. Vacuously true.
    pub fn passed(&self) -> bool {
        self.command_logs.iter().all(CommandLog::passed)
    }

    pub fn status(&self) -> JobStatus {
        if self.tasks_finished.is_none() {
            JobStatus::Pending
        } else if self.passed() {
            JobStatus::Success
        } else {
            JobStatus::Error
        }
    }

    pub fn build_commands(&self) -> Vec<&Command> {
        self.repository.get_commands(&self.branch, CommandKind::Build)
    }

    pub fn deploy_commands(&self) -> Vec<&Command> {
        self.repository.get_commands(&self.branch, CommandKind::Deploy)
    }

    /// Whether the branch has any build commands.
    pub fn should_build(&self) -> bool {
        !self.build_commands().is_empty()
    }

    /// Deploy commands exist for the branch and nothing has failed.
    pub fn should_deploy(&self) -> bool {
        !self.deploy_commands().is_empty() && self.passed()
    }

    /// Whether the pipeline has finished.
    ///
    /// A cancelled job is done once its build stage has been closed, even
    /// if the deploy stage was never entered.
    pub fn done(&self) -> bool {
        if self.tasks_finished.is_none() {
            return false;
        }
        self.cancelled || !self.should_deploy() || self.deploy_finished.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.tasks_started.is_some() && !self.done()
    }

    /// Link to this job on the configured server.
    pub fn url(&self, server_url: &str) -> String {
        format!("{}/{}", server_url.trim_end_matches('/'), self.id)
    }

    pub fn short_commit(&self) -> &str {
        match self.commit.char_indices().nth(7) {
            Some((idx, _)) => &self.commit[..idx],
            None => &self.commit,
        }
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        if self.tasks_started.is_none() {
            self.tasks_started = Some(at);
        }
    }

    /// Close the build stage. Only the first call has an effect.
    pub fn mark_tasks_finished(&mut self, at: DateTime<Utc>) {
        if self.tasks_finished.is_none() {
            self.tasks_finished = Some(at);
        }
    }

    pub fn mark_deploy_finished(&mut self, at: DateTime<Utc>) {
        if self.deploy_finished.is_none() {
            self.deploy_finished = Some(at);
        }
    }
}
