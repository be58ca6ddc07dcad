//! Notifier trait and the outcome passed to sinks.

use async_trait::async_trait;
use gantry_core::{Job, JobStatus};

use crate::NotifyError;

/// Final result of a job as announced to sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Job succeeded and was not cancelled.
    pub passed: bool,
    pub cancelled: bool,
    /// Human-readable one-line summary.
    pub message: String,
    pub job_url: String,
}

impl Outcome {
    pub fn for_job(job: &Job, server_url: &str) -> Self {
        let cancelled = job.cancelled;
        let passed = job.status() == JobStatus::Success && !cancelled;
        let job_url = job.url(server_url);

        let verdict = if cancelled {
            "cancelled"
        } else if passed {
            "passed"
        } else {
            "failed"
        };

        let message = format!(
            "{} {} ({}) by {}: {} - {}",
            job.repository.name,
            job.branch,
            job.short_commit(),
            job.name,
            verdict,
            job_url
        );

        Self {
            passed,
            cancelled,
            message,
            job_url,
        }
    }
}

/// A destination for job outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Label used in reports and logs, e.g. `chat:builds`.
    fn name(&self) -> String;

    /// Deliver the outcome of `job`.
    async fn notify(&self, job: &Job, outcome: &Outcome) -> Result<(), NotifyError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use gantry_core::{CommandKind, CommandLog, CommandOutcome, JobId, NewJob, Repository};

    pub(crate) fn finished_job(passed: bool) -> Job {
        let new = NewJob {
            repository: Repository::new("widget", "https://github.com/acme/widget"),
            branch: "main".to_string(),
            commit: "abc1234567890".to_string(),
            commit_url: "https://github.com/acme/widget/commit/abc1234567890".to_string(),
            name: "ada".to_string(),
            email: "ada@example.com".to_string(),
            pull_request: None,
        };
        let mut job = Job::create(JobId::new(7), new, Utc::now());
        job.mark_started(Utc::now());
        job.command_logs.push(CommandLog {
            kind: CommandKind::Build,
            command: "make test".to_string(),
            outcome: if passed {
                CommandOutcome::Passed
            } else {
                CommandOutcome::Failed
            },
            exit_code: Some(if passed { 0 } else { 1 }),
            output: String::new(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
        });
        job.mark_tasks_finished(Utc::now());
        job
    }

    #[test]
    fn test_passed_outcome() {
        let outcome = Outcome::for_job(&finished_job(true), "https://ci.example.com");
        assert!(outcome.passed);
        assert_eq!(outcome.job_url, "https://ci.example.com/7");
        assert_eq!(
            outcome.message,
            "widget main (abc1234) by ada: passed - https://ci.example.com/7"
        );
    }

    #[test]
    fn test_failed_outcome() {
        let outcome = Outcome::for_job(&finished_job(false), "https://ci.example.com");
        assert!(!outcome.passed);
        assert!(outcome.message.contains(": failed - "));
    }

    #[test]
    fn test_cancelled_never_passes() {
        let mut job = finished_job(true);
        job.cancelled = true;
        let outcome = Outcome::for_job(&job, "https://ci.example.com");
        assert!(!outcome.passed);
        assert!(outcome.cancelled);
        assert!(outcome.message.contains(": cancelled - "));
    }
}
