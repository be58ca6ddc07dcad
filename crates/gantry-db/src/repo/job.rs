//! Job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::{
    CommandKind, CommandLog, CommandOutcome, Job, JobId, NewJob, PullRequestRef, Repository,
    normalize_url,
};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;
use tracing::debug;

use crate::{DbError, DbResult};

/// Durable record of jobs and their command logs.
///
/// Jobs are never deleted. Command logs keep insertion order.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job and assign its id.
    async fn create_job(&self, new: NewJob) -> DbResult<Job>;

    /// Persist the job's lifecycle timestamps and cancelled flag.
    ///
    /// Timestamps already stored are kept. `cancelled` can be set but
    /// never cleared.
    async fn save(&self, job: &Job) -> DbResult<()>;

    async fn get_job(&self, id: JobId) -> DbResult<Job>;

    /// Most recently created job for a commit.
    async fn get_job_by_commit(&self, commit: &str) -> DbResult<Job>;

    async fn append_command_log(&self, id: JobId, log: &CommandLog) -> DbResult<()>;

    /// Jobs ordered by creation, newest first.
    async fn list_jobs(&self, offset: i64, limit: i64) -> DbResult<Vec<Job>>;

    /// Jobs for a repository and branch, newest first.
    async fn list_for_branch(&self, repository_url: &str, branch: &str) -> DbResult<Vec<Job>>;

    /// Jobs whose branch or commit contains `query`, newest first.
    async fn search_jobs(&self, query: &str) -> DbResult<Vec<Job>>;

    async fn count_jobs(&self) -> DbResult<i64>;

    /// Mark a job cancelled and return it.
    async fn cancel(&self, id: JobId) -> DbResult<Job>;
}

/// A job row in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRecord {
    id: i64,
    repository: Json<Repository>,
    branch: String,
    commit_sha: String,
    commit_url: String,
    name: String,
    email: String,
    pull_request: Option<Json<PullRequestRef>>,
    cancelled: bool,
    tasks_started: Option<DateTime<Utc>>,
    tasks_finished: Option<DateTime<Utc>>,
    deploy_finished: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl JobRecord {
    fn into_job(self, command_logs: Vec<CommandLog>) -> Job {
        Job {
            id: JobId::new(self.id),
            cancelled: self.cancelled,
            tasks_started: self.tasks_started,
            tasks_finished: self.tasks_finished,
            deploy_finished: self.deploy_finished,
            repository: self.repository.0,
            branch: self.branch,
            commit: self.commit_sha,
            commit_url: self.commit_url,
            name: self.name,
            email: self.email,
            pull_request: self.pull_request.map(|pr| pr.0),
            created_at: self.created_at,
            command_logs,
        }
    }
}

/// A command log row in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CommandLogRecord {
    job_id: i64,
    kind: String,
    command: String,
    outcome: String,
    exit_code: Option<i32>,
    output: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommandLogRecord> for CommandLog {
    type Error = DbError;

    fn try_from(record: CommandLogRecord) -> DbResult<Self> {
        let kind: CommandKind = record.kind.parse().map_err(DbError::Decode)?;
        let outcome: CommandOutcome = record.outcome.parse().map_err(DbError::Decode)?;
        Ok(CommandLog {
            kind,
            command: record.command,
            outcome,
            exit_code: record.exit_code,
            output: record.output,
            started_at: record.started_at,
            finished_at: record.finished_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, repository, branch, commit_sha, commit_url, name, email, \
    pull_request, cancelled, tasks_started, tasks_finished, deploy_finished, created_at";

/// Escape LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// PostgreSQL implementation of JobStore.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach command logs to job rows, preserving row order.
    async fn with_logs(&self, records: Vec<JobRecord>) -> DbResult<Vec<Job>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let logs = sqlx::query_as::<_, CommandLogRecord>(
            r#"
            SELECT job_id, kind, command, outcome, exit_code, output, started_at, finished_at
            FROM command_logs
            WHERE job_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_job: HashMap<i64, Vec<CommandLog>> = HashMap::new();
        for log in logs {
            let job_id = log.job_id;
            by_job.entry(job_id).or_default().push(log.try_into()?);
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let logs = by_job.remove(&record.id).unwrap_or_default();
                record.into_job(logs)
            })
            .collect())
    }

    async fn one_with_logs(&self, record: JobRecord) -> DbResult<Job> {
        let id = record.id;
        self.with_logs(vec![record])
            .await?
            .pop()
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new: NewJob) -> DbResult<Job> {
        let repository_url = normalize_url(&new.repository.url);
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            INSERT INTO jobs (repository, repository_url, branch, commit_sha, commit_url,
                              name, email, pull_request, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(Json(&new.repository))
        .bind(repository_url)
        .bind(&new.branch)
        .bind(&new.commit)
        .bind(&new.commit_url)
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.pull_request.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await?;
        debug!(job_id = record.id, branch = %record.branch, "Inserted job");
        Ok(record.into_job(Vec::new()))
    }

    async fn save(&self, job: &Job) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                cancelled = cancelled OR $2,
                tasks_started = COALESCE(tasks_started, $3),
                tasks_finished = COALESCE(tasks_finished, $4),
                deploy_finished = COALESCE(deploy_finished, $5)
            WHERE id = $1
            "#,
        )
        .bind(job.id.get())
        .bind(job.cancelled)
        .bind(job.tasks_started)
        .bind(job.tasks_finished)
        .bind(job.deploy_finished)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("job {}", job.id)));
        }
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> DbResult<Job> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        self.one_with_logs(record).await
    }

    async fn get_job_by_commit(&self, commit: &str) -> DbResult<Job> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            SELECT {} FROM jobs
            WHERE commit_sha = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            JOB_COLUMNS
        ))
        .bind(commit)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job for commit {}", commit)))?;
        self.one_with_logs(record).await
    }

    async fn append_command_log(&self, id: JobId, log: &CommandLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO command_logs
                (job_id, kind, command, outcome, exit_code, output, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.get())
        .bind(log.kind.to_string())
        .bind(&log.command)
        .bind(log.outcome.as_str())
        .bind(log.exit_code)
        .bind(&log.output)
        .bind(log.started_at)
        .bind(log.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("job {}", id))
            }
            other => DbError::Database(other),
        })?;
        Ok(())
    }

    async fn list_jobs(&self, offset: i64, limit: i64) -> DbResult<Vec<Job>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            SELECT {} FROM jobs
            ORDER BY created_at DESC, id DESC
            OFFSET $1 LIMIT $2
            "#,
            JOB_COLUMNS
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.with_logs(records).await
    }

    async fn list_for_branch(&self, repository_url: &str, branch: &str) -> DbResult<Vec<Job>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            SELECT {} FROM jobs
            WHERE repository_url = $1 AND branch = $2
            ORDER BY created_at DESC, id DESC
            "#,
            JOB_COLUMNS
        ))
        .bind(normalize_url(repository_url))
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;
        self.with_logs(records).await
    }

    async fn search_jobs(&self, query: &str) -> DbResult<Vec<Job>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            r#"
            SELECT {} FROM jobs
            WHERE branch LIKE $1 ESCAPE '\' OR commit_sha LIKE $1 ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            "#,
            JOB_COLUMNS
        ))
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await?;
        self.with_logs(records).await
    }

    async fn count_jobs(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn cancel(&self, id: JobId) -> DbResult<Job> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "UPDATE jobs SET cancelled = TRUE WHERE id = $1 RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        self.one_with_logs(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("main"), "%main%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_log_record_conversion() {
        let record = CommandLogRecord {
            job_id: 1,
            kind: "deploy".to_string(),
            command: "make deploy".to_string(),
            outcome: "failed".to_string(),
            exit_code: Some(2),
            output: "boom".to_string(),
            started_at: Utc::now(),
            finished_at: None,
        };
        let log = CommandLog::try_from(record).unwrap();
        assert_eq!(log.kind, CommandKind::Deploy);
        assert_eq!(log.outcome, CommandOutcome::Failed);
        assert_eq!(log.exit_code, Some(2));
    }

    #[test]
    fn test_log_record_rejects_unknown_outcome() {
        let record = CommandLogRecord {
            job_id: 1,
            kind: "build".to_string(),
            command: "true".to_string(),
            outcome: "maybe".to_string(),
            exit_code: None,
            output: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        };
        assert!(matches!(
            CommandLog::try_from(record).unwrap_err(),
            DbError::Decode(_)
        ));
    }
}
