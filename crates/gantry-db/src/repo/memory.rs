//! In-memory job store.

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::{CommandLog, Job, JobId, NewJob, normalize_url};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{DbError, DbResult, JobStore};

/// Job store kept in process memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<JobId, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; ties on creation time go to the higher id.
fn newest_first<'a>(jobs: impl Iterator<Item = &'a Job>) -> Vec<Job> {
    let mut jobs: Vec<Job> = jobs.cloned().collect();
    jobs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    jobs
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, new: NewJob) -> DbResult<Job> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let job = Job::create(JobId::new(inner.next_id), new, Utc::now());
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn save(&self, job: &Job) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", job.id)))?;

        stored.cancelled |= job.cancelled;
        stored.tasks_started = stored.tasks_started.or(job.tasks_started);
        stored.tasks_finished = stored.tasks_finished.or(job.tasks_finished);
        stored.deploy_finished = stored.deploy_finished.or(job.deploy_finished);
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> DbResult<Job> {
        self.inner
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }

    async fn get_job_by_commit(&self, commit: &str) -> DbResult<Job> {
        let inner = self.inner.read().await;
        newest_first(inner.jobs.values().filter(|j| j.commit == commit))
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("job for commit {}", commit)))
    }

    async fn append_command_log(&self, id: JobId, log: &CommandLog) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        job.command_logs.push(log.clone());
        Ok(())
    }

    async fn list_jobs(&self, offset: i64, limit: i64) -> DbResult<Vec<Job>> {
        let inner = self.inner.read().await;
        Ok(newest_first(inner.jobs.values())
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_for_branch(&self, repository_url: &str, branch: &str) -> DbResult<Vec<Job>> {
        let url = normalize_url(repository_url);
        let inner = self.inner.read().await;
        Ok(newest_first(inner.jobs.values().filter(|j| {
            j.branch == branch && normalize_url(&j.repository.url) == url
        })))
    }

    async fn search_jobs(&self, query: &str) -> DbResult<Vec<Job>> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner
                .jobs
                .values()
                .filter(|j| j.branch.contains(query) || j.commit.contains(query)),
        ))
    }

    async fn count_jobs(&self) -> DbResult<i64> {
        Ok(self.inner.read().await.jobs.len() as i64)
    }

    async fn cancel(&self, id: JobId) -> DbResult<Job> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        job.cancelled = true;
        Ok(job.clone())
    }
}
