//! Worker that takes build requests off the queue and runs them as jobs.

use chrono::Utc;
use gantry_core::{BuildRequest, CommandKind, Job, NewJob, RepositoryRegistry};
use gantry_db::{DbResult, JobStore};
use gantry_notify::Dispatcher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cancel::CancellationRegistry;
use crate::pipeline::{StageRunner, StageState};
use crate::queue::QueueReceiver;

/// Everything a worker needs, shared by the whole pool.
pub(crate) struct WorkerContext {
    pub(crate) registry: Arc<dyn RepositoryRegistry>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) stages: StageRunner,
    pub(crate) cancellations: Arc<CancellationRegistry>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) shutdown: CancellationToken,
}

/// A worker owns one job at a time, from creation to notification.
pub struct Worker {
    id: usize,
    receiver: QueueReceiver,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub(crate) fn new(id: usize, receiver: QueueReceiver, ctx: Arc<WorkerContext>) -> Self {
        Self { id, receiver, ctx }
    }

    /// Run the worker loop until shutdown or until the queue closes.
    pub async fn run(self) {
        info!(worker_id = self.id, "Starting worker");

        loop {
            let request = tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => break,
                request = self.receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            if let Err(e) = self.process(request).await {
                error!(worker_id = self.id, error = %e, "Job aborted by store failure");
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Create the job for a request, run it and announce the outcome.
    pub(crate) async fn process(&self, request: BuildRequest) -> DbResult<Option<Job>> {
        let Some(repository) = self.ctx.registry.repository_for_url(&request.repository_url)
        else {
            warn!(
                url = %request.repository_url,
                branch = %request.branch,
                "Repository no longer registered, dropping request"
            );
            return Ok(None);
        };

        let mut job = self
            .ctx
            .store
            .create_job(NewJob::from_request(repository, &request))
            .await?;
        info!(
            worker_id = self.id,
            job_id = %job.id,
            url = %job.repository.url,
            branch = %job.branch,
            commit = %job.commit,
            "Created job"
        );

        let token = self.ctx.cancellations.register(job.id);
        let result = self.execute(&mut job, &token).await;
        self.ctx.cancellations.remove(job.id);
        result?;

        // An operator cancel may land after the last token check.
        if self.ctx.store.get_job(job.id).await?.cancelled {
            job.cancelled = true;
        }

        info!(
            job_id = %job.id,
            status = %job.status(),
            cancelled = job.cancelled,
            "Job finished"
        );
        self.ctx.dispatcher.dispatch(job.clone());
        Ok(Some(job))
    }

    async fn execute(&self, job: &mut Job, token: &CancellationToken) -> DbResult<()> {
        let store = &self.ctx.store;

        job.mark_started(Utc::now());
        store.save(job).await?;

        let build = self
            .ctx
            .stages
            .run_stage(job, CommandKind::Build, token)
            .await?;
        job.mark_tasks_finished(Utc::now());
        if build == StageState::Cancelled || token.is_cancelled() {
            job.cancelled = true;
        }
        store.save(job).await?;

        if job.cancelled || !job.should_deploy() {
            return Ok(());
        }

        info!(job_id = %job.id, "Build passed, deploying");
        let deploy = self
            .ctx
            .stages
            .run_stage(job, CommandKind::Deploy, token)
            .await?;
        job.mark_deploy_finished(Utc::now());
        if deploy == StageState::Cancelled || token.is_cancelled() {
            job.cancelled = true;
        }
        store.save(job).await?;

        Ok(())
    }
}
