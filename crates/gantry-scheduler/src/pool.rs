//! Fixed-size worker pool draining the admission queue.

use gantry_core::{CommandRunner, Job, JobId, RepositoryRegistry};
use gantry_db::{DbResult, JobStore};
use gantry_notify::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admission::Admitter;
use crate::cancel::CancellationRegistry;
use crate::pipeline::StageRunner;
use crate::queue::admission_queue;
use crate::worker::{Worker, WorkerContext};

/// How long shutdown waits for outstanding notifications.
pub const DELIVERY_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub workspace: Option<PathBuf>,
    pub command_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            workspace: None,
            command_timeout: None,
        }
    }
}

/// Operator-side cancellation, usable from request handlers.
#[derive(Clone)]
pub struct JobCanceller {
    store: Arc<dyn JobStore>,
    cancellations: Arc<CancellationRegistry>,
}

impl JobCanceller {
    pub fn new(store: Arc<dyn JobStore>, cancellations: Arc<CancellationRegistry>) -> Self {
        Self {
            store,
            cancellations,
        }
    }

    /// Mark a job cancelled and signal its worker if it is running.
    pub async fn cancel(&self, id: JobId) -> DbResult<Job> {
        let job = self.store.cancel(id).await?;
        let signalled = self.cancellations.cancel(id);
        info!(job_id = %id, running = signalled, "Job cancelled");
        Ok(job)
    }
}

/// Owns the admission queue and the workers draining it.
///
/// Constructed once at startup; handlers get an [`Admitter`] and a
/// [`JobCanceller`] from it.
pub struct WorkerPool {
    admitter: Admitter,
    canceller: JobCanceller,
    cancellations: Arc<CancellationRegistry>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create the queue and spawn `config.workers` workers.
    pub fn start(
        config: PoolConfig,
        registry: Arc<dyn RepositoryRegistry>,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn CommandRunner>,
        dispatcher: Dispatcher,
    ) -> Self {
        let (queue, receiver) = admission_queue(config.queue_capacity);
        let shutdown = CancellationToken::new();
        let cancellations = Arc::new(CancellationRegistry::new(shutdown.clone()));

        let ctx = Arc::new(WorkerContext {
            registry: registry.clone(),
            store: store.clone(),
            stages: StageRunner::new(runner, store.clone())
                .with_workspace(config.workspace.clone())
                .with_timeout(config.command_timeout),
            cancellations: cancellations.clone(),
            dispatcher: dispatcher.clone(),
            shutdown: shutdown.clone(),
        });

        let workers = config.workers.max(1);
        let handles = (0..workers)
            .map(|id| tokio::spawn(Worker::new(id, receiver.clone(), ctx.clone()).run()))
            .collect();

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Self {
            admitter: Admitter::new(registry, queue),
            canceller: JobCanceller::new(store, cancellations.clone()),
            cancellations,
            dispatcher,
            shutdown,
            handles,
        }
    }

    pub fn admitter(&self) -> Admitter {
        self.admitter.clone()
    }

    pub fn canceller(&self) -> JobCanceller {
        self.canceller.clone()
    }

    pub async fn cancel_job(&self, id: JobId) -> DbResult<Job> {
        self.canceller.cancel(id).await
    }

    /// Stop the pool.
    ///
    /// Running jobs are cancelled and finish their current command before
    /// their workers exit. Queued requests are abandoned. Notifications
    /// already dispatched get [`DELIVERY_GRACE`] to finish.
    pub async fn shutdown(self) {
        self.shutdown_within(DELIVERY_GRACE).await
    }

    pub async fn shutdown_within(self, grace: Duration) {
        info!(running = self.cancellations.running(), "Stopping worker pool");
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }
        if !self.dispatcher.drain(grace).await {
            warn!(
                grace_secs = grace.as_secs(),
                "Notifications still in flight at shutdown, abandoning them"
            );
        }
        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{AdmissionDecision, DropReason};
    use crate::pipeline::tests::ScriptedRunner;
    use async_trait::async_trait;
    use chrono::Utc;
    use gantry_config::StaticRegistry;
    use gantry_core::{
        BuildRequest, Command, CommandKind, CommandOutput, CommandSpec, GitProvider, JobStatus,
        Repository,
    };
    use gantry_db::MemoryJobStore;
    use gantry_notify::{Notifier, NotifierFactory, NotifyError, Outcome};
    use std::sync::Mutex;
    use tokio::sync::{Notify, mpsc};

    /// Reports every delivered outcome on a channel after `delay`.
    struct ChannelNotifier {
        tx: mpsc::UnboundedSender<(JobId, Outcome)>,
        delay: Duration,
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        fn name(&self) -> String {
            "channel".to_string()
        }

        async fn notify(&self, job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
            tokio::time::sleep(self.delay).await;
            let _ = self.tx.send((job.id, outcome.clone()));
            Ok(())
        }
    }

    struct ChannelFactory {
        tx: mpsc::UnboundedSender<(JobId, Outcome)>,
        delay: Duration,
    }

    impl NotifierFactory for ChannelFactory {
        fn notifiers_for(&self, _job: &Job) -> Vec<Box<dyn Notifier>> {
            vec![Box::new(ChannelNotifier {
                tx: self.tx.clone(),
                delay: self.delay,
            })]
        }
    }

    /// Blocks the "wait" command until released.
    struct GateRunner {
        started: Notify,
        release: Notify,
        ran: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for GateRunner {
        fn name(&self) -> &'static str {
            "gate"
        }

        async fn run(&self, spec: &CommandSpec) -> gantry_core::Result<CommandOutput> {
            self.ran.lock().unwrap().push(spec.command.clone());
            if spec.command == "wait" {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(CommandOutput {
                exit_code: Some(0),
                success: true,
                output: String::new(),
            })
        }
    }

    fn repository(build: &[&str]) -> Repository {
        let mut repo = Repository::new("widget", "https://github.com/acme/widget");
        for cmd in build {
            repo.commands.push(Command::new(CommandKind::Build, "", *cmd));
        }
        repo
    }

    fn request(commit: &str, should_build: bool) -> BuildRequest {
        BuildRequest {
            provider: GitProvider::Github,
            repository_url: "https://github.com/acme/widget".to_string(),
            branch: "main".to_string(),
            commit: commit.to_string(),
            commit_url: String::new(),
            name: "ada".to_string(),
            email: String::new(),
            timestamp: Utc::now(),
            should_build,
            pull_request: None,
        }
    }

    type Started = (
        WorkerPool,
        Arc<MemoryJobStore>,
        mpsc::UnboundedReceiver<(JobId, Outcome)>,
    );

    fn start(repo: Repository, runner: Arc<dyn CommandRunner>, workers: usize) -> Started {
        start_with_delivery_delay(repo, runner, workers, Duration::ZERO)
    }

    fn start_with_delivery_delay(
        repo: Repository,
        runner: Arc<dyn CommandRunner>,
        workers: usize,
        delay: Duration,
    ) -> Started {
        let store = Arc::new(MemoryJobStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new("http://ci", Arc::new(ChannelFactory { tx, delay }));
        let pool = WorkerPool::start(
            PoolConfig {
                workers,
                queue_capacity: 4,
                ..Default::default()
            },
            Arc::new(StaticRegistry::new(vec![repo])),
            store.clone(),
            runner,
            dispatcher,
        );
        (pool, store, rx)
    }

    #[tokio::test]
    async fn test_same_commit_twice_creates_two_jobs() {
        let runner = Arc::new(ScriptedRunner::default());
        let (pool, store, mut outcomes) = start(repository(&["make test"]), runner, 2);
        let admitter = pool.admitter();

        let (a, b) = tokio::join!(
            admitter.submit(request("abc123", true)),
            admitter.submit(request("abc123", true))
        );
        assert_eq!(a.unwrap(), AdmissionDecision::Admit);
        assert_eq!(b.unwrap(), AdmissionDecision::Admit);

        let (first, _) = outcomes.recv().await.unwrap();
        let (second, _) = outcomes.recv().await.unwrap();
        assert_ne!(first, second);

        for id in [first, second] {
            let job = store.get_job(id).await.unwrap();
            assert_eq!(job.status(), JobStatus::Success);
            assert_eq!(job.command_logs.len(), 1);
        }
        assert_eq!(store.count_jobs().await.unwrap(), 2);
        assert_eq!(store.get_job_by_commit("abc123").await.unwrap().id, first.max(second));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_deleted_branch_creates_no_job() {
        let runner = Arc::new(ScriptedRunner::default());
        let (pool, store, _outcomes) = start(repository(&["make test"]), runner.clone(), 1);

        let decision = pool
            .admitter()
            .submit(request("0000000", false))
            .await
            .unwrap();
        assert_eq!(decision, AdmissionDecision::Drop(DropReason::BranchDeleted));

        pool.shutdown().await;
        assert_eq!(store.count_jobs().await.unwrap(), 0);
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_operator_cancel_stops_running_job() {
        let runner = Arc::new(GateRunner {
            started: Notify::new(),
            release: Notify::new(),
            ran: Mutex::new(Vec::new()),
        });
        let (pool, store, mut outcomes) =
            start(repository(&["wait", "make test"]), runner.clone(), 1);

        pool.admitter()
            .submit(request("abc123", true))
            .await
            .unwrap();
        runner.started.notified().await;

        let job = store.get_job_by_commit("abc123").await.unwrap();
        let cancelled = pool.cancel_job(job.id).await.unwrap();
        assert!(cancelled.cancelled);
        runner.release.notify_one();

        let (id, outcome) = outcomes.recv().await.unwrap();
        assert_eq!(id, job.id);
        assert!(outcome.cancelled);
        assert!(!outcome.passed);

        let stored = store.get_job(job.id).await.unwrap();
        assert!(stored.cancelled);
        assert!(stored.done());
        assert_eq!(stored.command_logs.len(), 1);
        assert_eq!(*runner.ran.lock().unwrap(), vec!["wait".to_string()]);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_command_finish() {
        let runner = Arc::new(GateRunner {
            started: Notify::new(),
            release: Notify::new(),
            ran: Mutex::new(Vec::new()),
        });
        let (pool, store, mut outcomes) = start_with_delivery_delay(
            repository(&["wait", "make test"]),
            runner.clone(),
            1,
            Duration::from_millis(50),
        );

        pool.admitter()
            .submit(request("abc123", true))
            .await
            .unwrap();
        runner.started.notified().await;

        // Signal shutdown before the command is released.
        pool.shutdown.cancel();
        let stopping = tokio::spawn(pool.shutdown());
        runner.release.notify_one();
        stopping.await.unwrap();

        let job = store.get_job_by_commit("abc123").await.unwrap();
        assert!(job.cancelled);
        assert!(job.tasks_finished.is_some());
        assert_eq!(job.command_logs.len(), 1);
        assert!(job.command_logs[0].passed());

        // Delivered before shutdown returned, despite the slow sink.
        let (id, outcome) = outcomes.try_recv().unwrap();
        assert_eq!(id, job.id);
        assert!(outcome.cancelled);
    }
}
