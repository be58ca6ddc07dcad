//! Admission decisions and counters.

use gantry_core::{BuildRequest, CommandKind, RepositoryRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::queue::{AdmissionQueue, QueueClosed};

/// Why a request was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No configured repository matches the request URL.
    UnregisteredRepository,
    /// The event deleted the branch or is otherwise not buildable.
    BranchDeleted,
    /// The repository has no build commands for the branch.
    NoBuildCommands,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::UnregisteredRepository => write!(f, "unregistered repository"),
            DropReason::BranchDeleted => write!(f, "branch deleted"),
            DropReason::NoBuildCommands => write!(f, "no build commands for branch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit,
    Drop(DropReason),
}

/// Decide whether a request should be built.
pub fn decide(registry: &dyn RepositoryRegistry, request: &BuildRequest) -> AdmissionDecision {
    let Some(repository) = registry.repository_for_url(&request.repository_url) else {
        return AdmissionDecision::Drop(DropReason::UnregisteredRepository);
    };
    if !request.should_build {
        return AdmissionDecision::Drop(DropReason::BranchDeleted);
    }
    if repository
        .get_commands(&request.branch, CommandKind::Build)
        .is_empty()
    {
        return AdmissionDecision::Drop(DropReason::NoBuildCommands);
    }
    AdmissionDecision::Admit
}

/// Running totals of admission outcomes.
#[derive(Debug, Default)]
pub struct AdmissionStats {
    admitted: AtomicU64,
    unregistered: AtomicU64,
    branch_deleted: AtomicU64,
    no_build_commands: AtomicU64,
    malformed: AtomicU64,
}

impl AdmissionStats {
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::UnregisteredRepository => &self.unregistered,
            DropReason::BranchDeleted => &self.branch_deleted,
            DropReason::NoBuildCommands => &self.no_build_commands,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of admission counters and queue occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub dropped_unregistered: u64,
    pub dropped_branch_deleted: u64,
    pub dropped_no_build_commands: u64,
    pub malformed: u64,
    pub queue_capacity: usize,
    pub queue_depth: usize,
}

/// Entry point for webhook handlers: decide, count and enqueue.
#[derive(Clone)]
pub struct Admitter {
    registry: Arc<dyn RepositoryRegistry>,
    queue: AdmissionQueue,
    stats: Arc<AdmissionStats>,
}

impl Admitter {
    pub fn new(registry: Arc<dyn RepositoryRegistry>, queue: AdmissionQueue) -> Self {
        Self {
            registry,
            queue,
            stats: Arc::new(AdmissionStats::default()),
        }
    }

    pub fn registry(&self) -> &dyn RepositoryRegistry {
        self.registry.as_ref()
    }

    /// Queue the request if it should be built.
    ///
    /// Waits while the queue is full. Drops are logged and counted, never
    /// returned as errors.
    pub async fn submit(&self, request: BuildRequest) -> Result<AdmissionDecision, QueueClosed> {
        let decision = decide(self.registry.as_ref(), &request);

        match decision {
            AdmissionDecision::Admit => {
                info!(
                    url = %request.repository_url,
                    branch = %request.branch,
                    commit = %request.commit,
                    "Admitting build request"
                );
                self.queue.admit(request).await?;
                self.stats.record_admitted();
            }
            AdmissionDecision::Drop(reason) => {
                info!(
                    url = %request.repository_url,
                    branch = %request.branch,
                    reason = %reason,
                    "Dropping build request"
                );
                self.stats.record_drop(reason);
            }
        }
        Ok(decision)
    }

    /// Count a webhook body that could not be parsed.
    pub fn record_malformed(&self) {
        self.stats.record_malformed();
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.stats.admitted.load(Ordering::Relaxed),
            dropped_unregistered: self.stats.unregistered.load(Ordering::Relaxed),
            dropped_branch_deleted: self.stats.branch_deleted.load(Ordering::Relaxed),
            dropped_no_build_commands: self.stats.no_build_commands.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            queue_capacity: self.queue.capacity(),
            queue_depth: self.queue.depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::admission_queue;
    use chrono::Utc;
    use gantry_config::StaticRegistry;
    use gantry_core::{Command, GitProvider, Repository};

    fn registry() -> Arc<dyn RepositoryRegistry> {
        let mut repo = Repository::new("widget", "https://github.com/acme/widget");
        repo.commands
            .push(Command::new(CommandKind::Build, "main", "make test"));
        Arc::new(StaticRegistry::new(vec![repo]))
    }

    fn request(url: &str, branch: &str, should_build: bool) -> BuildRequest {
        BuildRequest {
            provider: GitProvider::Github,
            repository_url: url.to_string(),
            branch: branch.to_string(),
            commit: "abc123".to_string(),
            commit_url: String::new(),
            name: String::new(),
            email: String::new(),
            timestamp: Utc::now(),
            should_build,
            pull_request: None,
        }
    }

    #[test]
    fn test_decide() {
        let registry = registry();
        let registry = registry.as_ref();

        assert_eq!(
            decide(registry, &request("https://github.com/acme/widget", "main", true)),
            AdmissionDecision::Admit
        );
        assert_eq!(
            decide(registry, &request("https://github.com/acme/other", "main", true)),
            AdmissionDecision::Drop(DropReason::UnregisteredRepository)
        );
        assert_eq!(
            decide(registry, &request("https://github.com/acme/widget", "main", false)),
            AdmissionDecision::Drop(DropReason::BranchDeleted)
        );
        assert_eq!(
            decide(registry, &request("https://github.com/acme/widget", "dev", true)),
            AdmissionDecision::Drop(DropReason::NoBuildCommands)
        );
    }

    #[tokio::test]
    async fn test_submit_queues_only_admitted() {
        let (queue, receiver) = admission_queue(8);
        let admitter = Admitter::new(registry(), queue);

        admitter
            .submit(request("https://github.com/acme/widget", "main", true))
            .await
            .unwrap();
        admitter
            .submit(request("https://github.com/acme/nope", "main", true))
            .await
            .unwrap();
        admitter
            .submit(request("https://github.com/acme/widget", "main", false))
            .await
            .unwrap();
        admitter.record_malformed();

        let stats = admitter.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.dropped_unregistered, 1);
        assert_eq!(stats.dropped_branch_deleted, 1);
        assert_eq!(stats.dropped_no_build_commands, 0);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.queue_capacity, 8);
        assert_eq!(stats.queue_depth, 1);

        assert!(receiver.recv().await.unwrap().should_build);
    }
}
