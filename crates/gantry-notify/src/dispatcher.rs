//! Fan-out of job outcomes to their sinks.

use futures::future::join_all;
use gantry_config::ChatConfig;
use gantry_core::{Job, NotificationTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    ChatNotifier, Notifier, NotifyError, Outcome, PullRequestCommenter, SlackNotifier,
};

/// Result of delivering to one sink.
#[derive(Debug)]
pub struct SinkReport {
    pub sink: String,
    pub result: Result<(), NotifyError>,
}

/// Builds the sinks a finished job should be announced to.
pub trait NotifierFactory: Send + Sync {
    fn notifiers_for(&self, job: &Job) -> Vec<Box<dyn Notifier>>;
}

/// Upper bound on a single sink request, connect to last byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sinks taken from the job's repository snapshot.
pub struct ConfiguredNotifiers {
    client: reqwest::Client,
    chat: Option<ChatConfig>,
}

impl ConfiguredNotifiers {
    pub fn new(chat: Option<ChatConfig>) -> Result<Self, NotifyError> {
        Self::with_timeout(chat, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(chat: Option<ChatConfig>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, chat })
    }
}

impl NotifierFactory for ConfiguredNotifiers {
    fn notifiers_for(&self, job: &Job) -> Vec<Box<dyn Notifier>> {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

        for target in &job.repository.notifications {
            match target {
                NotificationTarget::Chat { room } => match &self.chat {
                    Some(chat) => notifiers.push(Box::new(ChatNotifier::new(
                        self.client.clone(),
                        chat.clone(),
                        room.clone(),
                    ))),
                    None => warn!(
                        job_id = %job.id,
                        room = %room,
                        "Chat room configured but no chat service, skipping"
                    ),
                },
                NotificationTarget::Slack {
                    webhook_url,
                    channel,
                } => notifiers.push(Box::new(SlackNotifier::new(
                    self.client.clone(),
                    webhook_url.clone(),
                    channel.clone(),
                ))),
            }
        }

        if job.repository.comment_pr && job.pull_request.is_some() {
            notifiers.push(Box::new(PullRequestCommenter::new(self.client.clone())));
        }

        notifiers
    }
}

/// Announces finished jobs without blocking the caller.
///
/// Clones share one set of in-flight deliveries, so [`Dispatcher::drain`]
/// on any clone waits for all of them.
#[derive(Clone)]
pub struct Dispatcher {
    server_url: String,
    factory: Arc<dyn NotifierFactory>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(server_url: impl Into<String>, factory: Arc<dyn NotifierFactory>) -> Self {
        Self {
            server_url: server_url.into(),
            factory,
            tracker: TaskTracker::new(),
        }
    }

    /// Deliver in a tracked background task.
    pub fn dispatch(&self, job: Job) -> JoinHandle<Vec<SinkReport>> {
        let dispatcher = self.clone();
        self.tracker.spawn(async move { dispatcher.deliver(&job).await })
    }

    /// Wait up to `grace` for in-flight deliveries to finish.
    ///
    /// Returns false if some were still running when the grace period
    /// ran out. Deliveries dispatched after a drain are still tracked.
    pub async fn drain(&self, grace: Duration) -> bool {
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for notifications to be delivered");
        }
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        drained
    }

    /// Deliver to every sink concurrently and collect one report per sink.
    pub async fn deliver(&self, job: &Job) -> Vec<SinkReport> {
        if !job.done() {
            warn!(job_id = %job.id, "Job is not done, not notifying");
            return Vec::new();
        }

        let outcome = Outcome::for_job(job, &self.server_url);
        let notifiers = self.factory.notifiers_for(job);
        if notifiers.is_empty() {
            debug!(job_id = %job.id, "No notification sinks configured");
            return Vec::new();
        }

        let reports = join_all(notifiers.iter().map(|notifier| {
            let outcome = &outcome;
            async move {
                SinkReport {
                    sink: notifier.name(),
                    result: notifier.notify(job, outcome).await,
                }
            }
        }))
        .await;

        for report in &reports {
            match &report.result {
                Ok(()) => info!(job_id = %job.id, sink = %report.sink, "Notification delivered"),
                Err(e) => warn!(
                    job_id = %job.id,
                    sink = %report.sink,
                    error = %e,
                    "Notification failed"
                ),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::finished_job;
    use async_trait::async_trait;
    use gantry_core::PullRequestRef;
    use std::sync::Mutex;

    /// Records every outcome it receives; optionally fails.
    struct RecordingNotifier {
        name: String,
        fail: bool,
        seen: Arc<Mutex<Vec<Outcome>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> String {
            self.name.clone()
        }

        async fn notify(&self, _job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(outcome.clone());
            if self.fail {
                Err(NotifyError::Request("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct MockFactory {
        sinks: Vec<(&'static str, bool)>,
        seen: Arc<Mutex<Vec<Outcome>>>,
    }

    impl NotifierFactory for MockFactory {
        fn notifiers_for(&self, _job: &Job) -> Vec<Box<dyn Notifier>> {
            self.sinks
                .iter()
                .map(|(name, fail)| {
                    Box::new(RecordingNotifier {
                        name: name.to_string(),
                        fail: *fail,
                        seen: self.seen.clone(),
                    }) as Box<dyn Notifier>
                })
                .collect()
        }
    }

    fn dispatcher(sinks: Vec<(&'static str, bool)>) -> (Dispatcher, Arc<Mutex<Vec<Outcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = MockFactory {
            sinks,
            seen: seen.clone(),
        };
        (
            Dispatcher::new("https://ci.example.com", Arc::new(factory)),
            seen,
        )
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_others() {
        let (dispatcher, seen) = dispatcher(vec![("chat", true), ("slack", false)]);

        let reports = dispatcher.dispatch(finished_job(false)).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].result.is_err());
        assert_eq!(reports[1].sink, "slack");
        assert!(reports[1].result.is_ok());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|o| !o.passed));
    }

    /// Takes its time before recording anything.
    struct SlowNotifier {
        delay: Duration,
        seen: Arc<Mutex<Vec<Outcome>>>,
    }

    #[async_trait]
    impl Notifier for SlowNotifier {
        fn name(&self) -> String {
            "slow".to_string()
        }

        async fn notify(&self, _job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    struct SlowFactory {
        delay: Duration,
        seen: Arc<Mutex<Vec<Outcome>>>,
    }

    impl NotifierFactory for SlowFactory {
        fn notifiers_for(&self, _job: &Job) -> Vec<Box<dyn Notifier>> {
            vec![Box::new(SlowNotifier {
                delay: self.delay,
                seen: self.seen.clone(),
            })]
        }
    }

    fn slow_dispatcher(delay: Duration) -> (Dispatcher, Arc<Mutex<Vec<Outcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = SlowFactory {
            delay,
            seen: seen.clone(),
        };
        (
            Dispatcher::new("https://ci.example.com", Arc::new(factory)),
            seen,
        )
    }

    #[tokio::test]
    async fn test_drain_waits_for_detached_deliveries() {
        let (dispatcher, seen) = slow_dispatcher(Duration::from_millis(50));

        // Handle dropped: only the tracker knows about this delivery.
        drop(dispatcher.clone().dispatch(finished_job(true)));

        assert!(dispatcher.drain(Duration::from_secs(5)).await);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_grace() {
        let (dispatcher, seen) = slow_dispatcher(Duration::from_secs(60));
        drop(dispatcher.dispatch(finished_job(true)));

        assert!(!dispatcher.drain(Duration::from_millis(20)).await);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unfinished_job_is_not_announced() {
        let (dispatcher, seen) = dispatcher(vec![("chat", false)]);
        let mut job = finished_job(true);
        job.tasks_finished = None;

        assert!(dispatcher.deliver(&job).await.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresponsive_sink_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut job = finished_job(true);
        job.repository.notifications = vec![NotificationTarget::Slack {
            webhook_url: format!("http://{}/hook", addr),
            channel: None,
        }];
        let factory = ConfiguredNotifiers::with_timeout(None, Duration::from_millis(100)).unwrap();
        let dispatcher = Dispatcher::new("https://ci.example.com", Arc::new(factory));

        let reports = tokio::time::timeout(Duration::from_secs(5), dispatcher.deliver(&job))
            .await
            .expect("delivery hung on a silent sink");

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sink, "slack");
        assert!(reports[0].result.is_err());
    }

    #[test]
    fn test_configured_notifiers_selection() {
        let chat = ChatConfig {
            endpoint: "https://chat.example.com".to_string(),
            api_key: "key".to_string(),
            from: "Gantry".to_string(),
        };
        let mut job = finished_job(true);
        job.repository.notifications = vec![
            NotificationTarget::Chat {
                room: "builds".to_string(),
            },
            NotificationTarget::Slack {
                webhook_url: "https://hooks.slack.com/x".to_string(),
                channel: None,
            },
        ];

        let names: Vec<String> = ConfiguredNotifiers::new(Some(chat.clone()))
            .unwrap()
            .notifiers_for(&job)
            .iter()
            .map(|n| n.name())
            .collect();
        assert_eq!(names, vec!["chat:builds", "slack"]);

        // No chat service: the chat room is skipped.
        let without_chat = ConfiguredNotifiers::new(None).unwrap();
        assert_eq!(without_chat.notifiers_for(&job).len(), 1);

        // PR comments need both the repository flag and a linked PR.
        job.repository.comment_pr = true;
        assert_eq!(
            ConfiguredNotifiers::new(Some(chat.clone()))
                .unwrap()
                .notifiers_for(&job)
                .len(),
            2
        );
        job.pull_request = Some(PullRequestRef {
            number: 1,
            comments_url: "https://api.github.com/repos/acme/widget/issues/1/comments"
                .to_string(),
        });
        let names: Vec<String> = ConfiguredNotifiers::new(Some(chat))
            .unwrap()
            .notifiers_for(&job)
            .iter()
            .map(|n| n.name())
            .collect();
        assert_eq!(names.last().map(String::as_str), Some("pull_request"));
    }
}
