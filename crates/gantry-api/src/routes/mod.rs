//! API routes.

pub mod health;
pub mod jobs;
pub mod stats;
pub mod webhooks;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .nest("/webhooks", webhooks::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/repositories", jobs::repositories_router())
        .merge(stats::router())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::response::Response;
    use gantry_config::StaticRegistry;
    use gantry_core::{Command, CommandKind, Repository};
    use gantry_db::MemoryJobStore;
    use gantry_scheduler::{
        Admitter, CancellationRegistry, JobCanceller, QueueReceiver, admission_queue,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Router state over an in-memory store, with the queue left undrained
    /// so tests can inspect what was admitted.
    pub(crate) struct TestApp {
        pub(crate) state: AppState,
        pub(crate) receiver: QueueReceiver,
        pub(crate) store: Arc<MemoryJobStore>,
        pub(crate) cancellations: Arc<CancellationRegistry>,
    }

    impl TestApp {
        pub(crate) fn new(webhook_secret: Option<&str>) -> Self {
            let mut repo = Repository::new("widget", "https://github.com/acme/widget");
            repo.webhook_secret = webhook_secret.map(String::from);
            repo.commands
                .push(Command::new(CommandKind::Build, "", "make test"));

            let store = Arc::new(MemoryJobStore::new());
            let (queue, receiver) = admission_queue(8);
            let cancellations = Arc::new(CancellationRegistry::new(CancellationToken::new()));
            let state = AppState::new(
                store.clone(),
                Admitter::new(Arc::new(StaticRegistry::new(vec![repo])), queue),
                JobCanceller::new(store.clone(), cancellations.clone()),
                "https://ci.example.com",
            );

            Self {
                state,
                receiver,
                store,
                cancellations,
            }
        }

        pub(crate) fn router(&self) -> Router {
            router(self.state.clone())
        }
    }

    pub(crate) async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
