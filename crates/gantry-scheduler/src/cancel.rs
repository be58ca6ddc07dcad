//! Cancellation tokens for running jobs.

use gantry_core::JobId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tokens of in-flight jobs. Every token is a child of the pool's
/// shutdown token, so stopping the pool cancels all running jobs.
#[derive(Debug)]
pub struct CancellationRegistry {
    shutdown: CancellationToken,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create the token a worker checks while running `id`.
    pub fn register(&self, id: JobId) -> CancellationToken {
        let token = self.shutdown.child_token();
        self.lock().insert(id, token.clone());
        token
    }

    /// Signal the worker running `id`. Returns false if it is not running.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.lock().get(&id) {
            Some(token) => {
                debug!(job_id = %id, "Signalling cancellation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: JobId) {
        self.lock().remove(&id);
    }

    pub fn running(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        // The map stays consistent even if a holder panicked.
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }
}
