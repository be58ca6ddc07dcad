//! Application state.

use gantry_db::JobStore;
use gantry_scheduler::{Admitter, JobCanceller};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub admitter: Admitter,
    pub canceller: JobCanceller,
    /// Public base URL, used to build job links.
    pub server_url: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        admitter: Admitter,
        canceller: JobCanceller,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            admitter,
            canceller,
            server_url: server_url.into(),
        }
    }
}
