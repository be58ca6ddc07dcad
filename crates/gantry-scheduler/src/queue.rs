//! Bounded in-process admission queue.

use gantry_core::BuildRequest;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// The worker pool has stopped and no longer accepts requests.
#[derive(Debug, Error)]
#[error("admission queue is closed")]
pub struct QueueClosed;

/// Create a FIFO queue holding at most `capacity` requests.
pub fn admission_queue(capacity: usize) -> (AdmissionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        AdmissionQueue { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Sending half, shared by every webhook handler.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<BuildRequest>,
}

impl AdmissionQueue {
    /// Place a request on the queue, waiting for space when it is full.
    pub async fn admit(&self, request: BuildRequest) -> Result<(), QueueClosed> {
        self.tx.send(request).await.map_err(|_| QueueClosed)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Requests waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Receiving half, shared by every worker. Each request goes to exactly one.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<BuildRequest>>>,
}

impl QueueReceiver {
    /// Next request, or `None` once every sender is gone.
    pub async fn recv(&self) -> Option<BuildRequest> {
        self.rx.lock().await.recv().await
    }
}
