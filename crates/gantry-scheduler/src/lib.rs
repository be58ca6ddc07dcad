//! Admission queue and worker pool for the Gantry CI orchestrator.
//!
//! Webhook handlers submit build requests through an [`Admitter`], which
//! decides whether to build and places admitted requests on a bounded
//! queue. A fixed pool of workers drains the queue, running each job's
//! build and deploy stages and announcing the outcome.

pub mod admission;
pub mod cancel;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod worker;

pub use admission::{AdmissionDecision, AdmissionStats, Admitter, DropReason, StatsSnapshot, decide};
pub use cancel::CancellationRegistry;
pub use pipeline::{StageRunner, StageState};
pub use pool::{DELIVERY_GRACE, JobCanceller, PoolConfig, WorkerPool};
pub use queue::{AdmissionQueue, QueueClosed, QueueReceiver, admission_queue};
pub use worker::Worker;
