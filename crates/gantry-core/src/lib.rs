//! Core domain types and traits for the Gantry CI orchestrator.
//!
//! This crate contains:
//! - Job identifiers and the job state machine
//! - Repository and command pipeline definitions
//! - Webhook normalizers producing provider-agnostic build requests
//! - The command runner trait implemented by execution backends

pub mod error;
pub mod executor;
pub mod id;
pub mod job;
pub mod repository;
pub mod webhook;

pub use error::{Error, Result};
pub use executor::{CommandOutput, CommandRunner, CommandSpec};
pub use id::JobId;
pub use job::{CommandLog, CommandOutcome, Job, JobStatus, NewJob};
pub use repository::{
    Command, CommandKind, NotificationTarget, Repository, RepositoryRegistry, branch_matches,
    normalize_url,
};
pub use webhook::{BuildRequest, GitProvider, PullRequestRef, WebhookError};
