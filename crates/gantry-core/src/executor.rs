//! Command runner trait and execution types.
//!
//! Runners execute one shell command to completion. Sequencing, fail-fast
//! and cancellation live in the scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Specification for a command to execute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Shell command line.
    pub command: String,
    /// Working directory. Inherits the process directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Environment variables added to the process environment.
    pub env: HashMap<String, String>,
    /// Maximum execution time. The process is killed when exceeded.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code if the process exited normally.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Trait for command execution backends.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run a command and wait for it to finish.
    ///
    /// A non-zero exit is a successful call with `success == false`.
    /// Errors mean the command could not be run or did not finish in time.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}
