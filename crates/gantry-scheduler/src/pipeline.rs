//! Stage runner: executes one pipeline stage of a job command by command.

use chrono::Utc;
use gantry_config::VariableContext;
use gantry_core::{
    CommandKind, CommandLog, CommandOutcome, CommandRunner, CommandSpec, Job,
};
use gantry_db::{DbResult, JobStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Every command passed.
    Passed,
    /// A command failed; later commands were not run.
    Failed,
    /// Cancellation was observed before a command was dispatched.
    Cancelled,
}

impl StageState {
    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Passed)
    }
}

/// Runs the commands of a stage in declaration order, stopping at the
/// first failure, and records a command log for each one.
pub struct StageRunner {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn JobStore>,
    workspace: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl StageRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn JobStore>) -> Self {
        Self {
            runner,
            store,
            workspace: None,
            timeout: None,
        }
    }

    pub fn with_workspace(mut self, workspace: Option<PathBuf>) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every `kind` command of the job's branch.
    ///
    /// Before each command both the token and the job's stored `cancelled`
    /// flag are checked; a running command is always allowed to finish.
    /// Store failures abort the stage.
    pub async fn run_stage(
        &self,
        job: &mut Job,
        kind: CommandKind,
        cancel: &CancellationToken,
    ) -> DbResult<StageState> {
        let commands: Vec<String> = job
            .repository
            .get_commands(&job.branch, kind)
            .into_iter()
            .map(|c| c.execute.clone())
            .collect();

        let mut var_ctx = VariableContext::for_job(job);
        var_ctx.populate_env();
        let env = command_env(job);

        for command in commands {
            if self.cancel_requested(job, cancel).await? {
                job.cancelled = true;
                info!(job_id = %job.id, stage = %kind, "Cancelled, not running further commands");
                return Ok(StageState::Cancelled);
            }

            let spec = CommandSpec {
                command: var_ctx.interpolate(&command),
                working_dir: self.workspace.clone(),
                env: env.clone(),
                timeout: self.timeout,
            };

            info!(job_id = %job.id, stage = %kind, command = %spec.command, "Running command");
            let log = self.execute(kind, spec).await;
            let passed = log.passed();

            self.store.append_command_log(job.id, &log).await?;
            job.command_logs.push(log);

            if !passed {
                warn!(job_id = %job.id, stage = %kind, command = %command, "Command failed, stopping stage");
                return Ok(StageState::Failed);
            }
        }

        Ok(StageState::Passed)
    }

    async fn cancel_requested(&self, job: &Job, cancel: &CancellationToken) -> DbResult<bool> {
        if cancel.is_cancelled() {
            return Ok(true);
        }
        Ok(self.store.get_job(job.id).await?.cancelled)
    }

    async fn execute(&self, kind: CommandKind, spec: CommandSpec) -> CommandLog {
        let started_at = Utc::now();
        let (outcome, exit_code, output) = match self.runner.run(&spec).await {
            Ok(result) if result.success => (CommandOutcome::Passed, result.exit_code, result.output),
            Ok(result) => (CommandOutcome::Failed, result.exit_code, result.output),
            Err(e) => (CommandOutcome::Failed, None, e.to_string()),
        };

        CommandLog {
            kind,
            command: spec.command,
            outcome,
            exit_code,
            output,
            started_at,
            finished_at: Some(Utc::now()),
        }
    }
}

/// Variables every command sees in its environment.
fn command_env(job: &Job) -> HashMap<String, String> {
    HashMap::from([
        ("CI".to_string(), "true".to_string()),
        ("GANTRY_JOB_ID".to_string(), job.id.to_string()),
        ("GANTRY_REPOSITORY_URL".to_string(), job.repository.url.clone()),
        ("GANTRY_BRANCH".to_string(), job.branch.clone()),
        ("GANTRY_COMMIT".to_string(), job.commit.clone()),
    ])
}
