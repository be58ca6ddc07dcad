//! Local shell runner implementation.

use async_trait::async_trait;
use gantry_core::executor::{CommandOutput, CommandRunner, CommandSpec};
use gantry_core::{Error, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands with `sh -c` on the local machine.
///
/// Stderr is folded into stdout so the captured output keeps the order
/// the command wrote it in.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell, e.g. `bash`.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{}", spec.command))
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec.command, "Running command");

        let child = self
            .build_command(spec)
            .spawn()
            .map_err(|e| Error::ExecutionFailed(format!("{}: {}", spec.command, e)))?;

        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    // Dropping the future kills the child.
                    warn!(command = %spec.command, timeout = ?limit, "Command timed out");
                    return Err(Error::Timeout(format!(
                        "{} exceeded {}s",
                        spec.command,
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| Error::ExecutionFailed(format!("{}: {}", spec.command, e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        let result = CommandOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            output: text,
        };
        debug!(
            command = %spec.command,
            exit_code = ?result.exit_code,
            success = result.success,
            "Command finished"
        );
        Ok(result)
    }
}
