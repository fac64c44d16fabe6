//! Command execution: run a job's shell command in a child process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::model::Job;

/// Exit code reported when the shell itself cannot be started.
pub const LAUNCH_FAILURE_CODE: i32 = 127;

/// Exit code reported when the child was killed by a signal.
pub const SIGNALED_CODE: i32 = -1;

/// What came back from one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit_code: i32,
    /// Captured standard error, verbatim.
    pub stderr: String,
}

impl ExecOutcome {
    /// Exit code 0 is the only success signal.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one job to completion. Never retries and never fails: every problem,
/// including a failure to launch, becomes a non-zero exit code.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, job: &Job) -> ExecOutcome;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    fn shell(command_line: &str) -> Command {
        #[cfg(windows)]
        let mut command = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command_line);
            c
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command_line);
            c
        };
        command.stdin(Stdio::null());
        command
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, job: &Job) -> ExecOutcome {
        debug!(job.id = %job.id, command = %job.command, "spawning shell");

        let output = Self::shell(&job.command)
            .env("QUEUECTL_JOB_ID", job.id.as_str())
            .env("QUEUECTL_ATTEMPT", (job.attempts + 1).to_string())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(job.id = %job.id, error = %e, "failed to launch command");
                return ExecOutcome {
                    exit_code: LAUNCH_FAILURE_CODE,
                    stderr: format!("failed to launch command: {e}"),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(job.id = %job.id, stdout = %stdout.trim_end(), "command output");
        }

        ExecOutcome {
            exit_code: output.status.code().unwrap_or(SIGNALED_CODE),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}
