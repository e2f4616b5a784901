//! Run an external command under protection: each run is one protected
//! section, so a SIGINT/SIGTERM arriving mid-run lets the child finish and
//! then exits with the signal's code. Pauses between runs are unprotected.

use crate::config::RunConfig;
use crate::installer::ShieldError;
use crate::section::Outcome;
use crate::shield::Shield;
use crate::signal::EXIT_CODE_BASE;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// What to run and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub command: String,
    pub args: Vec<String>,
    /// Always at least 1.
    pub repeat: u32,
    pub pause: Duration,
    pub isolate_process_group: bool,
}

impl RunPlan {
    pub fn new(command: impl Into<String>, args: Vec<String>, run: &RunConfig) -> Self {
        Self {
            command: command.into(),
            args,
            repeat: run.repeat.max(1),
            pause: Duration::from_millis(run.pause_ms),
            isolate_process_group: run.isolate_process_group,
        }
    }
}

/// Result of one completed child run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// 1-based run number.
    pub iteration: u32,
    /// Child exit code, or `128 + n` if the child died of signal n.
    pub exit_code: i32,
    pub duration: Duration,
    pub pid: u32,
}

/// Errors that can occur while running the child command.
#[derive(Debug)]
pub enum RunError {
    /// Signal handlers could not be installed.
    Shield(ShieldError),
    /// Failed to spawn the child process.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// Failed while waiting for the child to exit.
    Wait { source: std::io::Error },
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Shield(e) => write!(f, "{}", e),
            RunError::Spawn { command, source } => {
                write!(f, "failed to spawn {}: {}", command, source)
            }
            RunError::Wait { source } => {
                write!(f, "failed to wait for child process: {}", source)
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Shield(e) => Some(e),
            RunError::Spawn { source, .. } => Some(source),
            RunError::Wait { source } => Some(source),
        }
    }
}

impl From<ShieldError> for RunError {
    fn from(e: ShieldError) -> Self {
        RunError::Shield(e)
    }
}

/// Map a child's exit status to a shell-style exit code.
pub fn status_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => EXIT_CODE_BASE + signal,
        (None, None) => 1,
    }
}

/// Run the plan. Returns the last child's exit code, or `Terminate` if a
/// signal was deferred during a run.
pub async fn run_plan(shield: &Shield, plan: &RunPlan) -> Result<Outcome<i32>, RunError> {
    let mut last_code = 0;

    for iteration in 1..=plan.repeat {
        let result = match shield.protect_async(run_once(plan, iteration)).await? {
            Outcome::Continue(result) => result?,
            Outcome::Terminate(code) => {
                tracing::info!(iteration, code, "run finished with a deferred signal");
                return Ok(Outcome::Terminate(code));
            }
        };
        last_code = result.exit_code;

        if iteration < plan.repeat && !plan.pause.is_zero() {
            tracing::debug!(pause_ms = plan.pause.as_millis() as u64, "pausing between runs");
            tokio::time::sleep(plan.pause).await;
        }
    }

    Ok(Outcome::Continue(last_code))
}

/// Spawn the child once and wait for it.
async fn run_once(plan: &RunPlan, iteration: u32) -> Result<RunResult, RunError> {
    tracing::info!(
        iteration,
        command = %plan.command,
        args = ?plan.args,
        "spawning protected run"
    );

    let start = Instant::now();

    let mut command = Command::new(&plan.command);
    command.args(&plan.args);
    if plan.isolate_process_group {
        command.process_group(0); // Terminal Ctrl-C reaches holdfast only
    }

    let mut child = command.spawn().map_err(|e| RunError::Spawn {
        command: plan.command.clone(),
        source: e,
    })?;

    let pid = child.id().unwrap_or(0);
    tracing::debug!(pid, "child started");

    let status = child
        .wait()
        .await
        .map_err(|e| RunError::Wait { source: e })?;

    let duration = start.elapsed();
    let exit_code = status_code(status);
    tracing::info!(
        iteration,
        exit_code,
        duration_ms = duration.as_millis() as u64,
        "protected run completed"
    );

    Ok(RunResult {
        iteration,
        exit_code,
        duration,
        pid,
    })
}
