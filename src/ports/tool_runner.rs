//! Quality-gate tool runner port.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ToolRunnerError {
    #[error("tool '{0}' has no configured command")]
    Unconfigured(String),
    #[error("tool '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("failed to spawn tool '{0}': {1}")]
    Spawn(String, String),
}

/// The outcome of running one named tool via
/// `run(tool_name, inputs) -> {success, output}`.
#[derive(Debug, Clone)]
pub struct ToolRunResult {
    pub success: bool,
    pub output: String,
}

/// A pluggable runner for the named quality gates the Verifier invokes.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        tool_name: &str,
        inputs: &HashMap<String, String>,
    ) -> Result<ToolRunResult, ToolRunnerError>;
}

/// Default [`ToolRunner`] that executes a configured shell command per
/// gate name. Grounded in this crate's `infrastructure/substrates/
/// claude_code.rs` process-spawning pattern: a piped child, a wall-clock
/// timeout via `tokio::time::timeout`, and a kill on timeout. The child is
/// spawned as its own process group leader (`process_group(0)`, stable and
/// safe) so a gate command that forks its own children is reaped as a
/// group on timeout instead of leaking them.
pub struct ShellToolRunner {
    commands: HashMap<String, String>,
    timeout: Duration,
    working_dir: Option<std::path::PathBuf>,
}

impl ShellToolRunner {
    pub fn new(commands: HashMap<String, String>, timeout: Duration) -> Self {
        Self {
            commands,
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: std::path::PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

#[async_trait]
impl ToolRunner for ShellToolRunner {
    async fn run(
        &self,
        tool_name: &str,
        _inputs: &HashMap<String, String>,
    ) -> Result<ToolRunResult, ToolRunnerError> {
        let command_line = self
            .commands
            .get(tool_name)
            .ok_or_else(|| ToolRunnerError::Unconfigured(tool_name.to_string()))?;

        debug!(tool = tool_name, command = %command_line, "running quality gate");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolRunnerError::Spawn(tool_name.to_string(), e.to_string()))?;

        let pid = child.id();

        let result = timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(ToolRunResult {
                    success: output.status.success(),
                    output: combined,
                })
            }
            Ok(Err(e)) => Err(ToolRunnerError::Spawn(tool_name.to_string(), e.to_string())),
            Err(_) => {
                if let Some(pid) = pid {
                    warn!(tool = tool_name, pid, "gate command timed out, killing process group");
                    kill_group(pid);
                }
                Err(ToolRunnerError::Timeout(tool_name.to_string(), self.timeout))
            }
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_configured_command_and_reports_success() {
        let mut commands = HashMap::new();
        commands.insert("tests.run".to_string(), "true".to_string());
        let runner = ShellToolRunner::new(commands, Duration::from_secs(5));

        let result = runner.run("tests.run", &HashMap::new()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn reports_failure_for_nonzero_exit() {
        let mut commands = HashMap::new();
        commands.insert("lint.run".to_string(), "false".to_string());
        let runner = ShellToolRunner::new(commands, Duration::from_secs(5));

        let result = runner.run("lint.run", &HashMap::new()).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unconfigured_tool_is_an_error() {
        let runner = ShellToolRunner::new(HashMap::new(), Duration::from_secs(5));
        let err = runner.run("security.scan", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ToolRunnerError::Unconfigured(_)));
    }
}
