//! Agent abstraction for measure and stitch invocations.
//!
//! The [`Agent`] trait decouples the cycle runner from the actual agent
//! backend (a configured command line, `claude --print` by default). Tests use
//! scripted agents that act on the working directory without spawning
//! processes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, RunOptions, command_from_argv, run_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Measure,
    Stitch,
}

impl AgentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Measure => "measure",
            Self::Stitch => "stitch",
        }
    }
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for an agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub phase: AgentPhase,
    /// Working directory for the agent process (a generation worktree or the
    /// repository root).
    pub workdir: PathBuf,
    /// Prompt text fed on stdin.
    pub prompt: String,
    /// Where the stdout/stderr log is written after the agent exits.
    pub log_path: PathBuf,
    /// When set, stdout lines are copied here as they arrive.
    pub stream_path: Option<PathBuf>,
    pub timeout: Duration,
    /// Truncate agent output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Run the agent to completion. Any file contract (e.g. the task list for
    /// measure) is checked by the caller.
    fn invoke(&self, request: &AgentRequest) -> Result<()>;
}

/// Agent that spawns a configured command with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: Vec<String>,
}

impl CommandAgent {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(phase = %request.phase, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &AgentRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent");
        let cmd = command_from_argv(&self.command, &request.workdir)?;
        let mut opts = RunOptions::new(request.timeout, request.output_limit_bytes)
            .stdin(request.prompt.as_bytes());
        if let Some(stream) = &request.stream_path {
            opts = opts.tee(stream);
        }
        let output = run_command(cmd, &opts)
            .with_context(|| format!("run {} agent", request.phase))?;

        write_agent_log(&request.log_path, &output)?;
        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
        }
        output.ensure_success(&format!("{} agent", request.phase))?;
        debug!("agent completed successfully");
        Ok(())
    }
}

fn write_agent_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_lossy());
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_lossy());
    buf.push_str(&output.truncated_notice("agent"));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;

    fn request(dir: &Path) -> AgentRequest {
        AgentRequest {
            phase: AgentPhase::Measure,
            workdir: dir.to_path_buf(),
            prompt: "list the gaps".to_string(),
            log_path: dir.join("logs/measure.log"),
            stream_path: Some(dir.join("logs/measure.stream.log")),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn prompt_is_piped_and_logged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = CommandAgent::new(vec!["cat".to_string()]);
        agent.invoke(&request(temp.path())).expect("invoke");

        let log = fs::read_to_string(temp.path().join("logs/measure.log")).expect("log");
        assert!(log.contains("=== stdout ===\nlist the gaps"));
        let stream =
            fs::read_to_string(temp.path().join("logs/measure.stream.log")).expect("stream");
        assert_eq!(stream, "list the gaps");
    }

    #[test]
    fn failing_agent_still_writes_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = CommandAgent::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo nope >&2; exit 1".to_string(),
        ]);
        let err = agent.invoke(&request(temp.path())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ExternalCommand { .. })
        ));
        let log = fs::read_to_string(temp.path().join("logs/measure.log")).expect("log");
        assert!(log.contains("nope"));
    }
}
