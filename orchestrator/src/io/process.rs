//! Helpers for running child processes with timeouts and bounded output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::OrchestratorError;

/// How to run one child process.
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub stdin: Option<&'a [u8]>,
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
    /// Copy every stdout line to this file as it arrives (not truncated).
    pub tee_path: Option<PathBuf>,
}

impl<'a> RunOptions<'a> {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            stdin: None,
            timeout,
            output_limit_bytes,
            tee_path: None,
        }
    }

    pub fn stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn tee(mut self, path: impl Into<PathBuf>) -> Self {
        self.tee_path = Some(path.into());
        self
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn truncated_notice(&self, label: &str) -> String {
        let mut notice = String::new();
        if self.stdout_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        notice
    }

    /// Turn a timeout or non-zero exit into `OrchestratorError::ExternalCommand`.
    pub fn ensure_success(self, label: &str) -> Result<Self> {
        if self.timed_out {
            return Err(OrchestratorError::external(label, "timed out").into());
        }
        if !self.status.success() {
            let stderr = self.stderr_lossy();
            let code = describe_status(&self.status);
            let detail = match stderr.trim() {
                "" => format!("exit status {code}"),
                tail => format!("exit status {code}: {}", last_lines(tail, 20)),
            };
            return Err(OrchestratorError::external(label, detail).into());
        }
        Ok(self)
    }
}

fn describe_status(status: &ExitStatus) -> String {
    status
        .code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Build a `Command` from an argv slice.
pub fn command_from_argv(argv: &[String], cwd: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(cwd);
    Ok(cmd)
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. A spawn failure is
/// reported as `OrchestratorError::ExternalCommand`; exit status is left to the
/// caller (see [`CommandOutput::ensure_success`]).
#[instrument(skip_all, fields(timeout_secs = opts.timeout.as_secs(), output_limit_bytes = opts.output_limit_bytes, tee = opts.tee_path.is_some()))]
pub fn run_command(mut cmd: Command, opts: &RunOptions<'_>) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    if opts.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let tee = match &opts.tee_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    debug!(program = %program, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = %program, "failed to spawn command");
            return Err(OrchestratorError::external(program, format!("spawn: {e}")).into());
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = opts.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_lines_limited(stdout, limit, tee));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    // Drain threads must be running before stdin is written, or a child that
    // fills its stdout pipe first deadlocks.
    if let Some(input) = opts.stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(e) = child_stdin.write_all(input) {
            warn!(err = %e, "child closed stdin early");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(opts.timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = opts.timeout.as_secs(),
                program = %program,
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_lines_limited<R: Read>(
    reader: R,
    limit: usize,
    mut tee: Option<BufWriter<File>>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(writer) = tee.as_mut()
            && let Err(e) = writer.write_all(&line).and_then(|()| writer.flush())
        {
            warn!(err = %e, "failed to write log file, disabling tee");
            tee = None;
        }

        let remaining = limit.saturating_sub(collected.len());
        let keep = n.min(remaining);
        collected.extend_from_slice(&line[..keep]);
        truncated += n - keep;
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
