//! Test-only helpers: throwaway git repositories and a scripted agent.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::tasks::{ProposedTask, TaskList, TaskStatus};
use crate::io::agent::{Agent, AgentPhase, AgentRequest};
use crate::io::git::Git;
use crate::io::task_store::write_task_list;

/// A git repository in a temp dir with one commit on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git_cmd(&["init", "--quiet"])?;
        repo.git_cmd(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git_cmd(&["config", "user.name", "Test"])?;
        repo.git_cmd(&["config", "user.email", "test@example.com"])?;
        repo.git_cmd(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "# test\n")?;
        repo.git_cmd(&["add", "-A"])?;
        repo.git_cmd(&["commit", "--quiet", "-m", "initial"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    /// Write `body` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, body: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn git_cmd(&self, args: &[&str]) -> Result<()> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .context("spawn git")?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        Ok(())
    }
}

/// What the scripted agent does on its next invocation.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write a task list to `<scratch>/tasks.json` in the request's workdir.
    WriteTasks(TaskList),
    /// Write a file relative to the request's workdir.
    WriteFile { path: String, body: String },
    /// Fail the invocation.
    Fail(String),
}

/// Agent that replays a fixed script and records every invocation.
pub struct ScriptedAgent {
    scratch_dir: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(AgentPhase, PathBuf)>>,
}

impl ScriptedAgent {
    pub fn new(scratch_dir: &str, steps: Vec<Step>) -> Self {
        Self {
            scratch_dir: scratch_dir.to_string(),
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append steps for later invocations.
    pub fn push(&self, steps: impl IntoIterator<Item = Step>) {
        if let Ok(mut queue) = self.steps.lock() {
            queue.extend(steps);
        }
    }

    pub fn phases(&self) -> Vec<AgentPhase> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|(phase, _)| *phase).collect())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|q| q.len()).unwrap_or_default()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("calls lock poisoned"))?
            .push((request.phase, request.workdir.clone()));
        let step = self
            .steps
            .lock()
            .map_err(|_| anyhow!("steps lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent has no step for {}", request.phase))?;
        match step {
            Step::WriteTasks(list) => {
                let path = request.workdir.join(&self.scratch_dir).join("tasks.json");
                write_task_list(&path, &list)
            }
            Step::WriteFile { path, body } => {
                let path = request.workdir.join(path);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, body).with_context(|| format!("write {}", path.display()))
            }
            Step::Fail(message) => Err(anyhow!(message)),
        }
    }
}

/// An open task with no dependencies.
pub fn task(id: &str, title: &str) -> ProposedTask {
    ProposedTask {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title}."),
        depends_on: Vec::new(),
        status: TaskStatus::Open,
    }
}

pub fn task_list(tasks: Vec<ProposedTask>) -> TaskList {
    TaskList { tasks }
}
