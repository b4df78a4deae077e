//! Git adapter for generation branches and worktrees.
//!
//! Every repository mutation the orchestrator performs goes through this small,
//! explicit wrapper around `git` subprocess calls. Failures surface as
//! `OrchestratorError::ExternalCommand` carrying git's stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::git_output::{DiffStat, parse_branch_list, parse_diff_shortstat};
use crate::error::OrchestratorError;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Tip commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    /// Committer date, strict ISO 8601.
    pub committed_at: String,
    pub message: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Same repository, different working directory (e.g. a worktree).
    pub fn at(&self, workdir: impl Into<PathBuf>) -> Self {
        Self::new(workdir)
    }

    /// Main worktree of the repository, also when called from a linked
    /// worktree: the parent of the shared git directory.
    pub fn repository_root(&self) -> Result<PathBuf> {
        let out =
            self.run_capture(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        let common = PathBuf::from(out.trim());
        common
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("git common dir {} has no parent", common.display()))
    }

    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True when tracked files differ from HEAD or untracked files exist.
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Local branches matching a glob, in git's (name) order.
    pub fn list_branches(&self, pattern: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["branch", "--list", pattern])?;
        Ok(parse_branch_list(&out))
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(branch, force))]
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_checked(&["branch", flag, branch])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Summary of what is staged.
    pub fn diff_cached_shortstat(&self) -> Result<DiffStat> {
        let out = self.run_capture(&["diff", "--cached", "--shortstat"])?;
        Ok(parse_diff_shortstat(&out))
    }

    /// Commit the index and return the new HEAD sha.
    #[instrument(skip_all, fields(allow_empty))]
    pub fn commit(&self, message: &str, allow_empty: bool) -> Result<String> {
        let mut args = vec!["commit", "--quiet", "--no-verify", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run_checked(&args)?;
        let sha = self.head_sha()?;
        debug!(sha = %sha, "committed");
        Ok(sha)
    }

    /// Sha, committer date and full message of `rev`.
    pub fn last_commit(&self, rev: &str) -> Result<CommitInfo> {
        let out = self.run_capture(&["log", "-1", "--format=%H%x1f%cI%x1f%B", rev, "--"])?;
        let mut parts = out.splitn(3, '\u{1f}');
        let (Some(sha), Some(committed_at), Some(message)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(anyhow!("unexpected git log output for {rev}"));
        };
        Ok(CommitInfo {
            sha: sha.trim().to_string(),
            committed_at: committed_at.trim().to_string(),
            message: message.trim_end().to_string(),
        })
    }

    /// `git merge-base --is-ancestor`: exit 0 yes, 1 no, anything else fails.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let args = ["merge-base", "--is-ancestor", ancestor, descendant];
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&args, &output)),
        }
    }

    /// Merge `branch` into the checked-out branch with a merge commit.
    #[instrument(skip_all, fields(branch))]
    pub fn merge_no_ff(&self, branch: &str, message: &str) -> Result<()> {
        self.run_checked(&["merge", "--no-ff", "--no-edit", "-m", message, branch])?;
        Ok(())
    }

    /// Best effort: there may be no merge in progress.
    pub fn merge_abort(&self) {
        if let Err(err) = self.run_checked(&["merge", "--abort"]) {
            debug!(err = %err, "merge --abort failed");
        }
    }

    pub fn reset_hard(&self, rev: &str) -> Result<()> {
        self.run_checked(&["reset", "--hard", "--quiet", rev])?;
        Ok(())
    }

    /// Remove untracked files and directories (ignored files are kept).
    pub fn clean_untracked(&self) -> Result<()> {
        self.run_checked(&["clean", "-fdq"])?;
        Ok(())
    }

    /// Add a worktree at `path`. With `new_from`, creates `branch` from that
    /// start point; otherwise checks out the existing `branch`.
    #[instrument(skip_all, fields(path = %path.display(), branch))]
    pub fn add_worktree(&self, path: &Path, branch: &str, new_from: Option<&str>) -> Result<()> {
        let path_arg = path.to_string_lossy();
        match new_from {
            Some(start) => {
                self.run_checked(&["worktree", "add", "--quiet", "-b", branch, &path_arg, start])?
            }
            None => self.run_checked(&["worktree", "add", "--quiet", &path_arg, branch])?,
        };
        Ok(())
    }

    #[instrument(skip_all, fields(path = %path.display(), force))]
    pub fn remove_worktree(&self, path: &Path, force: bool) -> Result<()> {
        let path_arg = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_arg);
        self.run_checked(&args)?;
        Ok(())
    }

    pub fn prune_worktrees(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    /// Read a local config value; `None` when unset.
    pub fn config_get(&self, key: &str) -> Result<Option<String>> {
        let args = ["config", "--local", "--get", key];
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            Some(1) => Ok(None),
            _ => Err(self.failure(&args, &output)),
        }
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.run_checked(&["config", "--local", key, value])?;
        Ok(())
    }

    /// Unset a local config value; unsetting a missing key is not an error.
    pub fn config_unset(&self, key: &str) -> Result<()> {
        let args = ["config", "--local", "--unset", key];
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) | Some(5) => Ok(()),
            _ => Err(self.failure(&args, &output)),
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(self.failure(args, &output));
        }
        Ok(output)
    }

    fn failure(&self, args: &[&str], output: &Output) -> anyhow::Error {
        let stderr = String::from_utf8_lossy(&output.stderr);
        OrchestratorError::external(format!("git {}", args.join(" ")), stderr.trim()).into()
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| {
                OrchestratorError::external(format!("git {}", args.join(" ")), format!("spawn: {e}"))
                    .into()
            })
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
