//! Generation lifecycle: start, run, resume, switch, stop, reset, list.
//!
//! Each generation is a `generation-<date>.<seq>` branch checked out in its own
//! worktree under `<worktree_dir>/<name>`. Nothing is persisted besides git
//! itself: state comes from the checkpoint trailers on the branch tip combined
//! with what the repository shows (see [`derive_state`]), and the current
//! generation is the `generation.current` key in the repository's local config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::generation::{
    BRANCH_GLOB, Checkpoint, CheckpointState, GenerationName, GenerationState, Observation,
    derive_state,
};
use crate::cycle::{CycleContext, CycleReport, run_cycle};
use crate::error::OrchestratorError;
use crate::io::agent::Agent;
use crate::io::config::OrchestratorConfig;
use crate::io::git::Git;
use crate::io::scratch::{ScratchPaths, remove_dir_if_exists};

/// Local git config key naming the current generation.
pub const CURRENT_KEY: &str = "generation.current";

const WORKTREES_GITIGNORE: &str = "*\n";

/// One row of `generator list`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInfo {
    pub name: String,
    pub state: GenerationState,
    pub head: String,
    pub last_commit_at: String,
    pub worktree: Option<PathBuf>,
    pub is_current: bool,
}

/// Result of `resume`.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    /// The generation was already active; nothing ran.
    AlreadyActive { name: String, cycle: u32 },
    /// Recovered from `from`, then ran cycles.
    Resumed {
        name: String,
        from: GenerationState,
        cycles: Vec<CycleReport>,
    },
}

#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub name: String,
    pub cycle: u32,
    pub base_branch: String,
    pub merge_commit: String,
}

/// Lifecycle operations over the generations of one repository.
pub struct Generator<'a, A: Agent> {
    root: &'a Path,
    config: &'a OrchestratorConfig,
    agent: &'a A,
    git: Git,
}

impl<'a, A: Agent> Generator<'a, A> {
    pub fn new(root: &'a Path, config: &'a OrchestratorConfig, agent: &'a A) -> Self {
        Self {
            root,
            config,
            agent,
            git: Git::new(root),
        }
    }

    pub fn worktree_path(&self, name: &str) -> PathBuf {
        self.config.worktree_root(self.root).join(name)
    }

    fn base(&self) -> &str {
        &self.config.generation.base_branch
    }

    pub fn current(&self) -> Result<Option<String>> {
        self.git.config_get(CURRENT_KEY)
    }

    /// Existing generation branch names, oldest first.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<GenerationName> = self
            .git
            .list_branches(BRANCH_GLOB)?
            .iter()
            .filter_map(|branch| GenerationName::parse(branch))
            .collect();
        names.sort();
        Ok(names.iter().map(ToString::to_string).collect())
    }

    pub fn worktree_present(&self, name: &str) -> bool {
        self.worktree_path(name).join(".git").exists()
    }

    pub fn observe(&self, name: &str) -> Result<Observation> {
        let tip = self.git.last_commit(name)?;
        let worktree_present = self.worktree_present(name);
        let worktree_dirty = worktree_present && self.git.at(self.worktree_path(name)).is_dirty()?;
        Ok(Observation {
            name: name.to_string(),
            checkpoint: Checkpoint::parse(&tip.message),
            worktree_present,
            worktree_dirty,
            merged_into_base: self.git.is_ancestor(name, self.base())?,
        })
    }

    pub fn state_of(&self, name: &str) -> Result<GenerationState> {
        Ok(derive_state(&self.observe(name)?))
    }

    fn require_existing(&self, name: &str) -> Result<()> {
        if GenerationName::parse(name).is_none() || !self.git.branch_exists(name)? {
            return Err(
                OrchestratorError::NoRecoverableState(format!("unknown generation {name}")).into(),
            );
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn list(&self) -> Result<Vec<GenerationInfo>> {
        let current = self.current()?;
        let mut rows = Vec::new();
        for name in self.names()? {
            let tip = self.git.last_commit(&name)?;
            let state = self.state_of(&name)?;
            rows.push(GenerationInfo {
                worktree: self
                    .worktree_present(&name)
                    .then(|| self.worktree_path(&name)),
                is_current: current.as_deref() == Some(name.as_str()),
                head: tip.sha,
                last_commit_at: tip.committed_at,
                state,
                name,
            });
        }
        Ok(rows)
    }

    /// Create a new generation from the base branch and make it current.
    #[instrument(skip_all)]
    pub fn start(&self) -> Result<String> {
        let date = Local::now().format("%Y%m%d").to_string();
        let existing = self.git.list_branches(BRANCH_GLOB)?;
        let name = GenerationName::next_for_date(&date, &existing).to_string();
        if self.git.branch_exists(&name)? {
            return Err(OrchestratorError::GenerationExists(name).into());
        }

        if let Some(previous) = self.current()? {
            self.leave(&previous)?;
        }

        self.ensure_worktree_root()?;
        let path = self.worktree_path(&name);
        self.git.add_worktree(&path, &name, Some(self.base()))?;
        ScratchPaths::new(&path, &self.config.scratch_dir).ensure()?;

        let checkpoint = Checkpoint::new(&name, 0, CheckpointState::Active);
        let message =
            checkpoint.commit_message(&format!("{name}: start from {}", self.base()), None);
        self.git.at(&path).commit(&message, true)?;
        self.git.config_set(CURRENT_KEY, &name)?;
        info!(generation = %name, "generation started");
        Ok(name)
    }

    /// Run `cycles` cycles in the current generation.
    #[instrument(skip_all, fields(cycles))]
    pub fn run(&self, cycles: u32) -> Result<Vec<CycleReport>> {
        let name = self.current()?.ok_or_else(|| {
            OrchestratorError::NoRecoverableState(
                "no current generation (start or resume one first)".to_string(),
            )
        })?;
        let state = self.state_of(&name)?;
        let GenerationState::Active { cycle } = state else {
            return Err(OrchestratorError::InvalidState {
                name,
                state: state.to_string(),
                operation: "run",
            }
            .into());
        };
        self.run_cycles(&name, cycle, cycles)
    }

    fn run_cycles(&self, name: &str, mut cycle: u32, cycles: u32) -> Result<Vec<CycleReport>> {
        let workdir = self.worktree_path(name);
        let mut reports = Vec::new();
        for _ in 0..cycles {
            let ctx = CycleContext {
                workdir: &workdir,
                generation: Some(name),
                cycle: cycle + 1,
                config: self.config,
            };
            match run_cycle(&ctx, self.agent) {
                Ok(report) => {
                    cycle = report.cycle;
                    reports.push(report);
                }
                Err(err) => {
                    warn!(generation = %name, cycle, err = %format!("{err:#}"), "cycle failed");
                    self.suspend_after_failure(name, cycle, &err);
                    return Err(err.context(OrchestratorError::CycleSuspended {
                        name: name.to_string(),
                        cycle,
                        reason: "cycle failed, partial changes discarded".to_string(),
                    }));
                }
            }
        }
        Ok(reports)
    }

    /// Discard partial work and record a `suspended` checkpoint. Best effort:
    /// a generation that fails here still derives as suspended (interrupted).
    fn suspend_after_failure(&self, name: &str, cycle: u32, cause: &anyhow::Error) {
        let wt = self.git.at(self.worktree_path(name));
        let checkpoint = Checkpoint::new(name, cycle, CheckpointState::Suspended);
        let message = checkpoint.commit_message(
            &format!("{name}: suspended at cycle {cycle}"),
            Some(&format!("{cause:#}")),
        );
        let result = wt
            .reset_hard("HEAD")
            .and_then(|()| wt.clean_untracked())
            .and_then(|()| wt.commit(&message, true));
        if let Err(err) = result {
            warn!(generation = %name, err = %err, "could not record suspended checkpoint");
        }
    }

    /// Bring a suspended or completing generation back to active and run cycles.
    #[instrument(skip_all, fields(cycles))]
    pub fn resume(&self, name: Option<&str>, cycles: u32) -> Result<ResumeOutcome> {
        let name = self.resume_target(name)?;
        let state = self.state_of(&name)?;
        match state {
            GenerationState::Merged { .. } => Err(OrchestratorError::InvalidState {
                name,
                state: state.to_string(),
                operation: "resume",
            }
            .into()),
            GenerationState::Active { cycle } => {
                self.make_current(&name)?;
                info!(generation = %name, cycle, "already active");
                Ok(ResumeOutcome::AlreadyActive { name, cycle })
            }
            GenerationState::Suspended { .. } | GenerationState::Completing { .. } => {
                self.make_current(&name)?;
                let cycle = self.recover(&name, state)?;
                let cycles = self.run_cycles(&name, cycle, cycles)?;
                Ok(ResumeOutcome::Resumed {
                    name,
                    from: state,
                    cycles,
                })
            }
        }
    }

    /// Named generation, else the current one, else the newest recoverable.
    fn resume_target(&self, name: Option<&str>) -> Result<String> {
        if let Some(name) = name {
            self.require_existing(name)?;
            return Ok(name.to_string());
        }
        if let Some(current) = self.current()?
            && self.git.branch_exists(&current)?
            && !self.state_of(&current)?.is_merged()
        {
            return Ok(current);
        }
        for candidate in self.names()?.into_iter().rev() {
            if self.state_of(&candidate)?.is_recoverable() {
                return Ok(candidate);
            }
        }
        Err(OrchestratorError::NoRecoverableState(
            "no suspended or completing generation".to_string(),
        )
        .into())
    }

    /// Re-create a missing worktree, drop partial changes and commit an
    /// `active` checkpoint at the last committed cycle.
    fn recover(&self, name: &str, state: GenerationState) -> Result<u32> {
        let cycle = state.cycle();
        let path = self.ensure_worktree(name)?;
        let wt = self.git.at(&path);
        wt.reset_hard("HEAD")?;
        wt.clean_untracked()?;
        ScratchPaths::new(&path, &self.config.scratch_dir).ensure()?;
        let checkpoint = Checkpoint::new(name, cycle, CheckpointState::Active);
        let message = checkpoint.commit_message(
            &format!("{name}: resume at cycle {cycle}"),
            Some(&format!("Recovered from {state}.")),
        );
        wt.commit(&message, true)?;
        info!(generation = %name, cycle, from = %state, "generation recovered");
        Ok(cycle)
    }

    /// Make `target` current, leaving the previous current generation
    /// committed as `suspended`.
    #[instrument(skip_all, fields(target))]
    pub fn switch(&self, target: &str) -> Result<GenerationState> {
        self.require_existing(target)?;
        let state = self.state_of(target)?;
        if state.is_merged() {
            return Err(OrchestratorError::InvalidState {
                name: target.to_string(),
                state: state.to_string(),
                operation: "switch to",
            }
            .into());
        }
        self.ensure_worktree(target)?;
        self.make_current(target)?;
        self.state_of(target)
    }

    /// Point `generation.current` at `name`, checkpointing whatever was
    /// current before.
    fn make_current(&self, name: &str) -> Result<()> {
        if let Some(previous) = self.current()?
            && previous != name
        {
            self.leave(&previous)?;
        }
        self.git.config_set(CURRENT_KEY, name)
    }

    /// Commit outstanding work of `name` as a `suspended` checkpoint.
    ///
    /// Active generations are always checkpointed; any other non-merged
    /// generation only when its worktree has uncommitted changes. The recorded
    /// cycle is kept. A failing commit aborts the caller.
    fn leave(&self, name: &str) -> Result<()> {
        if !self.git.branch_exists(name)? {
            debug!(generation = %name, "current generation no longer exists");
            return Ok(());
        }
        let state = self.state_of(name)?;
        if state.is_merged() || !self.worktree_present(name) {
            return Ok(());
        }
        let wt = self.git.at(self.worktree_path(name));
        let needs_checkpoint =
            matches!(state, GenerationState::Active { .. }) || wt.is_dirty()?;
        if !needs_checkpoint {
            return Ok(());
        }
        let cycle = state.cycle();
        wt.add_all()?;
        let diffstat = wt.diff_cached_shortstat()?;
        let checkpoint = Checkpoint::new(name, cycle, CheckpointState::Suspended);
        let message = checkpoint.commit_message(
            &format!("{name}: suspended at cycle {cycle}"),
            Some(&format!("Switched away; {}.", diffstat.summary())),
        );
        wt.commit(&message, true)
            .with_context(|| format!("checkpoint {name} before switching"))?;
        info!(generation = %name, cycle, "generation suspended");
        Ok(())
    }

    /// Finish a generation: checkpoint as `completing`, merge into the base
    /// branch, remove the worktree and keep the branch.
    #[instrument(skip_all)]
    pub fn stop(&self, name: Option<&str>) -> Result<StopOutcome> {
        let name = match name {
            Some(name) => {
                self.require_existing(name)?;
                name.to_string()
            }
            None => self.current()?.ok_or_else(|| {
                OrchestratorError::NoRecoverableState("no current generation to stop".to_string())
            })?,
        };
        let state = self.state_of(&name)?;
        if state.is_merged() {
            return Err(OrchestratorError::InvalidState {
                name,
                state: state.to_string(),
                operation: "stop",
            }
            .into());
        }
        let cycle = state.cycle();

        let path = self.ensure_worktree(&name)?;
        let wt = self.git.at(&path);
        wt.reset_hard("HEAD")?;
        wt.clean_untracked()?;
        if !matches!(state, GenerationState::Completing { .. }) {
            let checkpoint = Checkpoint::new(&name, cycle, CheckpointState::Completing);
            let message =
                checkpoint.commit_message(&format!("{name}: completing at cycle {cycle}"), None);
            wt.commit(&message, true)?;
        }

        let base = self.base().to_string();
        self.git.checkout_branch(&base)?;
        if let Err(err) = self
            .git
            .merge_no_ff(&name, &format!("Merge {name} into {base}"))
        {
            self.git.merge_abort();
            return Err(err.context(format!(
                "merge {name} into {base} (generation left completing)"
            )));
        }
        let merge_commit = self.git.head_sha()?;

        self.git.remove_worktree(&path, true)?;
        if self.current()?.as_deref() == Some(name.as_str()) {
            self.git.config_unset(CURRENT_KEY)?;
        }
        info!(generation = %name, cycle, merge = %merge_commit, "generation merged");
        Ok(StopOutcome {
            name,
            cycle,
            base_branch: base,
            merge_commit,
        })
    }

    /// Destroy the named generation, or every non-merged one.
    ///
    /// Merged generations are skipped when resetting all; naming one needs
    /// `force`. A full reset also removes the configured generated directories.
    #[instrument(skip_all, fields(force))]
    pub fn reset(&self, name: Option<&str>, force: bool) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        match name {
            Some(name) => {
                self.require_existing(name)?;
                let state = self.state_of(name)?;
                if state.is_merged() && !force {
                    return Err(OrchestratorError::InvalidState {
                        name: name.to_string(),
                        state: state.to_string(),
                        operation: "reset",
                    }
                    .into());
                }
                self.remove_generation(name)?;
                removed.push(name.to_string());
            }
            None => {
                for name in self.names()? {
                    if self.state_of(&name)?.is_merged() {
                        debug!(generation = %name, "keeping merged generation");
                        continue;
                    }
                    self.remove_generation(&name)?;
                    removed.push(name);
                }
                for dir in &self.config.generation.generated_dirs {
                    remove_dir_if_exists(&self.root.join(dir))?;
                }
            }
        }
        self.git.prune_worktrees()?;
        if let Some(current) = self.current()?
            && (removed.contains(&current) || !self.git.branch_exists(&current)?)
        {
            self.git.config_unset(CURRENT_KEY)?;
        }
        Ok(removed)
    }

    fn remove_generation(&self, name: &str) -> Result<()> {
        let path = self.worktree_path(name);
        if self.worktree_present(name) {
            self.git.remove_worktree(&path, true)?;
        } else if path.exists() {
            remove_dir_if_exists(&path)?;
        }
        self.git.prune_worktrees()?;
        self.git.delete_branch(name, true)?;
        info!(generation = %name, "generation removed");
        Ok(())
    }

    /// Worktree path for `name`, re-adding it when missing.
    fn ensure_worktree(&self, name: &str) -> Result<PathBuf> {
        let path = self.worktree_path(name);
        if self.worktree_present(name) {
            return Ok(path);
        }
        self.ensure_worktree_root()?;
        self.git.prune_worktrees()?;
        if path.exists() {
            remove_dir_if_exists(&path)?;
        }
        self.git.add_worktree(&path, name, None)?;
        ScratchPaths::new(&path, &self.config.scratch_dir).ensure()?;
        info!(generation = %name, path = %path.display(), "worktree re-created");
        Ok(path)
    }

    /// The worktree parent ignores itself so the main worktree stays clean.
    fn ensure_worktree_root(&self) -> Result<()> {
        let dir = self.config.worktree_root(self.root);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let gitignore = dir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, WORKTREES_GITIGNORE)
                .with_context(|| format!("write {}", gitignore.display()))?;
        }
        Ok(())
    }
}
