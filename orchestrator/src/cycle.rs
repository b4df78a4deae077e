//! One measure → stitch → commit cycle inside a working directory.
//!
//! A cycle is atomic from the generation's point of view: either the final
//! commit lands (carrying the `active` checkpoint for the new cycle number) or
//! nothing is committed and the caller decides how to record the failure.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::generation::{Checkpoint, CheckpointState};
use crate::core::git_output::DiffStat;
use crate::core::tasks::{TaskList, blocked_by_unknown, next_ready_task};
use crate::core::traceability::{CoverageReport, TraceabilityGraph};
use crate::io::agent::{Agent, AgentPhase, AgentRequest};
use crate::io::config::OrchestratorConfig;
use crate::io::cycle_log::{
    CycleMeta, CycleOutcome, CyclePaths, write_meta, write_tasks_snapshot, write_text,
};
use crate::io::git::Git;
use crate::io::prompt::{MeasureInputs, StitchInputs, render_measure_prompt, render_stitch_prompt};
use crate::io::scratch::ScratchPaths;
use crate::io::specs::load_spec_set;
use crate::io::task_store::{load_task_list, write_task_list};
use crate::io::tools::run_tool;

/// Where and as what a cycle runs.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    /// Generation worktree, or the repository root outside a generation.
    pub workdir: &'a Path,
    pub generation: Option<&'a str>,
    /// Number of the cycle being run (last committed cycle + 1).
    pub cycle: u32,
    pub config: &'a OrchestratorConfig,
}

impl CycleContext<'_> {
    fn scratch(&self) -> ScratchPaths {
        ScratchPaths::new(self.workdir, &self.config.scratch_dir)
    }

    fn agent_request(
        &self,
        phase: AgentPhase,
        prompt: String,
        log: &Path,
        stream: &Path,
    ) -> AgentRequest {
        AgentRequest {
            phase,
            workdir: self.workdir.to_path_buf(),
            prompt,
            log_path: log.to_path_buf(),
            stream_path: Some(stream.to_path_buf()),
            timeout: self.config.agent.timeout(),
            output_limit_bytes: self.config.agent.output_limit_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeasureOutcome {
    pub report: CoverageReport,
    pub load_errors: usize,
    pub tasks: TaskList,
}

#[derive(Debug, Clone, Default)]
pub struct StitchOutcome {
    pub completed: Vec<String>,
    pub remaining_open: usize,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub generation: String,
    pub cycle: u32,
    pub tasks_proposed: usize,
    pub tasks_completed: Vec<String>,
    pub diffstat: DiffStat,
    pub commit: String,
}

/// Load the specs under `workdir`, build the graph and render the measure prompt.
pub fn measure_prompt(ctx: &CycleContext<'_>) -> Result<(String, CoverageReport)> {
    let (prompt, report, _) = prepare_measure(ctx)?;
    Ok((prompt, report))
}

fn prepare_measure(ctx: &CycleContext<'_>) -> Result<(String, CoverageReport, usize)> {
    let specs = &ctx.config.specs;
    let set = load_spec_set(
        &ctx.workdir.join(&specs.requirements_dir),
        &ctx.workdir.join(&specs.use_cases_dir),
        &ctx.workdir.join(&specs.test_suites_dir),
    )?;
    let report = TraceabilityGraph::build(&set.requirements, &set.use_cases, &set.test_suites)
        .report();
    let tasks_path = format!("{}/tasks.json", ctx.config.scratch_dir);
    let schema_path = format!("{}/tasks.schema.json", ctx.config.scratch_dir);
    let prompt = render_measure_prompt(&MeasureInputs {
        generation: ctx.generation,
        cycle: ctx.cycle,
        report: &report,
        load_errors: &set.load_errors,
        tasks_path: &tasks_path,
        schema_path: &schema_path,
        max_tasks: ctx.config.generation.max_tasks_per_cycle,
    })?;
    Ok((prompt, report, set.load_errors.len()))
}

/// Ask the agent for a task list based on the current coverage gaps.
#[instrument(skip_all, fields(cycle = ctx.cycle))]
pub fn measure<A: Agent>(ctx: &CycleContext<'_>, agent: &A) -> Result<MeasureOutcome> {
    let scratch = ctx.scratch();
    scratch.ensure()?;
    let paths = CyclePaths::new(&scratch, ctx.cycle);
    paths.create()?;
    if scratch.tasks_path.exists() {
        std::fs::remove_file(&scratch.tasks_path)
            .with_context(|| format!("remove stale {}", scratch.tasks_path.display()))?;
    }

    let (prompt, report, load_errors) = prepare_measure(ctx)?;
    write_text(&paths.measure_prompt_path, &prompt)?;
    info!(gaps = report.gap_count(), "measuring");

    let request = ctx.agent_request(
        AgentPhase::Measure,
        prompt,
        &paths.measure_log_path,
        &paths.measure_stream_path,
    );
    agent.invoke(&request)?;

    let tasks = load_task_list(&scratch.tasks_path).context("measure agent task list")?;
    write_tasks_snapshot(&paths, &tasks)?;
    for task in blocked_by_unknown(&tasks) {
        warn!(task = %task.id, "task depends on an unknown task and will never be ready");
    }
    debug!(tasks = tasks.tasks.len(), "measure complete");
    Ok(MeasureOutcome {
        report,
        load_errors,
        tasks,
    })
}

/// Work through ready tasks from the scratch task list, one agent call each.
#[instrument(skip_all, fields(cycle = ctx.cycle))]
pub fn stitch<A: Agent>(ctx: &CycleContext<'_>, agent: &A) -> Result<StitchOutcome> {
    let scratch = ctx.scratch();
    let paths = CyclePaths::new(&scratch, ctx.cycle);
    paths.create()?;
    let mut tasks = load_task_list(&scratch.tasks_path).context("load task list for stitch")?;
    let limit = ctx.config.generation.max_tasks_per_cycle as usize;
    let mut outcome = StitchOutcome::default();

    while outcome.completed.len() < limit {
        let Some(task) = next_ready_task(&tasks).cloned() else {
            debug!("no ready task");
            break;
        };
        info!(task = %task.id, "stitching");
        let prompt = render_stitch_prompt(&StitchInputs {
            generation: ctx.generation,
            cycle: ctx.cycle,
            task: &task,
            tasks: &tasks,
            verify: &ctx.config.generation.verify,
        })?;
        write_text(&paths.stitch_prompt_path(&task.id), &prompt)?;
        let request = ctx.agent_request(
            AgentPhase::Stitch,
            prompt,
            &paths.stitch_log_path(&task.id),
            &paths.stitch_stream_path(&task.id),
        );
        agent
            .invoke(&request)
            .with_context(|| format!("stitch task {}", task.id))?;

        if !tasks.mark_done(&task.id) {
            return Err(anyhow!("task {} vanished from the task list", task.id));
        }
        write_task_list(&scratch.tasks_path, &tasks)?;
        outcome.completed.push(task.id);
    }

    if !ctx.config.generation.verify.is_empty() {
        run_tool(
            "verify",
            &ctx.config.generation.verify,
            ctx.workdir,
            &ctx.config.tools,
            Some(&paths.verify_log_path),
        )?;
    }

    write_tasks_snapshot(&paths, &tasks)?;
    outcome.remaining_open = tasks.open_count();
    Ok(outcome)
}

/// Run measure, stitch and the checkpoint commit for `ctx.generation`.
///
/// `meta.json` is written for failed cycles too. On error nothing has been
/// committed; the worktree may hold partial changes.
#[instrument(skip_all, fields(generation = ctx.generation, cycle = ctx.cycle))]
pub fn run_cycle<A: Agent>(ctx: &CycleContext<'_>, agent: &A) -> Result<CycleReport> {
    let generation = ctx
        .generation
        .ok_or_else(|| anyhow!("a committed cycle needs a generation"))?;
    let started = Instant::now();
    let started_at = Local::now().to_rfc3339();
    let git = Git::new(ctx.workdir);

    let mut proposed = 0;
    let mut completed = Vec::new();
    let attempt = (|| -> Result<CycleReport> {
        let measured = measure(ctx, agent)?;
        proposed = measured.tasks.tasks.len();
        let stitched = stitch(ctx, agent)?;
        completed = stitched.completed.clone();

        git.add_all()?;
        let diffstat = git.diff_cached_shortstat()?;
        let checkpoint = Checkpoint::new(generation, ctx.cycle, CheckpointState::Active);
        let message = checkpoint.commit_message(
            &format!("{generation}: cycle {}", ctx.cycle),
            Some(&commit_body(&measured.tasks, &stitched.completed, &diffstat)),
        );
        let commit = git.commit(&message, true)?;
        Ok(CycleReport {
            generation: generation.to_string(),
            cycle: ctx.cycle,
            tasks_proposed: proposed,
            tasks_completed: stitched.completed,
            diffstat,
            commit,
        })
    })();

    let meta = CycleMeta {
        generation: Some(generation.to_string()),
        cycle: ctx.cycle,
        outcome: if attempt.is_ok() {
            CycleOutcome::Committed
        } else {
            CycleOutcome::Failed
        },
        tasks_proposed: proposed,
        tasks_completed: completed,
        diffstat: attempt.as_ref().ok().map(|r| r.diffstat),
        commit: attempt.as_ref().ok().map(|r| r.commit.clone()),
        error: attempt.as_ref().err().map(|e| format!("{e:#}")),
        started_at,
        ended_at: Local::now().to_rfc3339(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    let paths = CyclePaths::new(&ctx.scratch(), ctx.cycle);
    if let Err(err) = write_meta(&paths, &meta) {
        warn!(err = %err, "failed to write cycle meta");
    }

    let report = attempt?;
    info!(commit = %report.commit, diff = %report.diffstat.summary(), "cycle committed");
    Ok(report)
}

fn commit_body(tasks: &TaskList, completed: &[String], diffstat: &DiffStat) -> String {
    let mut body = String::new();
    if completed.is_empty() {
        body.push_str("No tasks completed.\n");
    } else {
        body.push_str("Tasks:\n");
        for id in completed {
            let title = tasks
                .tasks
                .iter()
                .find(|t| &t.id == id)
                .map(|t| t.title.as_str())
                .unwrap_or_default();
            body.push_str(&format!("- {id}: {title}\n"));
        }
    }
    body.push('\n');
    body.push_str(&diffstat.summary());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::{ProposedTask, TaskStatus};

    #[test]
    fn commit_body_lists_completed_tasks_and_diffstat() {
        let tasks = TaskList {
            tasks: vec![ProposedTask {
                id: "t1".to_string(),
                title: "Add suite".to_string(),
                description: String::new(),
                depends_on: Vec::new(),
                status: TaskStatus::Done,
            }],
        };
        let diff = DiffStat {
            files_changed: 2,
            insertions: 10,
            deletions: 1,
        };
        let body = commit_body(&tasks, &["t1".to_string()], &diff);
        assert_eq!(body, "Tasks:\n- t1: Add suite\n\n2 files changed, +10 -1");
    }

    #[test]
    fn commit_body_without_tasks() {
        let body = commit_body(&TaskList::default(), &[], &DiffStat::default());
        assert!(body.starts_with("No tasks completed."));
    }
}
