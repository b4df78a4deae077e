//! Command surface: one method per CLI command.
//!
//! [`Orchestrator`] owns the repository root, the loaded configuration and the
//! agent, and wires them into the generator, cycle runner and project tools.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::generation::GenerationState;
use crate::core::traceability::CoverageReport;
use crate::cycle::{
    CycleContext, CycleReport, MeasureOutcome, StitchOutcome, measure, measure_prompt, stitch,
};
use crate::generator::{GenerationInfo, Generator, ResumeOutcome, StopOutcome};
use crate::io::agent::Agent;
use crate::io::config::OrchestratorConfig;
use crate::io::scratch::ScratchPaths;
use crate::io::tools::{
    ProjectStats, beads_init, beads_reset, clean, collect_stats, export_credentials, run_tool,
};

/// Everything `reset` removed.
#[derive(Debug, Clone, Default)]
pub struct ResetSummary {
    pub scratch_removed: bool,
    pub generations_removed: Vec<String>,
    pub beads_removed: bool,
}

pub struct Orchestrator<A: Agent> {
    root: PathBuf,
    config: OrchestratorConfig,
    agent: A,
}

impl<A: Agent> Orchestrator<A> {
    pub fn new(root: impl Into<PathBuf>, config: OrchestratorConfig, agent: A) -> Self {
        Self {
            root: root.into(),
            config,
            agent,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn generator(&self) -> Generator<'_, A> {
        Generator::new(&self.root, &self.config, &self.agent)
    }

    fn scratch(&self) -> ScratchPaths {
        ScratchPaths::new(&self.root, &self.config.scratch_dir)
    }

    /// Initialize the issue tracker and the scratch directory.
    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        beads_init(&self.root, &self.config.beads, &self.config.tools)?;
        self.scratch().ensure()?;
        info!("project initialized");
        Ok(())
    }

    /// Remove scratch state, every non-merged generation and the tracker.
    #[instrument(skip_all)]
    pub fn reset(&self) -> Result<ResetSummary> {
        let scratch_removed = self.cobbler_reset()?;
        let generations_removed = self.generator().reset(None, false)?;
        let beads_removed = self.beads_reset()?;
        Ok(ResetSummary {
            scratch_removed,
            generations_removed,
            beads_removed,
        })
    }

    pub fn stats(&self) -> Result<ProjectStats> {
        collect_stats(&self.root, &self.config.project)
    }

    /// Each tool returns its captured stdout.
    pub fn build(&self) -> Result<String> {
        self.tool("build", &self.config.tools.build)
    }

    pub fn lint(&self) -> Result<String> {
        self.tool("lint", &self.config.tools.lint)
    }

    pub fn install(&self) -> Result<String> {
        self.tool("install", &self.config.tools.install)
    }

    fn tool(&self, label: &str, argv: &[String]) -> Result<String> {
        let output = run_tool(label, argv, &self.root, &self.config.tools, None)?;
        Ok(output.stdout_lossy())
    }

    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        clean(&self.root, &self.config.project)
    }

    pub fn credentials(&self) -> Result<PathBuf> {
        export_credentials(&self.root, &self.config.credentials)
    }

    /// Where standalone measure/stitch work: the current generation's
    /// worktree when it has one, otherwise the repository root.
    fn standalone_target(&self) -> Result<(PathBuf, Option<String>, u32)> {
        let generator = self.generator();
        if let Some(name) = generator.current()?
            && generator.worktree_present(&name)
        {
            let cycle = generator.state_of(&name)?.cycle() + 1;
            return Ok((generator.worktree_path(&name), Some(name), cycle));
        }
        Ok((self.root.clone(), None, 0))
    }

    pub fn measure(&self) -> Result<MeasureOutcome> {
        let (workdir, generation, cycle) = self.standalone_target()?;
        let ctx = CycleContext {
            workdir: &workdir,
            generation: generation.as_deref(),
            cycle,
            config: &self.config,
        };
        measure(&ctx, &self.agent)
    }

    /// Render the measure prompt without invoking the agent.
    pub fn measure_prompt(&self) -> Result<(String, CoverageReport)> {
        let (workdir, generation, cycle) = self.standalone_target()?;
        let ctx = CycleContext {
            workdir: &workdir,
            generation: generation.as_deref(),
            cycle,
            config: &self.config,
        };
        measure_prompt(&ctx)
    }

    pub fn stitch(&self) -> Result<StitchOutcome> {
        let (workdir, generation, cycle) = self.standalone_target()?;
        let ctx = CycleContext {
            workdir: &workdir,
            generation: generation.as_deref(),
            cycle,
            config: &self.config,
        };
        stitch(&ctx, &self.agent)
    }

    pub fn generator_start(&self) -> Result<String> {
        self.generator().start()
    }

    /// `None` uses the configured default cycle count.
    pub fn generator_run(&self, cycles: Option<u32>) -> Result<Vec<CycleReport>> {
        self.generator().run(self.cycles(cycles))
    }

    pub fn generator_resume(
        &self,
        name: Option<&str>,
        cycles: Option<u32>,
    ) -> Result<ResumeOutcome> {
        self.generator().resume(name, self.cycles(cycles))
    }

    pub fn generator_stop(&self, name: Option<&str>) -> Result<StopOutcome> {
        self.generator().stop(name)
    }

    pub fn generator_list(&self) -> Result<Vec<GenerationInfo>> {
        self.generator().list()
    }

    pub fn generator_switch(&self, target: &str) -> Result<GenerationState> {
        self.generator().switch(target)
    }

    pub fn generator_reset(&self, name: Option<&str>, force: bool) -> Result<Vec<String>> {
        self.generator().reset(name, force)
    }

    fn cycles(&self, cycles: Option<u32>) -> u32 {
        cycles.unwrap_or(self.config.generation.cycles)
    }

    pub fn beads_init(&self) -> Result<()> {
        beads_init(&self.root, &self.config.beads, &self.config.tools)
    }

    pub fn beads_reset(&self) -> Result<bool> {
        beads_reset(&self.root, &self.config.beads)
    }

    pub fn cobbler_reset(&self) -> Result<bool> {
        self.scratch().remove()
    }
}
