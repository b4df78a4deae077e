//! Prompt rendering for the measure and stitch agents.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::tasks::{ProposedTask, TaskList, TaskStatus};
use crate::core::traceability::CoverageReport;
use crate::io::specs::LoadError;

const MEASURE_TEMPLATE: &str = include_str!("prompts/measure.md");
const STITCH_TEMPLATE: &str = include_str!("prompts/stitch.md");

/// Inputs to the measure prompt.
#[derive(Debug, Clone)]
pub struct MeasureInputs<'a> {
    /// `None` when measuring outside a generation.
    pub generation: Option<&'a str>,
    pub cycle: u32,
    pub report: &'a CoverageReport,
    pub load_errors: &'a [LoadError],
    /// Task file path relative to the agent's working directory.
    pub tasks_path: &'a str,
    pub schema_path: &'a str,
    pub max_tasks: u32,
}

/// Inputs to the stitch prompt.
#[derive(Debug, Clone)]
pub struct StitchInputs<'a> {
    pub generation: Option<&'a str>,
    pub cycle: u32,
    pub task: &'a ProposedTask,
    pub tasks: &'a TaskList,
    /// Verification command that runs after stitch, if any.
    pub verify: &'a [String],
}

#[derive(Debug, Serialize)]
struct TaskContext<'a> {
    id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    depends_on: &'a [String],
}

impl<'a> TaskContext<'a> {
    fn from_task(task: &'a ProposedTask) -> Self {
        Self {
            id: &task.id,
            title: &task.title,
            description: Some(task.description.trim()).filter(|d| !d.is_empty()),
            depends_on: &task.depends_on,
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("measure", MEASURE_TEMPLATE)?;
        env.add_template("stitch", STITCH_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render_measure(&self, input: &MeasureInputs<'_>) -> Result<String> {
        let template = self.env.get_template("measure")?;
        let load_errors: Vec<String> = input
            .load_errors
            .iter()
            .map(|e| format!("{}: {}", e.path.display(), e.message))
            .collect();
        let rendered = template.render(context! {
            generation => input.generation,
            cycle => input.cycle,
            report => input.report,
            gap_count => input.report.gap_count(),
            load_errors => load_errors,
            tasks_path => input.tasks_path,
            schema_path => input.schema_path,
            max_tasks => input.max_tasks,
        })?;
        Ok(rendered)
    }

    fn render_stitch(&self, input: &StitchInputs<'_>) -> Result<String> {
        let template = self.env.get_template("stitch")?;
        let done: Vec<TaskContext<'_>> = input
            .tasks
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(TaskContext::from_task)
            .collect();
        let verify = (!input.verify.is_empty()).then(|| input.verify.join(" "));
        let rendered = template.render(context! {
            generation => input.generation,
            cycle => input.cycle,
            task => TaskContext::from_task(input.task),
            done => done,
            verify => verify,
        })?;
        Ok(rendered)
    }
}

pub fn render_measure_prompt(input: &MeasureInputs<'_>) -> Result<String> {
    PromptEngine::new()?.render_measure(input)
}

pub fn render_stitch_prompt(input: &StitchInputs<'_>) -> Result<String> {
    PromptEngine::new()?.render_stitch(input)
}
