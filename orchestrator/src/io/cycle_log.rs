//! Per-cycle artifacts under `<scratch>/cycles/<k>/`.
//!
//! These are product output: prompts, agent logs, the task list snapshot and a
//! `meta.json` summary are always written, independent of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::git_output::DiffStat;
use crate::core::tasks::TaskList;
use crate::io::scratch::ScratchPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    Committed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleMeta {
    pub generation: Option<String>,
    pub cycle: u32,
    pub outcome: CycleOutcome,
    pub tasks_proposed: usize,
    pub tasks_completed: Vec<String>,
    pub diffstat: Option<DiffStat>,
    pub commit: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CyclePaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub measure_prompt_path: PathBuf,
    pub measure_log_path: PathBuf,
    pub measure_stream_path: PathBuf,
    pub tasks_snapshot_path: PathBuf,
    pub verify_log_path: PathBuf,
}

impl CyclePaths {
    pub fn new(scratch: &ScratchPaths, cycle: u32) -> Self {
        let dir = scratch.cycle_dir(cycle);
        Self {
            meta_path: dir.join("meta.json"),
            measure_prompt_path: dir.join("measure.prompt.md"),
            measure_log_path: dir.join("measure.log"),
            measure_stream_path: dir.join("measure.stream.log"),
            tasks_snapshot_path: dir.join("tasks.json"),
            verify_log_path: dir.join("verify.log"),
            dir,
        }
    }

    pub fn stitch_prompt_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("stitch-{task_id}.prompt.md"))
    }

    pub fn stitch_log_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("stitch-{task_id}.log"))
    }

    pub fn stitch_stream_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("stitch-{task_id}.stream.log"))
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create cycle dir {}", self.dir.display()))
    }
}

pub fn write_meta(paths: &CyclePaths, meta: &CycleMeta) -> Result<()> {
    paths.create()?;
    write_json(&paths.meta_path, meta)
}

pub fn write_tasks_snapshot(paths: &CyclePaths, tasks: &TaskList) -> Result<()> {
    paths.create()?;
    write_json(&paths.tasks_snapshot_path, tasks)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
