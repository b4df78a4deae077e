//! Scratch ("cobbler") directory layout.
//!
//! The scratch directory lives inside the repository root or a generation
//! worktree and holds prompts, the task list, its schema and per-cycle logs.
//! It ignores itself so nothing under it is ever committed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

const SCRATCH_GITIGNORE: &str = "*\n";
pub(crate) const TASKS_SCHEMA: &str = include_str!("../schemas/tasks.schema.json");

/// Canonical paths within the scratch directory of one working directory.
#[derive(Debug, Clone)]
pub struct ScratchPaths {
    pub workdir: PathBuf,
    pub dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub tasks_path: PathBuf,
    pub tasks_schema_path: PathBuf,
    pub cycles_dir: PathBuf,
}

impl ScratchPaths {
    pub fn new(workdir: impl Into<PathBuf>, scratch_dir: &str) -> Self {
        let workdir = workdir.into();
        let dir = workdir.join(scratch_dir);
        Self {
            workdir,
            gitignore_path: dir.join(".gitignore"),
            tasks_path: dir.join("tasks.json"),
            tasks_schema_path: dir.join("tasks.schema.json"),
            cycles_dir: dir.join("cycles"),
            dir,
        }
    }

    pub fn cycle_dir(&self, cycle: u32) -> PathBuf {
        self.cycles_dir.join(cycle.to_string())
    }

    /// Create the directory, its `.gitignore` and the task schema. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create directory {}", self.dir.display()))?;
        write_file(&self.gitignore_path, SCRATCH_GITIGNORE)?;
        write_file(&self.tasks_schema_path, TASKS_SCHEMA)?;
        Ok(())
    }

    /// Delete the directory and everything in it. Missing is fine.
    pub fn remove(&self) -> Result<bool> {
        remove_dir_if_exists(&self.dir)
    }
}

/// Remove a directory tree; returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        debug!(path = %path.display(), "nothing to remove");
        return Ok(false);
    }
    fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
    Ok(true)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ScratchPaths::new(temp.path(), ".cobbler");
        assert!(paths.tasks_path.ends_with(".cobbler/tasks.json"));
        assert!(paths.cycle_dir(3).ends_with(".cobbler/cycles/3"));
    }

    #[test]
    fn ensure_is_idempotent_and_remove_cleans_up() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ScratchPaths::new(temp.path(), ".cobbler");
        paths.ensure().expect("ensure");
        paths.ensure().expect("ensure again");
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            "*\n"
        );
        assert!(paths.tasks_schema_path.is_file());

        assert!(paths.remove().expect("remove"));
        assert!(!paths.dir.exists());
        assert!(!paths.remove().expect("remove missing"));
    }
}
