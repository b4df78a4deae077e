//! Task list load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::tasks::{TaskList, validate_task_list};
use crate::error::OrchestratorError;
use crate::io::scratch::TASKS_SCHEMA;

/// Load and validate the task list the measure agent wrote.
///
/// A missing file is `NotFound`; anything structurally wrong is `Parse`.
pub fn load_task_list(path: &Path) -> Result<TaskList> {
    if !path.exists() {
        return Err(OrchestratorError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tasks {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|err| OrchestratorError::parse(path, err.to_string()))?;
    validate_schema(path, &value)?;
    let list: TaskList = serde_json::from_value(value)
        .map_err(|err| OrchestratorError::parse(path, err.to_string()))?;
    let errors = validate_task_list(&list);
    if !errors.is_empty() {
        return Err(OrchestratorError::parse(path, errors.join("; ")).into());
    }
    Ok(list)
}

pub fn write_task_list(path: &Path, list: &TaskList) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(list)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write tasks {}", path.display()))
}

fn validate_schema(path: &Path, tasks: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(TASKS_SCHEMA).context("parse tasks schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid tasks schema: {}", err))?;
    if !compiled.is_valid(tasks) {
        let messages = compiled
            .iter_errors(tasks)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OrchestratorError::parse(
            path,
            format!("schema validation failed: {}", messages.join("; ")),
        )
        .into());
    }
    Ok(())
}
