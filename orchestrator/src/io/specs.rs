//! Loading requirement, use-case and test-suite documents from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::ids::extract_id;
use crate::core::types::{TestSuite, UseCase};
use crate::error::OrchestratorError;

/// A document that could not be loaded, kept so the measure prompt can report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

/// Everything the traceability graph is built from.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    /// Requirement ids derived from file names in the requirements directory.
    pub requirements: Vec<String>,
    pub use_cases: Vec<UseCase>,
    pub test_suites: Vec<TestSuite>,
    pub load_errors: Vec<LoadError>,
}

pub fn load_use_case(path: &Path) -> Result<UseCase, OrchestratorError> {
    load_yaml(path)
}

pub fn load_test_suite(path: &Path) -> Result<TestSuite, OrchestratorError> {
    load_yaml(path)
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, OrchestratorError> {
    let contents = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => OrchestratorError::NotFound {
            path: path.to_path_buf(),
        },
        _ => OrchestratorError::parse(path, err.to_string()),
    })?;
    serde_yaml::from_str(&contents).map_err(|err| OrchestratorError::parse(path, err.to_string()))
}

/// Load every document under the three spec directories.
///
/// Missing directories count as empty. A malformed document is recorded in
/// `load_errors` and skipped; only failing to read a directory aborts.
#[instrument(skip_all)]
pub fn load_spec_set(
    requirements_dir: &Path,
    use_cases_dir: &Path,
    test_suites_dir: &Path,
) -> Result<SpecSet> {
    let mut set = SpecSet {
        requirements: list_documents(requirements_dir, &["yaml", "yml", "md"])?
            .iter()
            .map(|path| extract_id(&path.to_string_lossy()))
            .collect(),
        ..SpecSet::default()
    };

    for path in list_documents(use_cases_dir, &["yaml", "yml"])? {
        match load_use_case(&path) {
            Ok(uc) => set.use_cases.push(uc),
            Err(err) => set.record(&path, err),
        }
    }
    for path in list_documents(test_suites_dir, &["yaml", "yml"])? {
        match load_test_suite(&path) {
            Ok(suite) => set.test_suites.push(suite),
            Err(err) => set.record(&path, err),
        }
    }

    debug!(
        requirements = set.requirements.len(),
        use_cases = set.use_cases.len(),
        test_suites = set.test_suites.len(),
        load_errors = set.load_errors.len(),
        "spec set loaded"
    );
    Ok(set)
}

impl SpecSet {
    fn record(&mut self, path: &Path, err: OrchestratorError) {
        warn!(path = %path.display(), err = %err, "skipping spec document");
        self.load_errors.push(LoadError {
            path: path.to_path_buf(),
            message: err.to_string(),
        });
    }
}

/// Files directly under `dir` with one of `extensions`, sorted by file name.
fn list_documents(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "spec directory missing");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err).with_context(|| format!("read dir {}", dir.display())),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if matches && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}
