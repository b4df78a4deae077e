//! Orchestrator configuration (`orchestrator.toml` by default, `-c` to override).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "orchestrator.toml";

/// Orchestrator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that work
/// for a repository laid out with `docs/specs/` and a `justfile`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scratch directory ("cobbler") for prompts, task lists and cycle logs.
    /// Relative to the repository root or generation worktree; never committed.
    pub scratch_dir: String,
    pub project: ProjectConfig,
    pub specs: SpecsConfig,
    pub generation: GenerationConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub beads: BeadsConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directories scanned by `stats` for source lines.
    pub source_dirs: Vec<String>,
    /// File extensions (without dot) counted as source.
    pub source_extensions: Vec<String>,
    /// Directory scanned by `stats` for documentation words.
    pub docs_dir: String,
    /// Directories removed by `clean`.
    pub build_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpecsConfig {
    pub requirements_dir: String,
    pub use_cases_dir: String,
    pub test_suites_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Branch generations start from and merge into.
    pub base_branch: String,
    /// Parent directory for generation worktrees, relative to the repository root.
    pub worktree_dir: String,
    /// Cycles executed by `generator run`/`resume` when `--cycles` is omitted.
    pub cycles: u32,
    /// Upper bound of tasks stitched per cycle.
    pub max_tasks_per_cycle: u32,
    /// Command run after stitch to verify the cycle (e.g. `["just","ci"]`).
    /// Empty disables verification.
    pub verify: Vec<String>,
    /// Generated source directories removed by a full `generator reset`.
    pub generated_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv; the prompt is written to stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub build: Vec<String>,
    pub lint: Vec<String>,
    pub install: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BeadsConfig {
    /// Issue-tracker state directory removed by `beads reset`.
    pub dir: String,
    pub init_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// macOS keychain service holding the agent credentials.
    pub keychain_service: String,
    /// Destination file, relative to the repository root.
    pub output_path: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scratch_dir: ".cobbler".to_string(),
            project: ProjectConfig::default(),
            specs: SpecsConfig::default(),
            generation: GenerationConfig::default(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            beads: BeadsConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dirs: vec!["src".to_string()],
            source_extensions: vec!["rs".to_string(), "go".to_string()],
            docs_dir: "docs".to_string(),
            build_dirs: vec!["bin".to_string()],
        }
    }
}

impl Default for SpecsConfig {
    fn default() -> Self {
        Self {
            requirements_dir: "docs/specs/product-requirements".to_string(),
            use_cases_dir: "docs/specs/use-cases".to_string(),
            test_suites_dir: "docs/specs/test-suites".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            worktree_dir: ".worktrees".to_string(),
            cycles: 1,
            max_tasks_per_cycle: 3,
            verify: Vec::new(),
            generated_dirs: Vec::new(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            build: vec!["just".to_string(), "build".to_string()],
            lint: vec!["just".to_string(), "lint".to_string()],
            install: vec!["just".to_string(), "install".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for BeadsConfig {
    fn default() -> Self {
        Self {
            dir: ".beads".to_string(),
            init_command: vec!["bd".to_string(), "init".to_string()],
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            keychain_service: "Claude Code-credentials".to_string(),
            output_path: ".secrets/claude-credentials.json".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scratch_dir.trim().is_empty() {
            return Err(anyhow!("scratch_dir must not be empty"));
        }
        if self.generation.base_branch.trim().is_empty() {
            return Err(anyhow!("generation.base_branch must not be empty"));
        }
        if self.generation.worktree_dir.trim().is_empty() {
            return Err(anyhow!("generation.worktree_dir must not be empty"));
        }
        if self.generation.max_tasks_per_cycle == 0 {
            return Err(anyhow!("generation.max_tasks_per_cycle must be > 0"));
        }
        if !is_command(&self.agent.command) {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.tools.timeout_secs == 0 {
            return Err(anyhow!("tools.timeout_secs must be > 0"));
        }
        if self.tools.output_limit_bytes == 0 {
            return Err(anyhow!("tools.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Worktree parent directory for a repository root.
    pub fn worktree_root(&self, root: &Path) -> PathBuf {
        root.join(&self.generation.worktree_dir)
    }
}

fn is_command(argv: &[String]) -> bool {
    argv.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(
            &path,
            "[generation]\nbase_branch = \"trunk\"\ncycles = 4\n\n[agent]\ncommand = [\"my-agent\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.generation.base_branch, "trunk");
        assert_eq!(cfg.generation.cycles, 4);
        assert_eq!(cfg.generation.worktree_dir, ".worktrees");
        assert_eq!(cfg.agent.command, vec!["my-agent"]);
        assert_eq!(cfg.agent.timeout_secs, 30 * 60);
    }

    #[test]
    fn empty_agent_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(&path, "[agent]\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("agent.command"));
    }
}
