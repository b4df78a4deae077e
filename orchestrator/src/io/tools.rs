//! Project tooling around the generation loop: build/lint/install commands,
//! cleanup, source statistics, credentials export and the issue tracker.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::io::config::{BeadsConfig, CredentialsConfig, ProjectConfig, ToolsConfig};
use crate::io::process::{CommandOutput, RunOptions, command_from_argv, run_command};
use crate::io::scratch::remove_dir_if_exists;

const DOC_EXTENSIONS: &[&str] = &["md", "yaml", "yml"];
const SECURITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a configured tool command in `workdir`.
///
/// With `log_path`, stdout and stderr are written there whether or not the
/// command succeeds. Non-zero exit or timeout is `ExternalCommand`.
#[instrument(skip_all, fields(label))]
pub fn run_tool(
    label: &str,
    argv: &[String],
    workdir: &Path,
    tools: &ToolsConfig,
    log_path: Option<&Path>,
) -> Result<CommandOutput> {
    if argv.is_empty() {
        return Err(anyhow!("{label}: no command configured"));
    }
    info!(command = %argv.join(" "), "running tool");
    let cmd = command_from_argv(argv, workdir)?;
    let output = run_command(cmd, &RunOptions::new(tools.timeout(), tools.output_limit_bytes))
        .with_context(|| format!("run {label}"))?;
    if let Some(path) = log_path {
        write_tool_log(path, &output)?;
    }
    output.ensure_success(label)
}

fn write_tool_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_lossy());
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_lossy());
    buf.push_str(&output.truncated_notice("tool"));
    fs::write(path, buf).with_context(|| format!("write log {}", path.display()))
}

/// Remove the configured build directories; returns the ones that existed.
pub fn clean(root: &Path, project: &ProjectConfig) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for dir in &project.build_dirs {
        let path = root.join(dir);
        if remove_dir_if_exists(&path)? {
            removed.push(path);
        }
    }
    Ok(removed)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub source_files: usize,
    pub source_lines: usize,
    pub doc_files: usize,
    pub doc_words: usize,
}

/// Count source lines and documentation words.
///
/// Hidden directories (`.git`, `.worktrees`, the scratch dir) are skipped.
#[instrument(skip_all)]
pub fn collect_stats(root: &Path, project: &ProjectConfig) -> Result<ProjectStats> {
    let mut stats = ProjectStats::default();
    for dir in &project.source_dirs {
        for path in files_with_extension(&root.join(dir), &project.source_extensions)? {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            stats.source_files += 1;
            stats.source_lines += contents.lines().count();
        }
    }
    let doc_extensions: Vec<String> = DOC_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    for path in files_with_extension(&root.join(&project.docs_dir), &doc_extensions)? {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        stats.doc_files += 1;
        stats.doc_words += contents.split_whitespace().count();
    }
    debug!(?stats, "stats collected");
    Ok(stats)
}

fn files_with_extension(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext));
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Copy agent credentials from the macOS keychain to a file only the owner can read.
#[instrument(skip_all)]
pub fn export_credentials(root: &Path, credentials: &CredentialsConfig) -> Result<PathBuf> {
    let argv = [
        "security".to_string(),
        "find-generic-password".to_string(),
        "-s".to_string(),
        credentials.keychain_service.clone(),
        "-w".to_string(),
    ];
    let cmd = command_from_argv(&argv, root)?;
    let output = run_command(cmd, &RunOptions::new(SECURITY_TIMEOUT, 64 * 1024))
        .context("read keychain")?
        .ensure_success("security find-generic-password")?;
    let secret = output.stdout_lossy();
    let secret = secret.trim_end_matches('\n');
    if secret.is_empty() {
        return Err(anyhow!(
            "keychain entry {} is empty",
            credentials.keychain_service
        ));
    }

    let path = root.join(&credentials.output_path);
    write_private_file(&path, secret)?;
    info!(path = %path.display(), "credentials written");
    Ok(path)
}

fn write_private_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

pub fn beads_init(root: &Path, beads: &BeadsConfig, tools: &ToolsConfig) -> Result<()> {
    run_tool("beads init", &beads.init_command, root, tools, None)?;
    Ok(())
}

/// Remove the tracker directory; returns whether it existed.
pub fn beads_reset(root: &Path, beads: &BeadsConfig) -> Result<bool> {
    remove_dir_if_exists(&root.join(&beads.dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, body).expect("write");
    }

    #[test]
    fn stats_count_lines_and_words() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(&root.join("src/main.rs"), "fn main() {\n}\n");
        write(&root.join("src/nested/lib.go"), "package x\n");
        write(&root.join("src/notes.txt"), "ignored\n");
        write(&root.join("src/.hidden/skip.rs"), "a\nb\nc\n");
        write(&root.join("docs/intro.md"), "three small words\n");
        write(&root.join("docs/specs/uc.yaml"), "id: rel01.0-uc001-init\n");

        let stats = collect_stats(root, &ProjectConfig::default()).expect("stats");
        assert_eq!(
            stats,
            ProjectStats {
                source_files: 2,
                source_lines: 3,
                doc_files: 2,
                doc_words: 5,
            }
        );
    }

    #[test]
    fn clean_removes_only_existing_build_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join("bin/tool"), "x");
        let project = ProjectConfig {
            build_dirs: vec!["bin".to_string(), "dist".to_string()],
            ..ProjectConfig::default()
        };
        let removed = clean(temp.path(), &project).expect("clean");
        assert_eq!(removed, vec![temp.path().join("bin")]);
        assert!(!temp.path().join("bin").exists());
    }

    #[test]
    fn beads_reset_removes_tracker_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(&temp.path().join(".beads/issues.jsonl"), "{}\n");
        assert!(beads_reset(temp.path(), &BeadsConfig::default()).expect("reset"));
        assert!(!beads_reset(temp.path(), &BeadsConfig::default()).expect("reset again"));
    }

    #[cfg(unix)]
    #[test]
    fn private_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".secrets/creds.json");
        write_private_file(&path, "{}").expect("write");
        let mode = fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn run_tool_writes_log_and_reports_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("verify.log");
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo checking; exit 2".to_string(),
        ];
        let err = run_tool("verify", &argv, temp.path(), &ToolsConfig::default(), Some(&log))
            .unwrap_err();
        assert!(err.to_string().contains("verify failed"));
        assert!(fs::read_to_string(&log).expect("log").contains("checking"));
    }
}
