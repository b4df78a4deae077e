//! Parsers for the text printed by git subcommands.
//!
//! The output feeds listings, commit messages and diagnostics, so parsing is
//! best effort: unrecognized input yields empty or zero values, never errors.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static FILES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) files? changed").expect("valid files regex"));
static INSERTIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) insertions?\(\+\)").expect("valid insertions regex"));
static DELETIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) deletions?\(-\)").expect("valid deletions regex"));

/// Summary counts from `git diff --shortstat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStat {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl DiffStat {
    /// One-line summary for commit messages, e.g. `3 files changed, +42 -0`.
    pub fn summary(&self) -> String {
        let noun = if self.files_changed == 1 {
            "file"
        } else {
            "files"
        };
        format!(
            "{} {noun} changed, +{} -{}",
            self.files_changed, self.insertions, self.deletions
        )
    }
}

/// Branch names from `git branch` output, with `*`/`+` markers and indentation
/// removed. Blank lines are dropped; order is preserved.
pub fn parse_branch_list(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let line = line
                .strip_prefix('*')
                .or_else(|| line.strip_prefix('+'))
                .unwrap_or(line);
            let name = line.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Parse the one-line summary printed by `git diff --shortstat`.
///
/// Each group is optional; missing or malformed groups count as zero.
pub fn parse_diff_shortstat(text: &str) -> DiffStat {
    DiffStat {
        files_changed: capture_count(&FILES_RE, text),
        insertions: capture_count(&INSERTIONS_RE, text),
        deletions: capture_count(&DELETIONS_RE, text),
    }
}

fn capture_count(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_list_strips_markers() {
        let got = parse_branch_list("  main\n* current\n+ other\n");
        assert_eq!(got, vec!["main", "current", "other"]);
    }

    #[test]
    fn branch_list_empty_input() {
        assert!(parse_branch_list("").is_empty());
    }

    #[test]
    fn branch_list_skips_blank_lines() {
        let got = parse_branch_list("main\n\n  \nfeature\n");
        assert_eq!(got, vec!["main", "feature"]);
    }

    #[test]
    fn branch_list_keeps_generation_names_intact() {
        let got = parse_branch_list("  generation-20260214.0\n* generation-20260215.1\n");
        assert_eq!(got, vec!["generation-20260214.0", "generation-20260215.1"]);
    }

    #[test]
    fn shortstat_full_output() {
        let ds = parse_diff_shortstat(" 5 files changed, 100 insertions(+), 20 deletions(-)\n");
        assert_eq!(
            ds,
            DiffStat {
                files_changed: 5,
                insertions: 100,
                deletions: 20
            }
        );
    }

    #[test]
    fn shortstat_insertions_only() {
        let ds = parse_diff_shortstat(" 3 files changed, 42 insertions(+)\n");
        assert_eq!(
            ds,
            DiffStat {
                files_changed: 3,
                insertions: 42,
                deletions: 0
            }
        );
    }

    #[test]
    fn shortstat_deletions_only() {
        let ds = parse_diff_shortstat(" 2 files changed, 7 deletions(-)\n");
        assert_eq!(ds.insertions, 0);
        assert_eq!(ds.deletions, 7);
    }

    #[test]
    fn shortstat_empty_and_garbage_are_zero() {
        assert_eq!(parse_diff_shortstat(""), DiffStat::default());
        assert_eq!(
            parse_diff_shortstat("fatal: not a git repository"),
            DiffStat::default()
        );
    }

    #[test]
    fn shortstat_singular_forms() {
        let ds = parse_diff_shortstat(" 1 file changed, 1 insertion(+), 1 deletion(-)\n");
        assert_eq!(
            ds,
            DiffStat {
                files_changed: 1,
                insertions: 1,
                deletions: 1
            }
        );
        assert_eq!(ds.summary(), "1 file changed, +1 -1");
    }
}
