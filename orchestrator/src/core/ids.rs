//! Best-effort extraction of specification identifiers from paths and prose.
//!
//! Cross-references live in human-written text, so every function here
//! degrades to "no match" instead of failing.

use std::sync::LazyLock;

use regex::Regex;

const REQUIREMENT_PATTERN: &str = r"prd\d+-[a-z0-9]+(?:-[a-z0-9]+)*";
const USE_CASE_PATTERN: &str = r"rel\d+(?:\.\d+)?-uc\d+-[a-z0-9]+(?:-[a-z0-9]+)*";

static PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]*)\)").expect("valid parenthetical regex"));
static REQUIREMENT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{REQUIREMENT_PATTERN}")).expect("valid requirement regex")
});
static REQUIREMENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{REQUIREMENT_PATTERN}$")).expect("valid requirement id regex")
});
static TRACE_REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^({REQUIREMENT_PATTERN})(?:\s|$)")).expect("valid trace regex")
});
static USE_CASE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{USE_CASE_PATTERN}$")).expect("valid use case regex")
});

/// File name of `path` with its last extension removed.
///
/// Both `/` and `\` count as separators. The result is not checked against any
/// id grammar.
pub fn extract_id(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.to_string(),
    }
}

/// Distinct requirement ids mentioned inside parentheses, in first-seen order.
pub fn extract_prds_from_touchpoints<S: AsRef<str>>(touchpoints: &[S]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for touchpoint in touchpoints {
        for group in PARENTHETICAL_RE.captures_iter(touchpoint.as_ref()) {
            let Some(inner) = group.get(1) else {
                continue;
            };
            for token in REQUIREMENT_TOKEN_RE.find_iter(inner.as_str()) {
                if !found.iter().any(|id| id == token.as_str()) {
                    found.push(token.as_str().to_string());
                }
            }
        }
    }
    found
}

/// Trace entries that are use-case ids, in input order.
pub fn extract_use_case_ids_from_traces<S: AsRef<str>>(traces: &[S]) -> Vec<String> {
    traces
        .iter()
        .map(|entry| entry.as_ref().trim())
        .filter(|entry| is_use_case_id(entry))
        .map(str::to_string)
        .collect()
}

/// Requirement id a trace entry starts with (`"prd001-core R4"` → `prd001-core`).
pub fn requirement_in_trace(entry: &str) -> Option<String> {
    TRACE_REQUIREMENT_RE
        .captures(entry.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn is_use_case_id(candidate: &str) -> bool {
    USE_CASE_ID_RE.is_match(candidate)
}

pub fn is_requirement_id(candidate: &str) -> bool {
    REQUIREMENT_ID_RE.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_id_strips_directory_and_last_extension() {
        let cases = [
            (
                "docs/specs/product-requirements/prd001-feature.yaml",
                "prd001-feature",
            ),
            (
                "docs/specs/use-cases/rel01.0-uc001-init.yaml",
                "rel01.0-uc001-init",
            ),
            ("docs/specs/test-suites/test-rel01.0.yaml", "test-rel01.0"),
            ("simple.yaml", "simple"),
            ("rel01.0-uc001-init.yaml", "rel01.0-uc001-init"),
            (r"docs\specs\prd002-parser.yml", "prd002-parser"),
            ("no-extension", "no-extension"),
        ];
        for (path, want) in cases {
            assert_eq!(extract_id(path), want, "extract_id({path:?})");
        }
    }

    #[test]
    fn touchpoints_yield_parenthetical_requirements() {
        let touchpoints = [
            "T1: Calculator component (prd001-core R1, R2)",
            "T2: Parser subsystem (prd002-parser)",
            "T3: No PRD reference here",
        ];
        let got = extract_prds_from_touchpoints(&touchpoints);
        assert_eq!(got, vec!["prd001-core", "prd002-parser"]);
    }

    #[test]
    fn touchpoints_deduplicate_in_first_seen_order() {
        let touchpoints = [
            "T1: A (prd003-cli, prd001-core)",
            "T2: B (prd001-core R3)",
            "T3: C (see prd003-cli)",
        ];
        let got = extract_prds_from_touchpoints(&touchpoints);
        assert_eq!(got, vec!["prd003-cli", "prd001-core"]);
    }

    #[test]
    fn touchpoints_ignore_requirements_outside_parentheses() {
        let touchpoints = ["T1: prd001-core is mentioned in prose only"];
        assert!(extract_prds_from_touchpoints(&touchpoints).is_empty());
    }

    #[test]
    fn touchpoints_empty_inputs_yield_nothing() {
        let none: [&str; 0] = [];
        assert!(extract_prds_from_touchpoints(&none).is_empty());
        let plain = ["T1: Some component", "T2: Another component"];
        assert!(extract_prds_from_touchpoints(&plain).is_empty());
    }

    #[test]
    fn traces_keep_only_use_case_ids_in_order() {
        let traces = [
            "rel01.0-uc002-lifecycle",
            "prd001-core R4",
            "rel01.0-uc001-init",
            "prd002-parser",
        ];
        let got = extract_use_case_ids_from_traces(&traces);
        assert_eq!(got, vec!["rel01.0-uc002-lifecycle", "rel01.0-uc001-init"]);
    }

    #[test]
    fn traces_empty_input_yields_nothing() {
        let none: Vec<String> = Vec::new();
        assert!(extract_use_case_ids_from_traces(&none).is_empty());
    }

    #[test]
    fn requirement_in_trace_reads_leading_token() {
        assert_eq!(
            requirement_in_trace("prd001-core R4").as_deref(),
            Some("prd001-core")
        );
        assert_eq!(
            requirement_in_trace("prd002-parser").as_deref(),
            Some("prd002-parser")
        );
        assert_eq!(requirement_in_trace("rel01.0-uc001-init"), None);
        assert_eq!(requirement_in_trace("see prd001-core"), None);
    }

    #[test]
    fn id_shapes_do_not_overlap() {
        assert!(is_use_case_id("rel01.0-uc001-init"));
        assert!(is_use_case_id("rel2-uc010-multi-word-slug"));
        assert!(!is_use_case_id("prd001-core"));
        assert!(is_requirement_id("prd001-core"));
        assert!(!is_requirement_id("rel01.0-uc001-init"));
        assert!(!is_requirement_id("prd001-core R4"));
    }
}
