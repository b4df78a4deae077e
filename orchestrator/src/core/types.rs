//! Specification documents shared by the loader and the traceability graph.
//!
//! These records are immutable once decoded. Field names match the YAML
//! documents under `docs/specs/`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

/// A use-case document (`docs/specs/use-cases/<id>.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCase {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Free-text lines; parenthetical text may cite requirement ids.
    #[serde(default, deserialize_with = "deserialize_touchpoints")]
    pub touchpoints: Vec<String>,
}

/// A test-suite document (`docs/specs/test-suites/<id>.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub release: String,
    /// Use-case ids or bare requirement references, in document order.
    #[serde(default)]
    pub traces: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// One test case. Inputs and expectations are opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub expected: Value,
}

/// Touchpoints are usually written as `- T1: Component (prd001-core R1)`,
/// which YAML reads as a one-key mapping. Both that form and plain strings
/// normalize to a single line of text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTouchpoint {
    Text(String),
    Keyed(serde_yaml::Mapping),
}

fn deserialize_touchpoints<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<RawTouchpoint>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|touchpoint| match touchpoint {
            RawTouchpoint::Text(text) => text,
            RawTouchpoint::Keyed(map) => map
                .iter()
                .map(|(key, value)| format!("{}: {}", scalar_text(key), scalar_text(value)))
                .collect::<Vec<_>>()
                .join("; "),
        })
        .collect())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
