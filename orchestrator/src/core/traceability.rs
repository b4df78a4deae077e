//! Requirement → use case → test suite coverage graph.
//!
//! Links are recomputed from the documents on every build; nothing here is
//! persisted. All collections are ordered so that reports are reproducible
//! across runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::ids::{
    extract_prds_from_touchpoints, extract_use_case_ids_from_traces, requirement_in_trace,
};
use crate::core::types::{TestSuite, UseCase};

/// A trace entry that resolves to neither a loaded use case nor a known
/// requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingTrace {
    pub suite: String,
    pub entry: String,
}

/// Gap summary consumed by the measure phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub requirements_total: usize,
    pub use_cases_total: usize,
    pub test_suites_total: usize,
    pub requirements_without_use_case: Vec<String>,
    pub use_cases_without_test_suite: Vec<String>,
    pub requirements_without_test_suite: Vec<String>,
    pub dangling_traces: Vec<DanglingTrace>,
}

impl CoverageReport {
    pub fn gap_count(&self) -> usize {
        self.requirements_without_use_case.len()
            + self.use_cases_without_test_suite.len()
            + self.requirements_without_test_suite.len()
            + self.dangling_traces.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceabilityGraph {
    requirements: BTreeSet<String>,
    use_cases: BTreeSet<String>,
    suite_count: usize,
    requirement_use_cases: BTreeMap<String, BTreeSet<String>>,
    use_case_suites: BTreeMap<String, BTreeSet<String>>,
    requirement_suites: BTreeMap<String, BTreeSet<String>>,
    dangling: Vec<DanglingTrace>,
}

impl TraceabilityGraph {
    /// Build the graph.
    ///
    /// `documented_requirements` are ids of requirement documents (derived
    /// from file names); requirements cited in touchpoints are added to them.
    pub fn build(
        documented_requirements: &[String],
        use_cases: &[UseCase],
        suites: &[TestSuite],
    ) -> Self {
        let mut graph = Self {
            requirements: documented_requirements.iter().cloned().collect(),
            use_cases: use_cases.iter().map(|uc| uc.id.clone()).collect(),
            suite_count: suites.len(),
            ..Self::default()
        };

        for uc in use_cases {
            for prd in extract_prds_from_touchpoints(&uc.touchpoints) {
                graph.requirements.insert(prd.clone());
                graph
                    .requirement_use_cases
                    .entry(prd)
                    .or_default()
                    .insert(uc.id.clone());
            }
        }

        for suite in suites {
            let use_case_refs = extract_use_case_ids_from_traces(&suite.traces);
            for raw in &suite.traces {
                let entry = raw.trim();
                if use_case_refs.iter().any(|id| id == entry) {
                    graph.link_use_case(&suite.id, entry);
                } else if let Some(prd) = requirement_in_trace(entry)
                    && graph.requirements.contains(&prd)
                {
                    graph.link_requirement(&suite.id, &prd);
                } else {
                    graph.mark_dangling(&suite.id, entry);
                }
            }
        }

        graph
    }

    fn link_use_case(&mut self, suite: &str, use_case: &str) {
        if !self.use_cases.contains(use_case) {
            self.mark_dangling(suite, use_case);
            return;
        }
        self.use_case_suites
            .entry(use_case.to_string())
            .or_default()
            .insert(suite.to_string());
        let covered: Vec<String> = self
            .requirement_use_cases
            .iter()
            .filter(|(_, ucs)| ucs.contains(use_case))
            .map(|(prd, _)| prd.clone())
            .collect();
        for prd in covered {
            self.link_requirement(suite, &prd);
        }
    }

    fn link_requirement(&mut self, suite: &str, prd: &str) {
        self.requirement_suites
            .entry(prd.to_string())
            .or_default()
            .insert(suite.to_string());
    }

    fn mark_dangling(&mut self, suite: &str, entry: &str) {
        self.dangling.push(DanglingTrace {
            suite: suite.to_string(),
            entry: entry.to_string(),
        });
    }

    /// True when at least one use case cites the requirement.
    pub fn is_requirement_covered(&self, prd: &str) -> bool {
        self.requirement_use_cases.contains_key(prd)
    }

    /// True when at least one test suite traces the use case.
    pub fn is_use_case_tested(&self, use_case: &str) -> bool {
        self.use_case_suites.contains_key(use_case)
    }

    pub fn requirements_without_use_case(&self) -> Vec<String> {
        self.requirements
            .iter()
            .filter(|prd| !self.requirement_use_cases.contains_key(*prd))
            .cloned()
            .collect()
    }

    pub fn use_cases_without_test_suite(&self) -> Vec<String> {
        self.use_cases
            .iter()
            .filter(|uc| !self.use_case_suites.contains_key(*uc))
            .cloned()
            .collect()
    }

    pub fn requirements_without_test_suite(&self) -> Vec<String> {
        self.requirements
            .iter()
            .filter(|prd| !self.requirement_suites.contains_key(*prd))
            .cloned()
            .collect()
    }

    /// Dangling entries in suite order, then trace order.
    pub fn dangling_traces(&self) -> &[DanglingTrace] {
        &self.dangling
    }

    pub fn report(&self) -> CoverageReport {
        CoverageReport {
            requirements_total: self.requirements.len(),
            use_cases_total: self.use_cases.len(),
            test_suites_total: self.suite_count,
            requirements_without_use_case: self.requirements_without_use_case(),
            use_cases_without_test_suite: self.use_cases_without_test_suite(),
            requirements_without_test_suite: self.requirements_without_test_suite(),
            dangling_traces: self.dangling.clone(),
        }
    }
}
