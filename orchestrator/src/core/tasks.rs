//! Proposed task list written by the measure agent and consumed by stitch.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Ids of tasks that must be done first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
}

fn default_status() -> TaskStatus {
    TaskStatus::Open
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<ProposedTask>,
}

impl TaskList {
    pub fn open_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Open)
            .count()
    }

    pub fn mark_done(&mut self, id: &str) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.status = TaskStatus::Done;
                true
            }
            None => false,
        }
    }
}

/// Structural problems with a task list (empty when valid).
///
/// Unknown dependencies are allowed here; such tasks simply never become
/// ready.
pub fn validate_task_list(list: &TaskList) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for task in &list.tasks {
        if task.id.trim().is_empty() {
            errors.push("task id must not be empty".to_string());
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        if task.depends_on.iter().any(|dep| dep == &task.id) {
            errors.push(format!("task '{}' depends on itself", task.id));
        }
    }
    errors
}

/// First open task (list order) whose dependencies are all done.
pub fn next_ready_task(list: &TaskList) -> Option<&ProposedTask> {
    let status: HashMap<&str, TaskStatus> = list
        .tasks
        .iter()
        .map(|task| (task.id.as_str(), task.status))
        .collect();
    list.tasks.iter().find(|task| {
        task.status == TaskStatus::Open
            && task
                .depends_on
                .iter()
                .all(|dep| status.get(dep.as_str()) == Some(&TaskStatus::Done))
    })
}

/// Open tasks that can never become ready because a dependency is unknown.
pub fn blocked_by_unknown(list: &TaskList) -> Vec<&ProposedTask> {
    let ids: HashSet<&str> = list.tasks.iter().map(|task| task.id.as_str()).collect();
    list.tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Open)
        .filter(|task| task.depends_on.iter().any(|dep| !ids.contains(dep.as_str())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str], status: TaskStatus) -> ProposedTask {
        ProposedTask {
            id: id.to_string(),
            title: format!("{id} title"),
            description: String::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            status,
        }
    }

    #[test]
    fn ready_task_respects_dependencies() {
        let mut list = TaskList {
            tasks: vec![
                task("b", &["a"], TaskStatus::Open),
                task("a", &[], TaskStatus::Open),
            ],
        };
        assert_eq!(next_ready_task(&list).map(|t| t.id.as_str()), Some("a"));
        assert!(list.mark_done("a"));
        assert_eq!(next_ready_task(&list).map(|t| t.id.as_str()), Some("b"));
        list.mark_done("b");
        assert!(next_ready_task(&list).is_none());
        assert_eq!(list.open_count(), 0);
    }

    #[test]
    fn unknown_dependency_blocks_task() {
        let list = TaskList {
            tasks: vec![task("a", &["ghost"], TaskStatus::Open)],
        };
        assert!(next_ready_task(&list).is_none());
        assert_eq!(blocked_by_unknown(&list).len(), 1);
    }

    #[test]
    fn validation_reports_duplicates_and_self_loops() {
        let list = TaskList {
            tasks: vec![
                task("a", &["a"], TaskStatus::Open),
                task("a", &[], TaskStatus::Done),
            ],
        };
        let errors = validate_task_list(&list);
        assert!(errors.iter().any(|e| e.contains("duplicate task id")));
        assert!(errors.iter().any(|e| e.contains("depends on itself")));
    }

    #[test]
    fn status_defaults_to_open() {
        let list: TaskList =
            serde_json::from_str(r#"{"tasks":[{"id":"t1","title":"Write suite"}]}"#)
                .expect("parse");
        assert_eq!(list.tasks[0].status, TaskStatus::Open);
    }
}
