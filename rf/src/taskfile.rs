//! Task list loading
//!
//! A task file is YAML or JSON, either a bare sequence of tasks or a
//! document with a top-level `tasks:` key. Ids must be unique; graph
//! validation happens later at scheduler startup.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use eyre::{Context, Result, bail};
use serde::Deserialize;

use crate::domain::Task;

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Wrapped { tasks: Vec<Task> },
    Bare(Vec<Task>),
}

/// Load and validate a task list from disk
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = fs::read_to_string(path)
        .context(format!("failed to read task file {}", path.display()))?;

    let parsed: TaskFile = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .context(format!("failed to parse task file {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .context(format!("failed to parse task file {}", path.display()))?
    };

    let tasks = match parsed {
        TaskFile::Wrapped { tasks } => tasks,
        TaskFile::Bare(tasks) => tasks,
    };

    let mut seen = HashSet::new();
    for task in &tasks {
        if task.id.is_empty() {
            bail!("task with empty id in {}", path.display());
        }
        if !seen.insert(task.id.as_str()) {
            bail!("duplicate task id \"{}\" in {}", task.id, path.display());
        }
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_bare_yaml_sequence() {
        let temp = tempdir().unwrap();
        let path = write(
            temp.path(),
            "tasks.yml",
            r#"
- id: a
  repo: acme/backend
  prompt: fix the login bug
- id: b
  repo: acme/backend
  prompt: add tests
  depends-on: a
"#,
        );

        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].depends_on.len(), 1);
        assert!(tasks[1].depends_on.contains("a"));
    }

    #[test]
    fn test_load_wrapped_document() {
        let temp = tempdir().unwrap();
        let path = write(
            temp.path(),
            "tasks.yml",
            r#"
tasks:
  - id: solo
    repo: acme/backend
    prompt: run
    priority: -1
"#,
        );

        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, -1);
    }

    #[test]
    fn test_load_json() {
        let temp = tempdir().unwrap();
        let path = write(
            temp.path(),
            "tasks.json",
            r#"{"tasks": [{"id": "a", "repo": "acme/api", "prompt": "p", "depends-on": ["x", "y"]}]}"#,
        );

        // depends-on may reference ids validated later by the graph
        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks[0].depends_on.len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let temp = tempdir().unwrap();
        let path = write(
            temp.path(),
            "tasks.yml",
            "- {id: a, repo: r/r, prompt: p}\n- {id: a, repo: r/r, prompt: p}\n",
        );

        let err = load_tasks(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate task id"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let temp = tempdir().unwrap();
        let path = write(temp.path(), "tasks.yml", "- {id: '', repo: r/r, prompt: p}\n");

        let err = load_tasks(&path).unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_missing_file() {
        let temp = tempdir().unwrap();
        assert!(load_tasks(&temp.path().join("nope.yml")).is_err());
    }
}
