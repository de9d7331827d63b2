//! Task domain type
//!
//! A Task is one unit of work: a prompt to be executed against a
//! repository checkout by a runner cascade. Tasks are immutable inputs;
//! runtime state lives in [`super::result::TaskResult`].

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// A prompt targeting one repository, plus its scheduling metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: String,

    /// Repository slug (`owner/name`)
    pub repo: String,

    /// Scheduling priority, smaller runs earlier
    #[serde(default)]
    pub priority: i32,

    /// Ids of tasks that must complete before this one starts.
    /// The serialized form accepts either a bare id or a sequence.
    #[serde(default, rename = "depends-on", deserialize_with = "one_or_many")]
    pub depends_on: BTreeSet<String>,

    /// Short human-readable title for display
    #[serde(default)]
    pub title: String,

    /// Prompt handed to the runner
    pub prompt: String,

    /// Primary runner override (falls back to the configured default)
    #[serde(default)]
    pub runner: Option<String>,

    /// Ordered fallback runner names (falls back to the configured chain)
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl Task {
    /// Create a task with empty metadata
    pub fn new(id: impl Into<String>, repo: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repo: repo.into(),
            priority: 0,
            depends_on: BTreeSet::new(),
            title: String::new(),
            prompt: prompt.into(),
            runner: None,
            fallbacks: Vec::new(),
        }
    }

    /// Builder method to set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to add dependencies
    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.depends_on.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    /// Builder method to set the primary runner
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    /// Builder method to set the fallback chain
    pub fn with_fallbacks(mut self, fallbacks: &[&str]) -> Self {
        self.fallbacks = fallbacks.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Last path segment of the repo slug, used as the checkout directory name
    pub fn repo_dir_name(&self) -> &str {
        match self.repo.rsplit('/').next() {
            Some(seg) if !seg.is_empty() => seg,
            _ => &self.repo,
        }
    }
}

/// Accepts either a bare id or a sequence of ids for `depends-on`
fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(BTreeSet<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => BTreeSet::from([id]),
        OneOrMany::Many(ids) => ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new("fix-auth", "acme/backend", "Fix the login bug");
        assert_eq!(task.id, "fix-auth");
        assert_eq!(task.priority, 0);
        assert!(task.depends_on.is_empty());
        assert!(task.runner.is_none());
        assert!(task.fallbacks.is_empty());
    }

    #[test]
    fn test_repo_dir_name() {
        let task = Task::new("a", "acme/backend", "p");
        assert_eq!(task.repo_dir_name(), "backend");

        let bare = Task::new("b", "monorepo", "p");
        assert_eq!(bare.repo_dir_name(), "monorepo");
    }

    #[test]
    fn test_depends_on_accepts_single_id() {
        let yaml = r#"
id: child
repo: acme/backend
prompt: do things
depends-on: parent
"#;
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.depends_on, BTreeSet::from(["parent".to_string()]));
    }

    #[test]
    fn test_depends_on_accepts_sequence() {
        let yaml = r#"
id: child
repo: acme/backend
prompt: do things
depends-on: [p1, p2, p1]
"#;
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.depends_on.len(), 2);
        assert!(task.depends_on.contains("p1"));
        assert!(task.depends_on.contains("p2"));
    }

    #[test]
    fn test_depends_on_default_empty() {
        let yaml = "id: solo\nrepo: acme/backend\nprompt: run\n";
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert!(task.depends_on.is_empty());
    }

    #[test]
    fn test_task_serde_round_trip() {
        let task = Task::new("t1", "acme/api", "prompt text")
            .with_priority(2)
            .with_deps(&["t0"])
            .with_runner("claude")
            .with_fallbacks(&["codex", "gemini"]);

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, task.id);
        assert_eq!(back.priority, 2);
        assert_eq!(back.depends_on, task.depends_on);
        assert_eq!(back.runner.as_deref(), Some("claude"));
        assert_eq!(back.fallbacks, vec!["codex", "gemini"]);
    }
}
